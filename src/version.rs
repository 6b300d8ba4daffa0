//! Version tokens stamped on discovery responses.

use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Returns a fresh version token derived from the current UTC time.
///
/// Tokens are fixed-width RFC 3339 timestamps with nanosecond precision, for
/// example `2024-05-01T12:00:00.000000001Z`. Two calls within the same
/// nanosecond yield the same token.
pub fn new_version() -> String {
    format_version(OffsetDateTime::now_utc())
}

pub(crate) fn format_version(at: OffsetDateTime) -> String {
    let at = at.to_offset(UtcOffset::UTC);
    at.format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
    ))
    .unwrap_or_else(|_| at.unix_timestamp_nanos().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn formats_with_nanosecond_precision() {
        let at = datetime!(2024-05-01 12:00:00.000_000_001 UTC);
        assert_eq!(format_version(at), "2024-05-01T12:00:00.000000001Z");
    }

    #[test]
    fn normalizes_to_utc() {
        let at = datetime!(2024-05-01 14:30:00 +02:00);
        assert_eq!(format_version(at), "2024-05-01T12:30:00.000000000Z");
    }

    #[test]
    fn tokens_are_fixed_width() {
        let version = new_version();
        assert_eq!(version.len(), "2024-05-01T12:00:00.000000001Z".len());
        assert!(version.ends_with('Z'));
    }
}
