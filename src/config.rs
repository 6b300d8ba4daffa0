//! Service configuration.

use crate::constants::DEFAULT_REFRESH_INTERVAL;
use std::time::Duration;

/// Configuration of the secret discovery service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdsConfig {
    /// Interval between periodic re-pushes of the current secrets on each stream.
    pub refresh_interval: Duration,
}

impl Default for SdsConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl SdsConfig {
    /// Replaces a zero refresh interval with the default.
    pub(crate) fn normalize(mut self) -> Self {
        if self.refresh_interval.is_zero() {
            self.refresh_interval = DEFAULT_REFRESH_INTERVAL;
        }
        self
    }
}

/// An error parsing a human-readable duration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DurationError {
    /// The input is empty.
    #[error("empty duration")]
    Empty,

    /// The numeric part is missing or not an unsigned integer.
    #[error("invalid duration value: {0}")]
    InvalidValue(String),

    /// The unit suffix is missing or unknown.
    #[error("invalid duration unit in {0:?} (expected ms, s, m or h)")]
    InvalidUnit(String),

    /// The duration does not fit in a `Duration`.
    #[error("duration out of range: {0}")]
    Overflow(String),
}

/// Parses durations of the form `500ms`, `20s`, `5m` or `1h`.
///
/// # Errors
///
/// Returns a [`DurationError`] if the input is not an unsigned integer followed
/// by one of the supported units.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DurationError::Empty);
    }

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| DurationError::InvalidUnit(input.to_owned()))?;
    let (value, unit) = input.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| DurationError::InvalidValue(input.to_owned()))?;

    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(DurationError::InvalidUnit(input.to_owned())),
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| DurationError::Overflow(input.to_owned()))
}
