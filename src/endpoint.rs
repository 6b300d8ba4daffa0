//! Listen endpoint parsing and validation.
//!
//! The discovery server listens on a Unix domain socket (the usual setup, with
//! Envoy as a sidecar) or on a TCP address.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

const TCP_SCHEME: &str = "tcp";
const UNIX_SCHEME: &str = "unix";

/// Address the discovery server listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket at the given path.
    Unix(PathBuf),

    /// TCP socket (host must be an IP address).
    Tcp {
        /// IP address to bind.
        host: IpAddr,
        /// TCP port to bind.
        port: u16,
    },
}

/// Errors returned by [`Endpoint::parse`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EndpointError {
    /// The input could not be parsed as a valid URI.
    #[error("listen endpoint is not a valid URI")]
    Parse(#[from] url::ParseError),

    /// The URI scheme is not supported.
    #[error("listen endpoint URI scheme must be unix: or tcp:")]
    InvalidScheme,

    /// User info (`user:pass@...`) is not allowed.
    #[error("listen endpoint URI must not include user info")]
    HasUserInfo,

    /// Query values are not allowed.
    #[error("listen endpoint URI must not include query values")]
    HasQuery,

    /// Fragments are not allowed.
    #[error("listen endpoint URI must not include a fragment")]
    HasFragment,

    /// Unix endpoints must not include an authority/host.
    #[error("unix: listen endpoint URI must not include an authority")]
    UnixAuthorityNotAllowed,

    /// Unix endpoints must include an absolute socket path.
    #[error("unix: listen endpoint URI must include an absolute path")]
    UnixMissingPath,

    /// TCP endpoints must use an IP address (not a hostname).
    #[error("tcp: listen endpoint URI host must be an IP address")]
    TcpHostNotIp,

    /// TCP endpoints must include a port.
    #[error("tcp: listen endpoint URI must include a port")]
    TcpMissingPort,

    /// TCP endpoints must not include a non-empty path.
    #[error("tcp: listen endpoint URI must not include a path")]
    TcpUnexpectedPath,
}

impl Endpoint {
    /// Parses and validates a listen endpoint.
    ///
    /// ## Accepted formats
    ///
    /// - `/path/to/socket`
    /// - `unix:///path/to/socket`
    /// - `unix:/path/to/socket`
    /// - `tcp://1.2.3.4:8081`
    /// - `tcp:1.2.3.4:8081`
    ///
    /// ## Errors
    ///
    /// Returns an [`EndpointError`] if the input is not a valid URI, uses an
    /// unsupported scheme, carries user info, a query or a fragment, or does not
    /// satisfy the rules of its scheme.
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(&normalize_endpoint_uri(input))?;

        if !url.username().is_empty() || url.password().is_some() {
            return Err(EndpointError::HasUserInfo);
        }
        if url.query().is_some() {
            return Err(EndpointError::HasQuery);
        }
        if url.fragment().is_some() {
            return Err(EndpointError::HasFragment);
        }

        match url.scheme() {
            UNIX_SCHEME => {
                if url.host_str().is_some_and(|host| !host.is_empty()) {
                    return Err(EndpointError::UnixAuthorityNotAllowed);
                }

                // `unix:tmp/sock` yields a relative path and is rejected here.
                let path = url.path();
                if path == "/" || !path.starts_with('/') {
                    return Err(EndpointError::UnixMissingPath);
                }

                Ok(Self::Unix(PathBuf::from(path)))
            }

            TCP_SCHEME => {
                let host = match url.host() {
                    Some(url::Host::Ipv4(ipv4)) => IpAddr::V4(ipv4),
                    Some(url::Host::Ipv6(ipv6)) => IpAddr::V6(ipv6),
                    // Non-special schemes leave IPv4 literals as domains.
                    Some(url::Host::Domain(domain)) => {
                        IpAddr::from_str(domain).map_err(|_| EndpointError::TcpHostNotIp)?
                    }
                    None => return Err(EndpointError::TcpHostNotIp),
                };
                let port = url.port().ok_or(EndpointError::TcpMissingPort)?;

                let path = url.path();
                if !path.is_empty() && path != "/" {
                    return Err(EndpointError::TcpUnexpectedPath);
                }

                Ok(Self::Tcp { host, port })
            }

            _ => Err(EndpointError::InvalidScheme),
        }
    }

    /// Returns the socket address of a TCP endpoint.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp { host, port } => Some(SocketAddr::new(*host, *port)),
            Self::Unix(_) => None,
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp { host, port } => write!(f, "tcp:{}", SocketAddr::new(*host, *port)),
        }
    }
}

fn normalize_endpoint_uri(input: &str) -> String {
    // A bare absolute path names a Unix socket.
    if input.starts_with('/') {
        return format!("unix://{input}");
    }

    if let Some(rest) = input.strip_prefix("unix:/") {
        if !rest.starts_with('/') {
            return format!("unix:///{rest}");
        }
    }

    if let Some(rest) = input.strip_prefix("tcp:") {
        if !rest.starts_with("//") {
            return format!("tcp://{rest}");
        }
    }

    input.to_owned()
}
