//! CSI endpoint parsing
//!
//! Sidecars hand the driver its endpoint as a URL: `unix:///csi/csi.sock`
//! or `tcp://0.0.0.0:10000`.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("unsupported endpoint scheme in {0}, expected unix:// or tcp://")]
    UnsupportedScheme(String),

    #[error("endpoint {0} has an empty socket path")]
    EmptyPath(String),

    #[error("invalid tcp endpoint {endpoint}: {reason}")]
    InvalidAddress { endpoint: String, reason: String },
}

/// Where the gRPC server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenEndpoint {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

impl FromStr for ListenEndpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(EndpointError::EmptyPath(s.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            return addr
                .parse()
                .map(Self::Tcp)
                .map_err(|e: std::net::AddrParseError| EndpointError::InvalidAddress {
                    endpoint: s.to_string(),
                    reason: e.to_string(),
                });
        }
        Err(EndpointError::UnsupportedScheme(s.to_string()))
    }
}

impl fmt::Display for ListenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}
