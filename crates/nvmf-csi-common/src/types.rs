//! Core type definitions for nvmf-csi
//!
//! Transport kinds and the string keys exchanged with the container
//! orchestrator through StorageClass parameters and volume context.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// StorageClass parameter: address of the fabric discovery controller
pub const PARAM_TARGET_ADDR: &str = "targetTrAddr";

/// StorageClass parameter: service id (port) of the discovery controller
pub const PARAM_TARGET_PORT: &str = "targetTrPort";

/// StorageClass parameter and volume-context key: transport kind
pub const PARAM_TARGET_TYPE: &str = "targetTrType";

/// Volume-context key: comma-joined endpoints of a multipath device
pub const PARAM_TARGET_ENDPOINTS: &str = "targetTrEndpoints";

/// Default NVMe-oF service id
pub const DEFAULT_TARGET_PORT: u16 = 4420;

/// NVMe-oF transport kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    Rdma,
    Fc,
    Loop,
}

impl Transport {
    /// Name as understood by `nvme-cli` (`-t <transport>`)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Rdma => "rdma",
            Self::Fc => "fc",
            Self::Loop => "loop",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a transport name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transport: {0}")]
pub struct UnknownTransport(pub String);

impl FromStr for Transport {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "rdma" => Ok(Self::Rdma),
            "fc" => Ok(Self::Fc),
            "loop" => Ok(Self::Loop),
            _ => Err(UnknownTransport(s.to_string())),
        }
    }
}
