//! Registry error types

use crate::discovery::DiscoveryError;
use crate::store::StoreError;
use thiserror::Error;

/// Failure of the one-time allocation snapshot load.
///
/// `Clone` because every caller waiting on the same in-flight load observes
/// the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The store could not be read
    #[error("allocation store unavailable: {0}")]
    Store(String),

    /// The store returned records that do not form a valid snapshot
    #[error("malformed allocation snapshot: {0}")]
    Malformed(String),
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Store(e.to_string())
        }
    }
}

/// Device registry error
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Initial snapshot load failed
    #[error("allocation sync failed: {0}")]
    Sync(#[from] SyncError),

    /// Fabric discovery failed
    #[error("device discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Every addressable device is allocated
    #[error("no free device available")]
    NoDeviceAvailable,

    /// Allocation change could not be made durable
    #[error("failed to persist allocation: {0}")]
    Persistence(#[from] StoreError),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
