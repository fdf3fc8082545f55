//! Device model
//!
//! A [`Device`] is one NVMe-oF subsystem reachable on the fabric. Its
//! allocation state carries the owning volume inside the `Allocated`
//! variant, so a device can never be allocated without an owner.

use nvmf_csi_common::Transport;
use serde::{Deserialize, Serialize};

/// Allocation state of a device.
///
/// This is also the persisted record format: the allocation snapshot maps
/// each NQN to one of these values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AllocationState {
    /// Not bound to any volume
    #[default]
    Free,
    /// Bound to `owner_volume`
    Allocated { owner_volume: String },
}

impl AllocationState {
    /// Owning volume, if allocated
    #[must_use]
    pub fn owner_volume(&self) -> Option<&str> {
        match self {
            Self::Free => None,
            Self::Allocated { owner_volume } => Some(owner_volume),
        }
    }

    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        matches!(self, Self::Allocated { .. })
    }
}

/// What fabric discovery reports about one subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Subsystem NQN
    pub nqn: String,
    /// Transport kind
    pub transport: Transport,
    /// `address:service-id` pairs, in discovery order
    pub endpoints: Vec<String>,
}

/// One NVMe-oF target known to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Subsystem NQN; doubles as the volume id once allocated
    pub nqn: String,
    /// Transport kind. `None` for devices restored from the allocation
    /// snapshot that discovery has not reported yet.
    pub transport: Option<Transport>,
    /// Reachable endpoints (more than one means multipath)
    pub endpoints: Vec<String>,
    /// Allocation state
    pub state: AllocationState,
}

impl Device {
    /// A newly discovered, free device
    #[must_use]
    pub fn discovered(descriptor: DeviceDescriptor) -> Self {
        Self {
            nqn: descriptor.nqn,
            transport: Some(descriptor.transport),
            endpoints: descriptor.endpoints,
            state: AllocationState::Free,
        }
    }

    /// A device known only from the allocation snapshot
    #[must_use]
    pub fn restored(nqn: impl Into<String>, state: AllocationState) -> Self {
        Self {
            nqn: nqn.into(),
            transport: None,
            endpoints: Vec::new(),
            state,
        }
    }

    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        self.state.is_allocated()
    }

    #[must_use]
    pub fn owner_volume(&self) -> Option<&str> {
        self.state.owner_volume()
    }

    /// Whether discovery has supplied fabric addressing for this device
    #[must_use]
    pub const fn is_addressable(&self) -> bool {
        self.transport.is_some()
    }

    /// Free and addressable
    #[must_use]
    pub const fn is_allocatable(&self) -> bool {
        !self.is_allocated() && self.is_addressable()
    }
}
