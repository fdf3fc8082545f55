//! nvmf-csi Registry - NVMe-oF device allocation engine
//!
//! This crate tracks the NVMe-oF subsystems found on the fabric and which
//! volume each one is bound to.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   DeviceRegistry     │  catalog (NQN → Device), one-shot initial sync
//! └───┬──────────────┬───┘
//!     │              │
//! ┌───▼──────────┐ ┌─▼────────────────┐
//! │ Allocation   │ │ FabricDiscoverer │  nvme discover
//! │ Store (redb) │ └──────────────────┘
//! └──────────────┘
//! ```
//!
//! [`VolumeLockTable`] serialises lifecycle operations per volume id on top
//! of the registry's own internal exclusion.

pub mod device;
pub mod discovery;
pub mod error;
pub mod lock;
pub mod redb_store;
pub mod registry;
pub mod store;

pub use device::{AllocationState, Device, DeviceDescriptor};
pub use discovery::{DiscoveryError, DiscoveryParams, FabricDiscoverer, NvmeCliDiscoverer};
pub use error::{RegistryError, RegistryResult, SyncError};
pub use lock::{VolumeLockGuard, VolumeLockTable};
pub use redb_store::RedbAllocationStore;
pub use registry::DeviceRegistry;
pub use store::{AllocationSnapshot, AllocationStore, MemoryAllocationStore, StoreError};
