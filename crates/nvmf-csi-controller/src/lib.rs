//! nvmf-csi Controller - volume lifecycle for NVMe-oF backed volumes
//!
//! Implements the CSI controller semantics on top of the device registry:
//! CreateVolume binds a free NVMe-oF subsystem to a volume name, DeleteVolume
//! returns it to the pool, and publish/unpublish check that a volume exists.
//!
//! Operations on the same volume id never run concurrently; a second caller
//! gets [`ControllerError::Aborted`] instead of waiting.

pub mod controller;
pub mod error;
pub mod types;

pub use controller::ControllerServer;
pub use error::{ControllerError, ControllerResult};
pub use types::{
    AccessType, CONTROLLER_CAPABILITIES, ControllerCapability, CreateVolumeRequest, CreatedVolume,
    VolumeCapability,
};
