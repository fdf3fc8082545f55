//! Lifecycle request and response types
//!
//! Transport-neutral forms of the CSI controller messages. The gRPC layer
//! converts to and from these.

use std::collections::HashMap;

/// How a consumer wants to access a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// Raw block device
    Block,
    /// Filesystem mount
    Mount,
}

/// One requested volume capability.
///
/// `access_type` is `None` when the request named neither block nor mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VolumeCapability {
    pub access_type: Option<AccessType>,
}

impl VolumeCapability {
    #[must_use]
    pub const fn block() -> Self {
        Self {
            access_type: Some(AccessType::Block),
        }
    }

    #[must_use]
    pub const fn mount() -> Self {
        Self {
            access_type: Some(AccessType::Mount),
        }
    }
}

/// CreateVolume input
#[derive(Debug, Clone, Default)]
pub struct CreateVolumeRequest {
    /// Orchestrator-chosen volume name; becomes the device owner
    pub name: String,
    pub capabilities: Vec<VolumeCapability>,
    /// StorageClass parameters, handed to fabric discovery
    pub parameters: HashMap<String, String>,
}

/// CreateVolume output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedVolume {
    /// NQN of the allocated device
    pub volume_id: String,
    /// Always 0: consumers use the device's actual capacity
    pub capacity_bytes: i64,
    pub volume_context: HashMap<String, String>,
}

/// Optional controller RPCs this driver supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCapability {
    CreateDeleteVolume,
    PublishUnpublishVolume,
}

/// Capabilities advertised by ControllerGetCapabilities
pub const CONTROLLER_CAPABILITIES: &[ControllerCapability] = &[
    ControllerCapability::CreateDeleteVolume,
    ControllerCapability::PublishUnpublishVolume,
];
