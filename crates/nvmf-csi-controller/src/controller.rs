//! Volume lifecycle orchestration
//!
//! Validates lifecycle requests, serialises them per volume id and drives
//! the device registry. A volume's id is the NQN of the device bound to it,
//! so no separate volume table exists.

use std::collections::HashMap;

use nvmf_csi_common::{PARAM_TARGET_ENDPOINTS, PARAM_TARGET_TYPE};
use nvmf_csi_registry::{Device, DeviceRegistry, RegistryError, VolumeLockGuard, VolumeLockTable};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ControllerError, ControllerResult};
use crate::types::{
    CONTROLLER_CAPABILITIES, ControllerCapability, CreateVolumeRequest, CreatedVolume,
    VolumeCapability,
};

/// Capacity reported for created volumes; consumers size from the device
pub const USE_ACTUAL_DEVICE_CAPACITY: i64 = 0;

/// CSI controller lifecycle core
pub struct ControllerServer {
    registry: DeviceRegistry,
    locks: VolumeLockTable,
}

impl ControllerServer {
    pub fn new(registry: DeviceRegistry) -> Self {
        Self {
            registry,
            locks: VolumeLockTable::new(),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn locks(&self) -> &VolumeLockTable {
        &self.locks
    }

    /// Optional controller RPCs advertised to the orchestrator
    pub const fn capabilities(&self) -> &'static [ControllerCapability] {
        CONTROLLER_CAPABILITIES
    }

    /// Load the allocation snapshot in the background.
    ///
    /// Failure is logged only; the next CreateVolume retries the load.
    pub fn spawn_initial_sync(&self) -> JoinHandle<()> {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            if let Err(e) = registry.ensure_initial_sync().await {
                error!("Initial allocation sync failed: {}", e);
            }
            info!("Device registry initialization completed");
        })
    }

    fn lock_volume(&self, volume_id: &str) -> ControllerResult<VolumeLockGuard<'_>> {
        self.locks.try_acquire(volume_id).ok_or_else(|| {
            debug!("Volume {} is busy", volume_id);
            ControllerError::Aborted(volume_id.to_string())
        })
    }

    /// Provision a volume by binding a free device to `request.name`
    pub async fn create_volume(&self, request: CreateVolumeRequest) -> ControllerResult<CreatedVolume> {
        if !is_valid_volume_name(&request.name) {
            return Err(ControllerError::invalid_argument("volume Name must be provided"));
        }
        if !is_valid_volume_capabilities(&request.capabilities) {
            return Err(ControllerError::invalid_argument("volume Capabilities are invalid"));
        }

        debug!("CreateVolume called with name: {}", request.name);

        if let Err(e) = self.registry.ensure_initial_sync().await {
            warn!("Failed to ensure allocation sync: {}", e);
        }

        if let Err(e) = self.registry.discover_devices(&request.parameters).await {
            error!("Failed to discover NVMe devices: {}", e);
            return Err(ControllerError::internal(e.to_string()));
        }

        let _guard = self.lock_volume(&request.name)?;

        let device = self
            .registry
            .allocate_device(&request.name)
            .await
            .map_err(|e| {
                error!("Failed to allocate device for volume {}: {}", request.name, e);
                ControllerError::ResourceExhausted(e.to_string())
            })?;

        info!("Volume {} bound to device {}", request.name, device.nqn);
        Ok(CreatedVolume {
            volume_context: volume_context(&device),
            volume_id: device.nqn,
            capacity_bytes: USE_ACTUAL_DEVICE_CAPACITY,
        })
    }

    /// Return the device behind `volume_id` to the free pool.
    ///
    /// Unknown ids succeed so orchestrator retries are harmless.
    pub async fn delete_volume(&self, volume_id: &str) -> ControllerResult<()> {
        if !is_valid_volume_id(volume_id) {
            return Err(ControllerError::invalid_argument("volume ID must be provided"));
        }

        debug!("DeleteVolume called for volume ID {}", volume_id);

        let _guard = self.lock_volume(volume_id)?;

        match self.registry.release_device(volume_id).await {
            Ok(true) => info!("Deleted volume {}", volume_id),
            Ok(false) => debug!("Volume {} not allocated, nothing to delete", volume_id),
            Err(e @ RegistryError::Persistence(_)) => {
                error!("Failed to delete volume {}: {}", volume_id, e);
                return Err(ControllerError::internal(format!(
                    "failed to release volume {volume_id}: {e}"
                )));
            }
            Err(e) => return Err(ControllerError::internal(e.to_string())),
        }
        Ok(())
    }

    /// Confirm `volume_id` can be attached to `node_id`.
    ///
    /// No node-specific binding happens at this layer; the returned publish
    /// context is empty.
    pub async fn publish_volume(
        &self,
        volume_id: &str,
        node_id: &str,
    ) -> ControllerResult<HashMap<String, String>> {
        if !is_valid_volume_id(volume_id) {
            return Err(ControllerError::invalid_argument(
                "ControllerPublishVolume Volume ID must be provided",
            ));
        }
        if node_id.is_empty() {
            return Err(ControllerError::invalid_argument(
                "ControllerPublishVolume Node ID must be provided",
            ));
        }

        debug!(
            "ControllerPublishVolume called for volume {} on node {}",
            volume_id, node_id
        );

        let _guard = self.lock_volume(volume_id)?;

        match self.registry.get_device_by_nqn(volume_id).await {
            Some(device) if device.is_allocated() => Ok(HashMap::new()),
            _ => {
                error!(
                    "Volume {} not found or not allocated for ControllerPublishVolume",
                    volume_id
                );
                Err(ControllerError::NotFound(format!(
                    "volume {volume_id} not found or not allocated"
                )))
            }
        }
    }

    /// Detach `volume_id` from `node_id`. Unknown volumes succeed.
    pub async fn unpublish_volume(&self, volume_id: &str, node_id: &str) -> ControllerResult<()> {
        if !is_valid_volume_id(volume_id) {
            return Err(ControllerError::invalid_argument(
                "ControllerUnpublishVolume Volume ID must be provided",
            ));
        }

        debug!(
            "ControllerUnpublishVolume called for volume {} from node {}",
            volume_id, node_id
        );

        let _guard = self.lock_volume(volume_id)?;

        if self.registry.get_device_by_nqn(volume_id).await.is_none() {
            warn!(
                "ControllerUnpublishVolume: volume {} not found, assuming already unpublished",
                volume_id
            );
        }
        Ok(())
    }
}

/// Volume context handed to the node plugin
fn volume_context(device: &Device) -> HashMap<String, String> {
    let mut context = HashMap::new();
    if let Some(transport) = device.transport {
        context.insert(PARAM_TARGET_TYPE.to_string(), transport.to_string());
    }
    if device.endpoints.len() > 1 {
        context.insert(
            PARAM_TARGET_ENDPOINTS.to_string(),
            device.endpoints.join(","),
        );
    }
    context
}

fn is_valid_volume_name(name: &str) -> bool {
    if name.is_empty() {
        error!("Volume Name cannot be empty");
        return false;
    }
    true
}

fn is_valid_volume_id(volume_id: &str) -> bool {
    if volume_id.is_empty() {
        error!("Volume ID cannot be empty");
        return false;
    }
    true
}

/// Each capability must name exactly one of block or mount access
fn is_valid_volume_capabilities(capabilities: &[VolumeCapability]) -> bool {
    if capabilities.is_empty() {
        error!("Volume Capabilities not provided");
        return false;
    }
    if capabilities.iter().any(|c| c.access_type.is_none()) {
        error!("Must specify either block or mount access type");
        return false;
    }
    true
}
