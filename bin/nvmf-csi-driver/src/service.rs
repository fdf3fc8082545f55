//! CSI Controller gRPC service
//!
//! Thin adapter between the generated CSI messages and the lifecycle core in
//! `nvmf-csi-controller`.

use nvmf_csi_controller::{
    AccessType, ControllerCapability, ControllerError, ControllerServer, CreateVolumeRequest,
    VolumeCapability,
};
use nvmf_csi_proto::csi::{
    self, ControllerExpandVolumeRequest, ControllerExpandVolumeResponse,
    ControllerGetCapabilitiesRequest, ControllerGetCapabilitiesResponse,
    ControllerGetVolumeRequest, ControllerGetVolumeResponse, ControllerPublishVolumeRequest,
    ControllerPublishVolumeResponse, ControllerServiceCapability,
    ControllerUnpublishVolumeRequest, ControllerUnpublishVolumeResponse, CreateSnapshotRequest,
    CreateSnapshotResponse, CreateVolumeResponse, DeleteSnapshotRequest, DeleteSnapshotResponse,
    DeleteVolumeRequest, DeleteVolumeResponse, GetCapacityRequest, GetCapacityResponse,
    ListSnapshotsRequest, ListSnapshotsResponse, ListVolumesRequest, ListVolumesResponse,
    ValidateVolumeCapabilitiesRequest, ValidateVolumeCapabilitiesResponse, Volume,
    controller_server::Controller, controller_service_capability, volume_capability,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct ControllerService {
    core: Arc<ControllerServer>,
}

impl ControllerService {
    pub const fn new(core: Arc<ControllerServer>) -> Self {
        Self { core }
    }
}

fn capability_from_proto(capability: &csi::VolumeCapability) -> VolumeCapability {
    let access_type = capability.access_type.as_ref().map(|access| match access {
        volume_capability::AccessType::Block(_) => AccessType::Block,
        volume_capability::AccessType::Mount(_) => AccessType::Mount,
    });
    VolumeCapability { access_type }
}

fn capability_to_proto(capability: ControllerCapability) -> ControllerServiceCapability {
    let rpc = match capability {
        ControllerCapability::CreateDeleteVolume => {
            controller_service_capability::rpc::Type::CreateDeleteVolume
        }
        ControllerCapability::PublishUnpublishVolume => {
            controller_service_capability::rpc::Type::PublishUnpublishVolume
        }
    };
    ControllerServiceCapability {
        r#type: Some(controller_service_capability::Type::Rpc(
            controller_service_capability::Rpc { r#type: rpc as i32 },
        )),
    }
}

fn unimplemented(rpc: &'static str) -> Status {
    ControllerError::Unimplemented(rpc).into()
}

#[tonic::async_trait]
impl Controller for ControllerService {
    async fn create_volume(
        &self,
        request: Request<csi::CreateVolumeRequest>,
    ) -> Result<Response<CreateVolumeResponse>, Status> {
        let req = request.into_inner();

        let created = self
            .core
            .create_volume(CreateVolumeRequest {
                name: req.name,
                capabilities: req
                    .volume_capabilities
                    .iter()
                    .map(capability_from_proto)
                    .collect(),
                parameters: req.parameters,
            })
            .await?;

        Ok(Response::new(CreateVolumeResponse {
            volume: Some(Volume {
                capacity_bytes: created.capacity_bytes,
                volume_id: created.volume_id,
                volume_context: created.volume_context,
                content_source: req.volume_content_source,
                accessible_topology: Vec::new(),
            }),
        }))
    }

    async fn delete_volume(
        &self,
        request: Request<DeleteVolumeRequest>,
    ) -> Result<Response<DeleteVolumeResponse>, Status> {
        let req = request.into_inner();
        self.core.delete_volume(&req.volume_id).await?;
        Ok(Response::new(DeleteVolumeResponse {}))
    }

    async fn controller_publish_volume(
        &self,
        request: Request<ControllerPublishVolumeRequest>,
    ) -> Result<Response<ControllerPublishVolumeResponse>, Status> {
        let req = request.into_inner();
        let publish_context = self
            .core
            .publish_volume(&req.volume_id, &req.node_id)
            .await?;
        Ok(Response::new(ControllerPublishVolumeResponse { publish_context }))
    }

    async fn controller_unpublish_volume(
        &self,
        request: Request<ControllerUnpublishVolumeRequest>,
    ) -> Result<Response<ControllerUnpublishVolumeResponse>, Status> {
        let req = request.into_inner();
        self.core
            .unpublish_volume(&req.volume_id, &req.node_id)
            .await?;
        Ok(Response::new(ControllerUnpublishVolumeResponse {}))
    }

    async fn controller_get_capabilities(
        &self,
        _request: Request<ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<ControllerGetCapabilitiesResponse>, Status> {
        let capabilities = self
            .core
            .capabilities()
            .iter()
            .copied()
            .map(capability_to_proto)
            .collect();
        Ok(Response::new(ControllerGetCapabilitiesResponse { capabilities }))
    }

    async fn validate_volume_capabilities(
        &self,
        _request: Request<ValidateVolumeCapabilitiesRequest>,
    ) -> Result<Response<ValidateVolumeCapabilitiesResponse>, Status> {
        Err(unimplemented("ValidateVolumeCapabilities"))
    }

    async fn list_volumes(
        &self,
        _request: Request<ListVolumesRequest>,
    ) -> Result<Response<ListVolumesResponse>, Status> {
        Err(unimplemented("ListVolumes"))
    }

    async fn get_capacity(
        &self,
        _request: Request<GetCapacityRequest>,
    ) -> Result<Response<GetCapacityResponse>, Status> {
        Err(unimplemented("GetCapacity"))
    }

    async fn create_snapshot(
        &self,
        _request: Request<CreateSnapshotRequest>,
    ) -> Result<Response<CreateSnapshotResponse>, Status> {
        Err(unimplemented("CreateSnapshot"))
    }

    async fn delete_snapshot(
        &self,
        _request: Request<DeleteSnapshotRequest>,
    ) -> Result<Response<DeleteSnapshotResponse>, Status> {
        Err(unimplemented("DeleteSnapshot"))
    }

    async fn list_snapshots(
        &self,
        _request: Request<ListSnapshotsRequest>,
    ) -> Result<Response<ListSnapshotsResponse>, Status> {
        Err(unimplemented("ListSnapshots"))
    }

    async fn controller_expand_volume(
        &self,
        _request: Request<ControllerExpandVolumeRequest>,
    ) -> Result<Response<ControllerExpandVolumeResponse>, Status> {
        Err(unimplemented("ControllerExpandVolume"))
    }

    async fn controller_get_volume(
        &self,
        _request: Request<ControllerGetVolumeRequest>,
    ) -> Result<Response<ControllerGetVolumeResponse>, Status> {
        Err(unimplemented("ControllerGetVolume"))
    }
}
