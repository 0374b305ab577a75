//! gRPC Controller service implementation

use blockcsi_proto::csi::controller_server::Controller;
use blockcsi_proto::csi::{
    self, ControllerExpandVolumeRequest, ControllerExpandVolumeResponse,
    ControllerGetCapabilitiesRequest, ControllerGetCapabilitiesResponse,
    ControllerGetVolumeRequest, ControllerGetVolumeResponse, ControllerPublishVolumeRequest,
    ControllerPublishVolumeResponse, ControllerServiceCapability,
    ControllerUnpublishVolumeRequest, ControllerUnpublishVolumeResponse, CreateSnapshotRequest,
    CreateSnapshotResponse, CreateVolumeRequest as ProtoCreateVolumeRequest,
    CreateVolumeResponse, DeleteSnapshotRequest, DeleteSnapshotResponse, DeleteVolumeRequest,
    DeleteVolumeResponse, GetCapacityRequest, GetCapacityResponse, ListSnapshotsRequest,
    ListSnapshotsResponse, ListVolumesRequest, ListVolumesResponse,
    ValidateVolumeCapabilitiesRequest, ValidateVolumeCapabilitiesResponse,
    controller_service_capability, list_volumes_response, validate_volume_capabilities_response,
    volume_capability,
};
use tonic::{Request, Response, Status};

use crate::capability::{AccessMode, AccessType, VolumeCapability};
use crate::capacity::CapacityRange;
use crate::controller::VolumeController;
use crate::types::{
    ControllerCapability, CreateVolumeRequest, ExpandVolumeRequest, PublishVolumeRequest,
    VolumeInfo,
};

// ── Service ───────────────────────────────────────────────────────────────────

/// CSI Controller service backed by a [`VolumeController`]
pub struct ControllerService {
    controller: VolumeController,
}

impl ControllerService {
    pub fn new(controller: VolumeController) -> Self {
        Self { controller }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

const fn access_mode_from_proto(mode: volume_capability::access_mode::Mode) -> AccessMode {
    use volume_capability::access_mode::Mode;
    match mode {
        Mode::Unknown => AccessMode::Unknown,
        Mode::SingleNodeWriter => AccessMode::SingleNodeWriter,
        Mode::SingleNodeReaderOnly => AccessMode::SingleNodeReaderOnly,
        Mode::MultiNodeReaderOnly => AccessMode::MultiNodeReaderOnly,
        Mode::MultiNodeSingleWriter => AccessMode::MultiNodeSingleWriter,
        Mode::MultiNodeMultiWriter => AccessMode::MultiNodeMultiWriter,
        Mode::SingleNodeSingleWriter => AccessMode::SingleNodeSingleWriter,
        Mode::SingleNodeMultiWriter => AccessMode::SingleNodeMultiWriter,
    }
}

const fn access_mode_to_proto(mode: AccessMode) -> volume_capability::access_mode::Mode {
    use volume_capability::access_mode::Mode;
    match mode {
        AccessMode::Unknown => Mode::Unknown,
        AccessMode::SingleNodeWriter => Mode::SingleNodeWriter,
        AccessMode::SingleNodeReaderOnly => Mode::SingleNodeReaderOnly,
        AccessMode::MultiNodeReaderOnly => Mode::MultiNodeReaderOnly,
        AccessMode::MultiNodeSingleWriter => Mode::MultiNodeSingleWriter,
        AccessMode::MultiNodeMultiWriter => Mode::MultiNodeMultiWriter,
        AccessMode::SingleNodeSingleWriter => Mode::SingleNodeSingleWriter,
        AccessMode::SingleNodeMultiWriter => Mode::SingleNodeMultiWriter,
    }
}

fn capability_from_proto(capability: &csi::VolumeCapability) -> VolumeCapability {
    let access_type = match &capability.access_type {
        Some(volume_capability::AccessType::Block(_)) => AccessType::Block,
        Some(volume_capability::AccessType::Mount(mount)) => AccessType::Mount {
            fs_type: mount.fs_type.clone(),
            mount_flags: mount.mount_flags.clone(),
        },
        None => AccessType::Unspecified,
    };
    let access_mode = capability
        .access_mode
        .as_ref()
        .map_or(AccessMode::Unknown, |m| access_mode_from_proto(m.mode()));

    VolumeCapability {
        access_type,
        access_mode,
    }
}

fn capability_to_proto(capability: &VolumeCapability) -> csi::VolumeCapability {
    let access_type = match &capability.access_type {
        AccessType::Block => Some(volume_capability::AccessType::Block(
            volume_capability::BlockVolume {},
        )),
        AccessType::Mount {
            fs_type,
            mount_flags,
        } => Some(volume_capability::AccessType::Mount(
            volume_capability::MountVolume {
                fs_type: fs_type.clone(),
                mount_flags: mount_flags.clone(),
                volume_mount_group: String::new(),
            },
        )),
        AccessType::Unspecified => None,
    };

    csi::VolumeCapability {
        access_type,
        access_mode: Some(volume_capability::AccessMode {
            mode: access_mode_to_proto(capability.access_mode) as i32,
        }),
    }
}

fn capacity_range_from_proto(range: Option<csi::CapacityRange>) -> Option<CapacityRange> {
    range.map(|r| CapacityRange::between(r.required_bytes, r.limit_bytes))
}

fn volume_to_proto(info: VolumeInfo) -> csi::Volume {
    csi::Volume {
        capacity_bytes: info.capacity_bytes,
        volume_id: info.volume_id,
        volume_context: info.volume_context,
        accessible_topology: info
            .accessible_topology
            .into_iter()
            .map(|segments| csi::Topology { segments })
            .collect(),
    }
}

const fn controller_capability_to_proto(
    capability: ControllerCapability,
) -> ControllerServiceCapability {
    use controller_service_capability::rpc::Type;
    let rpc = match capability {
        ControllerCapability::CreateDeleteVolume => Type::CreateDeleteVolume,
        ControllerCapability::PublishUnpublishVolume => Type::PublishUnpublishVolume,
        ControllerCapability::ListVolumes => Type::ListVolumes,
        ControllerCapability::ExpandVolume => Type::ExpandVolume,
    };
    ControllerServiceCapability {
        r#type: Some(controller_service_capability::Type::Rpc(
            controller_service_capability::Rpc { r#type: rpc as i32 },
        )),
    }
}

// ── Controller impl ───────────────────────────────────────────────────────────

#[tonic::async_trait]
impl Controller for ControllerService {
    async fn create_volume(
        &self,
        request: Request<ProtoCreateVolumeRequest>,
    ) -> Result<Response<CreateVolumeResponse>, Status> {
        let req = request.into_inner();

        let request = CreateVolumeRequest {
            name: req.name,
            capacity_range: capacity_range_from_proto(req.capacity_range),
            capabilities: req
                .volume_capabilities
                .iter()
                .map(capability_from_proto)
                .collect(),
            parameters: req.parameters,
            requisite_topologies: req
                .accessibility_requirements
                .map(|r| r.requisite.into_iter().map(|t| t.segments).collect())
                .unwrap_or_default(),
        };

        let info = self.controller.create_volume(request).await?;
        Ok(Response::new(CreateVolumeResponse {
            volume: Some(volume_to_proto(info)),
        }))
    }

    async fn delete_volume(
        &self,
        request: Request<DeleteVolumeRequest>,
    ) -> Result<Response<DeleteVolumeResponse>, Status> {
        let req = request.into_inner();
        self.controller.delete_volume(&req.volume_id).await?;
        Ok(Response::new(DeleteVolumeResponse {}))
    }

    async fn controller_publish_volume(
        &self,
        request: Request<ControllerPublishVolumeRequest>,
    ) -> Result<Response<ControllerPublishVolumeResponse>, Status> {
        let req = request.into_inner();

        let publish_context = self
            .controller
            .publish_volume(PublishVolumeRequest {
                volume_id: req.volume_id,
                node_id: req.node_id,
                capability: req.volume_capability.as_ref().map(capability_from_proto),
                readonly: req.readonly,
                volume_context: req.volume_context,
            })
            .await?;

        Ok(Response::new(ControllerPublishVolumeResponse { publish_context }))
    }

    async fn controller_unpublish_volume(
        &self,
        request: Request<ControllerUnpublishVolumeRequest>,
    ) -> Result<Response<ControllerUnpublishVolumeResponse>, Status> {
        let req = request.into_inner();
        self.controller
            .unpublish_volume(&req.volume_id, &req.node_id)
            .await?;
        Ok(Response::new(ControllerUnpublishVolumeResponse {}))
    }

    async fn validate_volume_capabilities(
        &self,
        request: Request<ValidateVolumeCapabilitiesRequest>,
    ) -> Result<Response<ValidateVolumeCapabilitiesResponse>, Status> {
        let req = request.into_inner();
        let capabilities: Vec<VolumeCapability> = req
            .volume_capabilities
            .iter()
            .map(capability_from_proto)
            .collect();

        let confirmed = self
            .controller
            .validate_volume_capabilities(&req.volume_id, &capabilities)
            .await?;

        Ok(Response::new(ValidateVolumeCapabilitiesResponse {
            confirmed: Some(validate_volume_capabilities_response::Confirmed {
                volume_context: req.volume_context,
                volume_capabilities: confirmed.iter().map(capability_to_proto).collect(),
                parameters: req.parameters,
            }),
            message: String::new(),
        }))
    }

    async fn list_volumes(
        &self,
        request: Request<ListVolumesRequest>,
    ) -> Result<Response<ListVolumesResponse>, Status> {
        let req = request.into_inner();
        let volumes = self.controller.list_volumes(&req.starting_token).await?;

        let entries = volumes
            .into_iter()
            .map(|info| list_volumes_response::Entry {
                volume: Some(volume_to_proto(info)),
            })
            .collect();
        Ok(Response::new(ListVolumesResponse {
            entries,
            next_token: String::new(),
        }))
    }

    async fn get_capacity(
        &self,
        _request: Request<GetCapacityRequest>,
    ) -> Result<Response<GetCapacityResponse>, Status> {
        Err(self.controller.unsupported("GetCapacity").into())
    }

    async fn controller_get_capabilities(
        &self,
        _request: Request<ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<ControllerGetCapabilitiesResponse>, Status> {
        let capabilities = self
            .controller
            .capabilities()
            .iter()
            .copied()
            .map(controller_capability_to_proto)
            .collect();
        Ok(Response::new(ControllerGetCapabilitiesResponse { capabilities }))
    }

    async fn create_snapshot(
        &self,
        _request: Request<CreateSnapshotRequest>,
    ) -> Result<Response<CreateSnapshotResponse>, Status> {
        Err(self.controller.unsupported("CreateSnapshot").into())
    }

    async fn delete_snapshot(
        &self,
        _request: Request<DeleteSnapshotRequest>,
    ) -> Result<Response<DeleteSnapshotResponse>, Status> {
        Err(self.controller.unsupported("DeleteSnapshot").into())
    }

    async fn list_snapshots(
        &self,
        _request: Request<ListSnapshotsRequest>,
    ) -> Result<Response<ListSnapshotsResponse>, Status> {
        Err(self.controller.unsupported("ListSnapshots").into())
    }

    async fn controller_expand_volume(
        &self,
        request: Request<ControllerExpandVolumeRequest>,
    ) -> Result<Response<ControllerExpandVolumeResponse>, Status> {
        let req = request.into_inner();

        let resp = self
            .controller
            .expand_volume(ExpandVolumeRequest {
                volume_id: req.volume_id,
                capacity_range: capacity_range_from_proto(req.capacity_range),
                capability: req.volume_capability.as_ref().map(capability_from_proto),
            })
            .await?;

        Ok(Response::new(ControllerExpandVolumeResponse {
            capacity_bytes: resp.capacity_bytes,
            node_expansion_required: resp.node_expansion_required,
        }))
    }

    async fn controller_get_volume(
        &self,
        _request: Request<ControllerGetVolumeRequest>,
    ) -> Result<Response<ControllerGetVolumeResponse>, Status> {
        Err(self.controller.unsupported("ControllerGetVolume").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockcsi_cloud::{CloudClient, MemoryBackend};
    use blockcsi_common::{GIB, TOPOLOGY_ZONE_KEY, attributes};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tonic::Code;

    const ZONE: &str = "rma1";
    const NODE: &str = "node-1";

    fn service() -> (Arc<MemoryBackend>, ControllerService) {
        let backend = Arc::new(MemoryBackend::new(ZONE, 128).with_server(NODE));
        let controller = VolumeController::new(CloudClient::new(backend.clone()), ZONE);
        (backend, ControllerService::new(controller))
    }

    fn mount_capability() -> csi::VolumeCapability {
        csi::VolumeCapability {
            access_type: Some(volume_capability::AccessType::Mount(
                volume_capability::MountVolume {
                    fs_type: "ext4".into(),
                    ..Default::default()
                },
            )),
            access_mode: Some(volume_capability::AccessMode {
                mode: volume_capability::access_mode::Mode::SingleNodeWriter as i32,
            }),
        }
    }

    fn block_capability() -> csi::VolumeCapability {
        csi::VolumeCapability {
            access_type: Some(volume_capability::AccessType::Block(
                volume_capability::BlockVolume {},
            )),
            ..mount_capability()
        }
    }

    async fn create(service: &ControllerService, name: &str, required_bytes: i64) -> csi::Volume {
        service
            .create_volume(Request::new(ProtoCreateVolumeRequest {
                name: name.into(),
                capacity_range: Some(csi::CapacityRange {
                    required_bytes,
                    limit_bytes: 0,
                }),
                volume_capabilities: vec![mount_capability()],
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner()
            .volume
            .unwrap()
    }

    #[test]
    fn test_capability_conversion() {
        let domain = capability_from_proto(&block_capability());
        assert_eq!(domain, VolumeCapability::block());
        assert_eq!(capability_to_proto(&domain), block_capability());

        let unset = capability_from_proto(&csi::VolumeCapability::default());
        assert_eq!(unset.access_type, AccessType::Unspecified);
        assert_eq!(unset.access_mode, AccessMode::Unknown);

        let invalid_mode = csi::VolumeCapability {
            access_mode: Some(volume_capability::AccessMode { mode: 42 }),
            ..mount_capability()
        };
        assert_eq!(
            capability_from_proto(&invalid_mode).access_mode,
            AccessMode::Unknown
        );
    }

    #[tokio::test]
    async fn test_create_volume_response() {
        let (_backend, service) = service();
        let volume = create(&service, "pvc-1", 5 * GIB).await;

        assert!(!volume.volume_id.is_empty());
        assert_eq!(volume.capacity_bytes, 5 * GIB);
        assert_eq!(volume.volume_context[attributes::VOLUME_NAME], "pvc-1");
        assert_eq!(
            volume.accessible_topology[0].segments[TOPOLOGY_ZONE_KEY],
            ZONE
        );
    }

    #[tokio::test]
    async fn test_create_volume_topology_requirement() {
        let (_backend, service) = service();
        let err = service
            .create_volume(Request::new(ProtoCreateVolumeRequest {
                name: "pvc-1".into(),
                volume_capabilities: vec![mount_capability()],
                accessibility_requirements: Some(csi::TopologyRequirement {
                    requisite: vec![csi::Topology {
                        segments: HashMap::from([(
                            TOPOLOGY_ZONE_KEY.to_string(),
                            "lpg1".to_string(),
                        )]),
                    }],
                    preferred: Vec::new(),
                }),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);
    }

    #[tokio::test]
    async fn test_publish_and_unpublish() {
        let (backend, service) = service();
        let volume = create(&service, "pvc-1", GIB).await;

        let context = service
            .controller_publish_volume(Request::new(ControllerPublishVolumeRequest {
                volume_id: volume.volume_id.clone(),
                node_id: NODE.into(),
                volume_capability: Some(mount_capability()),
                volume_context: volume.volume_context.clone(),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner()
            .publish_context;
        assert_eq!(context.len(), 4);
        assert_eq!(context[attributes::VOLUME_NAME], "pvc-1");

        service
            .controller_unpublish_volume(Request::new(ControllerUnpublishVolumeRequest {
                volume_id: volume.volume_id.clone(),
                node_id: NODE.into(),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert!(
            backend
                .volume(&volume.volume_id)
                .unwrap()
                .server_uuids
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_readonly_publish_is_rejected() {
        let (_backend, service) = service();
        let err = service
            .controller_publish_volume(Request::new(ControllerPublishVolumeRequest {
                volume_id: "v".into(),
                node_id: NODE.into(),
                volume_capability: Some(mount_capability()),
                readonly: true,
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::AlreadyExists);
        assert_eq!(err.message(), "read only Volumes are not supported");
    }

    #[tokio::test]
    async fn test_validate_volume_capabilities() {
        let (_backend, service) = service();
        let volume = create(&service, "pvc-1", GIB).await;

        let confirmed = service
            .validate_volume_capabilities(Request::new(ValidateVolumeCapabilitiesRequest {
                volume_id: volume.volume_id,
                volume_capabilities: vec![block_capability()],
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner()
            .confirmed
            .unwrap();

        assert_eq!(confirmed.volume_capabilities.len(), 1);
        let capability = &confirmed.volume_capabilities[0];
        assert!(capability.access_type.is_none());
        assert_eq!(
            capability.access_mode.as_ref().unwrap().mode(),
            volume_capability::access_mode::Mode::SingleNodeWriter
        );
    }

    #[tokio::test]
    async fn test_list_volumes() {
        let (_backend, service) = service();
        create(&service, "a", GIB).await;
        create(&service, "b", 2 * GIB).await;

        let resp = service
            .list_volumes(Request::new(ListVolumesRequest::default()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.entries.len(), 2);
        assert!(resp.next_token.is_empty());

        let err = service
            .list_volumes(Request::new(ListVolumesRequest {
                starting_token: "next".into(),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Aborted);
    }

    #[tokio::test]
    async fn test_expand_volume() {
        let (_backend, service) = service();
        let volume = create(&service, "pvc-1", 5 * GIB).await;

        let resp = service
            .controller_expand_volume(Request::new(ControllerExpandVolumeRequest {
                volume_id: volume.volume_id,
                capacity_range: Some(csi::CapacityRange {
                    required_bytes: 10 * GIB,
                    limit_bytes: 0,
                }),
                volume_capability: Some(block_capability()),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.capacity_bytes, 10 * GIB);
        assert!(!resp.node_expansion_required);
    }

    #[tokio::test]
    async fn test_controller_capabilities() {
        use controller_service_capability::rpc::Type;

        let (_backend, service) = service();
        let caps = service
            .controller_get_capabilities(Request::new(ControllerGetCapabilitiesRequest {}))
            .await
            .unwrap()
            .into_inner()
            .capabilities;

        let rpcs: Vec<i32> = caps
            .into_iter()
            .filter_map(|c| match c.r#type {
                Some(controller_service_capability::Type::Rpc(rpc)) => Some(rpc.r#type),
                None => None,
            })
            .collect();
        assert_eq!(
            rpcs,
            vec![
                Type::CreateDeleteVolume as i32,
                Type::PublishUnpublishVolume as i32,
                Type::ListVolumes as i32,
                Type::ExpandVolume as i32,
            ]
        );
    }

    #[tokio::test]
    async fn test_unimplemented_rpcs() {
        let (_backend, service) = service();

        let err = service
            .get_capacity(Request::new(GetCapacityRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);

        let err = service
            .create_snapshot(Request::new(CreateSnapshotRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);

        let err = service
            .delete_snapshot(Request::new(DeleteSnapshotRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);

        let err = service
            .list_snapshots(Request::new(ListSnapshotsRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);

        let err = service
            .controller_get_volume(Request::new(ControllerGetVolumeRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }
}
