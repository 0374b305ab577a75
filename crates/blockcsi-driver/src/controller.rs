//! Volume lifecycle controller
//!
//! Implements the controller operations against the block storage API. The
//! controller keeps no state of its own: every operation is made idempotent
//! by inspecting the remote store before mutating it, and the orchestrator
//! owns retries.
//!
//! Creation looks volumes up by name before creating them. The lookup and
//! the create are not atomic, so two concurrent creates for the same name
//! can both see no match and both create a volume.

use blockcsi_cloud::{CloudClient, VolumeFilter, VolumeRequest};
use blockcsi_common::{GIB, StorageType, TOPOLOGY_ZONE_KEY, attributes};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use crate::capability::{
    AccessType, SUPPORTED_ACCESS_MODE, VolumeCapability, validate_capabilities,
    validate_luks_capabilities,
};
use crate::capacity::calculate_storage_gb;
use crate::error::{CsiError, CsiResult};
use crate::translate::{translate, translate_attach};
use crate::types::{
    ControllerCapability, CreateVolumeRequest, ExpandVolumeRequest, ExpandVolumeResponse,
    LuksContext, PublishVolumeRequest, Topology, VolumeInfo,
};

/// RPCs the controller implements
const CAPABILITIES: [ControllerCapability; 4] = [
    ControllerCapability::CreateDeleteVolume,
    ControllerCapability::PublishUnpublishVolume,
    ControllerCapability::ListVolumes,
    ControllerCapability::ExpandVolume,
];

/// Stateless controller bound to one zone
#[derive(Clone)]
pub struct VolumeController {
    client: CloudClient,
    zone: String,
}

const fn gb_to_bytes(size_gb: i64) -> i64 {
    size_gb.saturating_mul(GIB)
}

fn unsatisfiable(violations: &[String]) -> CsiError {
    CsiError::invalid_argument(format!(
        "volume capabilities cannot be satisfied: {}",
        violations.join("; ")
    ))
}

impl VolumeController {
    /// Create a controller provisioning in `zone`
    pub fn new(client: CloudClient, zone: impl Into<String>) -> Self {
        Self {
            client,
            zone: zone.into(),
        }
    }

    /// Zone this controller provisions in
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Controller RPCs advertised to the orchestrator
    #[must_use]
    pub const fn capabilities(&self) -> &'static [ControllerCapability] {
        &CAPABILITIES
    }

    fn topology(&self) -> Topology {
        HashMap::from([(TOPOLOGY_ZONE_KEY.to_string(), self.zone.clone())])
    }

    /// Create a volume, or return the existing one with the same name and size.
    #[instrument(skip_all, fields(method = "create_volume", volume_name = %request.name))]
    pub async fn create_volume(&self, request: CreateVolumeRequest) -> CsiResult<VolumeInfo> {
        if request.name.is_empty() {
            return Err(CsiError::invalid_argument(
                "CreateVolume Name must be provided",
            ));
        }
        if request.capabilities.is_empty() {
            return Err(CsiError::invalid_argument(
                "CreateVolume Volume capabilities must be provided",
            ));
        }
        let violations = validate_capabilities(&request.capabilities);
        if !violations.is_empty() {
            return Err(unsatisfiable(&violations));
        }

        for topology in &request.requisite_topologies {
            if let Some(zone) = topology.get(TOPOLOGY_ZONE_KEY)
                && *zone != self.zone
            {
                return Err(CsiError::ResourceExhausted(format!(
                    "volume can be only created in zone: {:?}, got: {zone:?}",
                    self.zone
                )));
            }
        }

        let volume_type = StorageType::from_parameter(
            request
                .parameters
                .get(attributes::VOLUME_TYPE)
                .map(String::as_str),
        )
        .map_err(|e| CsiError::invalid_argument(e.to_string()))?;

        let size_gb = calculate_storage_gb(request.capacity_range, volume_type)
            .map_err(|e| CsiError::invalid_argument(e.to_string()))?;

        let luks = LuksContext::from_parameters(&request.parameters);
        if luks.encrypted {
            let violations = validate_luks_capabilities(&request.capabilities);
            if !violations.is_empty() {
                return Err(unsatisfiable(&violations));
            }
        }

        info!(
            size_gb,
            %volume_type,
            luks_encrypted = luks.encrypted,
            "create volume called"
        );

        let existing = self
            .client
            .volumes
            .list(&VolumeFilter::by_name(&request.name))
            .await
            .map_err(CsiError::internal)?;

        let mut volume_context =
            HashMap::from([(attributes::VOLUME_NAME.to_string(), request.name.clone())]);
        luks.write_volume_context(&mut volume_context);
        let mut info = VolumeInfo {
            volume_id: String::new(),
            capacity_bytes: gb_to_bytes(size_gb),
            volume_context,
            accessible_topology: vec![self.topology()],
        };

        match existing.as_slice() {
            [] => {}
            [volume] => {
                if volume.size_gb != size_gb {
                    return Err(CsiError::AlreadyExists(format!(
                        "invalid option requested size: {size_gb}"
                    )));
                }
                info!(volume_id = %volume.uuid, "volume already created");
                info.volume_id.clone_from(&volume.uuid);
                return Ok(info);
            }
            _ => {
                return Err(CsiError::Internal(format!(
                    "fatal issue: duplicate volume {:?} exists",
                    request.name
                )));
            }
        }

        let create = VolumeRequest::create(&request.name, size_gb, volume_type, &self.zone);
        let volume = self
            .client
            .volumes
            .create(&create)
            .await
            .map_err(CsiError::internal)?;

        info!(volume_id = %volume.uuid, "volume created");
        info.volume_id = volume.uuid;
        Ok(info)
    }

    /// Delete a volume. A volume that no longer exists counts as deleted.
    #[instrument(skip_all, fields(method = "delete_volume", volume_id = %volume_id))]
    pub async fn delete_volume(&self, volume_id: &str) -> CsiResult<()> {
        if volume_id.is_empty() {
            return Err(CsiError::invalid_argument(
                "DeleteVolume Volume ID must be provided",
            ));
        }

        info!("delete volume called");
        match self.client.volumes.delete(volume_id).await {
            Ok(()) => {
                info!("volume is deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!("assuming volume is deleted because it does not exist");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "delete volume failed");
                Err(CsiError::Backend(e))
            }
        }
    }

    /// Attach a volume to a node and return the publish context.
    #[instrument(
        skip_all,
        fields(
            method = "controller_publish_volume",
            volume_id = %request.volume_id,
            node_id = %request.node_id,
        )
    )]
    pub async fn publish_volume(
        &self,
        request: PublishVolumeRequest,
    ) -> CsiResult<HashMap<String, String>> {
        if request.volume_id.is_empty() {
            return Err(CsiError::invalid_argument(
                "ControllerPublishVolume Volume ID must be provided",
            ));
        }
        if request.node_id.is_empty() {
            return Err(CsiError::invalid_argument(
                "ControllerPublishVolume Node ID must be provided",
            ));
        }
        if request.capability.is_none() {
            return Err(CsiError::invalid_argument(
                "ControllerPublishVolume Volume capability must be provided",
            ));
        }
        // Orchestrator conformance suites expect this code for read-only
        // publish requests.
        if request.readonly {
            return Err(CsiError::AlreadyExists(
                "read only Volumes are not supported".to_string(),
            ));
        }

        info!("controller publish volume called");
        self.client
            .volumes
            .update(&request.volume_id, &VolumeRequest::attach(&request.node_id))
            .await
            .map_err(|e| translate_attach(&e, "attaching volume"))?;
        info!("volume is attached");

        let volume = self
            .client
            .volumes
            .get(&request.volume_id)
            .await
            .map_err(|e| translate(&e, "fetch volume"))?;

        let echo = |key: &str| {
            (
                key.to_string(),
                request.volume_context.get(key).cloned().unwrap_or_default(),
            )
        };
        Ok(HashMap::from([
            (attributes::VOLUME_NAME.to_string(), volume.name),
            echo(attributes::LUKS_ENCRYPTED),
            echo(attributes::LUKS_CIPHER),
            echo(attributes::LUKS_KEY_SIZE),
        ]))
    }

    /// Detach a volume. A volume that no longer exists counts as detached.
    #[instrument(
        skip_all,
        fields(method = "controller_unpublish_volume", volume_id = %volume_id, node_id = %node_id)
    )]
    pub async fn unpublish_volume(&self, volume_id: &str, node_id: &str) -> CsiResult<()> {
        if volume_id.is_empty() {
            return Err(CsiError::invalid_argument(
                "ControllerUnpublishVolume Volume ID must be provided",
            ));
        }

        info!("controller unpublish volume called");
        match self.client.volumes.get(volume_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                info!("assuming volume is detached because it does not exist");
                return Ok(());
            }
            Err(e) => return Err(CsiError::Backend(e)),
        }

        self.client
            .volumes
            .update(volume_id, &VolumeRequest::detach())
            .await
            .map_err(|e| translate(&e, "unpublish volume"))?;

        info!("volume is detached");
        Ok(())
    }

    /// Confirm the supported capability for an existing volume.
    ///
    /// Requested capabilities are not checked against the volume itself.
    #[instrument(skip_all, fields(method = "validate_volume_capabilities", volume_id = %volume_id))]
    pub async fn validate_volume_capabilities(
        &self,
        volume_id: &str,
        capabilities: &[VolumeCapability],
    ) -> CsiResult<Vec<VolumeCapability>> {
        if volume_id.is_empty() {
            return Err(CsiError::invalid_argument(
                "ValidateVolumeCapabilities Volume ID must be provided",
            ));
        }
        if capabilities.is_empty() {
            return Err(CsiError::invalid_argument(
                "ValidateVolumeCapabilities Volume Capabilities must be provided",
            ));
        }

        info!("validate volume capabilities called");
        self.client
            .volumes
            .get(volume_id)
            .await
            .map_err(|e| translate(&e, "fetch volume to validate capabilities"))?;

        Ok(vec![VolumeCapability {
            access_type: AccessType::Unspecified,
            access_mode: SUPPORTED_ACCESS_MODE,
        }])
    }

    /// List every volume. Pagination is not supported.
    #[instrument(skip_all, fields(method = "list_volumes"))]
    pub async fn list_volumes(&self, starting_token: &str) -> CsiResult<Vec<VolumeInfo>> {
        if !starting_token.is_empty() {
            return Err(CsiError::Aborted("pagination not supported".to_string()));
        }

        info!("list volumes called");
        let volumes = self.client.volumes.list(&VolumeFilter::all()).await?;

        let entries: Vec<VolumeInfo> = volumes
            .into_iter()
            .map(|volume| VolumeInfo {
                volume_id: volume.uuid,
                capacity_bytes: gb_to_bytes(volume.size_gb),
                ..VolumeInfo::default()
            })
            .collect();
        info!(count = entries.len(), "volumes listed");
        Ok(entries)
    }

    /// Grow a volume. Never shrinks; a request at or below the current size
    /// leaves the backend untouched.
    #[instrument(skip_all, fields(method = "controller_expand_volume", volume_id = %request.volume_id))]
    pub async fn expand_volume(
        &self,
        request: ExpandVolumeRequest,
    ) -> CsiResult<ExpandVolumeResponse> {
        if request.volume_id.is_empty() {
            return Err(CsiError::invalid_argument(
                "ControllerExpandVolume volume ID missing in request",
            ));
        }

        let volume = self
            .client
            .volumes
            .get(&request.volume_id)
            .await
            .map_err(|e| {
                CsiError::Internal(format!(
                    "ControllerExpandVolume could not retrieve existing volume: {e}"
                ))
            })?;

        let size_gb = calculate_storage_gb(request.capacity_range, volume.volume_type).map_err(
            |e| CsiError::OutOfRange(format!("ControllerExpandVolume invalid capacity range: {e}")),
        )?;

        info!("controller expand volume called");

        // The node still has to grow its filesystem when the volume was
        // resized out of band, so expansion is reported as required.
        if size_gb <= volume.size_gb {
            info!(
                current_size_gb = volume.size_gb,
                requested_size_gb = size_gb,
                "skipping volume resize because current volume size exceeds requested volume size"
            );
            return Ok(ExpandVolumeResponse {
                capacity_bytes: gb_to_bytes(volume.size_gb),
                node_expansion_required: true,
            });
        }

        self.client
            .volumes
            .update(&volume.uuid, &VolumeRequest::resize(size_gb))
            .await
            .map_err(|e| {
                CsiError::Internal(format!(
                    "cannot resize volume {}: {e}",
                    request.volume_id
                ))
            })?;
        info!(new_size_gb = size_gb, "volume was resized");

        let node_expansion_required = !request
            .capability
            .as_ref()
            .is_some_and(VolumeCapability::is_block);
        if !node_expansion_required {
            info!("node expansion is not required for block volumes");
        }

        Ok(ExpandVolumeResponse {
            capacity_bytes: gb_to_bytes(size_gb),
            node_expansion_required,
        })
    }

    /// Error for an RPC the plugin deliberately does not implement
    pub fn unsupported(&self, method: &str) -> CsiError {
        warn!(method, "unimplemented method called");
        CsiError::Unimplemented(format!("{method} is not supported"))
    }
}
