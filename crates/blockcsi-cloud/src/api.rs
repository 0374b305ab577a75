//! Block storage API ports
//!
//! Resource models as the API serializes them, the sparse update request,
//! and the two async traits the controller depends on.

use async_trait::async_trait;
use blockcsi_common::StorageType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiResult;

/// Placement zone of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Zone identifier, e.g. `rma1`
    pub slug: String,
}

impl Zone {
    /// Create a zone from its slug
    pub fn new(slug: impl Into<String>) -> Self {
        Self { slug: slug.into() }
    }
}

/// A block storage volume as stored by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Identifier assigned by the API
    pub uuid: String,
    /// Caller-supplied name, not unique on the API side
    pub name: String,
    /// Size in whole gigabytes, a multiple of the type's step
    pub size_gb: i64,
    /// Storage type, immutable after creation
    #[serde(rename = "type")]
    pub volume_type: StorageType,
    /// Placement zone
    pub zone: Zone,
    /// Servers the volume is attached to (zero or one)
    #[serde(default)]
    pub server_uuids: Vec<String>,
}

/// A compute server volumes can be attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Identifier assigned by the API
    pub uuid: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Placement zone
    pub zone: Zone,
}

/// Create or sparse-update request for a volume.
///
/// Unset fields are omitted from the wire, so an update carrying only
/// `server_uuids` attaches or detaches and one carrying only `size_gb`
/// resizes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_gb: Option<i64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<StorageType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_uuids: Option<Vec<String>>,
}

impl VolumeRequest {
    /// Request creating a new, unattached volume
    pub fn create(
        name: impl Into<String>,
        size_gb: i64,
        volume_type: StorageType,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            size_gb: Some(size_gb),
            volume_type: Some(volume_type),
            zone: Some(zone.into()),
            server_uuids: None,
        }
    }

    /// Update replacing the server set with exactly `server_uuid`
    pub fn attach(server_uuid: impl Into<String>) -> Self {
        Self {
            server_uuids: Some(vec![server_uuid.into()]),
            ..Self::default()
        }
    }

    /// Update clearing the server set
    #[must_use]
    pub fn detach() -> Self {
        Self {
            server_uuids: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Update growing the volume to `size_gb`
    #[must_use]
    pub fn resize(size_gb: i64) -> Self {
        Self {
            size_gb: Some(size_gb),
            ..Self::default()
        }
    }
}

/// Filter for [`VolumeApi::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeFilter {
    /// Exact volume name
    pub name: Option<String>,
}

impl VolumeFilter {
    /// Match every volume
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Match volumes with exactly this name
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    /// Check a volume against the filter
    #[must_use]
    pub fn matches(&self, volume: &Volume) -> bool {
        self.name.as_deref().is_none_or(|name| volume.name == name)
    }
}

/// Volume operations of the block storage API
#[async_trait]
pub trait VolumeApi: Send + Sync {
    /// List volumes matching `filter`
    async fn list(&self, filter: &VolumeFilter) -> ApiResult<Vec<Volume>>;

    /// Fetch a single volume
    async fn get(&self, uuid: &str) -> ApiResult<Volume>;

    /// Create a volume
    async fn create(&self, request: &VolumeRequest) -> ApiResult<Volume>;

    /// Apply a sparse update (attach, detach or resize)
    async fn update(&self, uuid: &str, request: &VolumeRequest) -> ApiResult<()>;

    /// Delete a volume
    async fn delete(&self, uuid: &str) -> ApiResult<()>;
}

/// Server operations of the block storage API
#[async_trait]
pub trait ServerApi: Send + Sync {
    /// Fetch a single server
    async fn get(&self, uuid: &str) -> ApiResult<Server>;
}

/// Handle bundling both ports of one adapter
#[derive(Clone)]
pub struct CloudClient {
    /// Volume port
    pub volumes: Arc<dyn VolumeApi>,
    /// Server port. No controller operation reads it yet; attach relies on
    /// the volume update reporting an unknown server as not found.
    pub servers: Arc<dyn ServerApi>,
}

impl CloudClient {
    /// Bundle an adapter implementing both ports
    pub fn new<T>(adapter: Arc<T>) -> Self
    where
        T: VolumeApi + ServerApi + 'static,
    {
        Self {
            volumes: adapter.clone(),
            servers: adapter,
        }
    }
}
