//! In-memory block storage backend
//!
//! Implements both ports against process-local maps with the same observable
//! contract as the REST API: identifiers are generated, missing resources
//! answer 404, a volume attaches to at most one server, servers refuse
//! attachments beyond a fixed ceiling with the provider's message, and
//! volumes never shrink. Mutating calls are counted so callers can assert
//! that an idempotent path left the store untouched.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use uuid::Uuid;

use crate::api::{Server, ServerApi, Volume, VolumeApi, VolumeFilter, VolumeRequest, Zone};
use crate::error::{ApiError, ApiResult};

const STATUS_BAD_REQUEST: u16 = 400;

/// Backend call that can be made to fail once via [`MemoryBackend::fail_next`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListVolumes,
    GetVolume,
    CreateVolume,
    UpdateVolume,
    DeleteVolume,
    GetServer,
}

/// Deterministic in-process implementation of [`VolumeApi`] and [`ServerApi`]
pub struct MemoryBackend {
    zone: String,
    max_volumes_per_server: usize,
    volumes: RwLock<HashMap<String, Volume>>,
    servers: RwLock<HashMap<String, Server>>,
    faults: Mutex<HashMap<Operation, ApiError>>,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend placing volumes in `zone`
    pub fn new(zone: impl Into<String>, max_volumes_per_server: usize) -> Self {
        Self {
            zone: zone.into(),
            max_volumes_per_server,
            volumes: RwLock::new(HashMap::new()),
            servers: RwLock::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// Builder variant of [`add_server`](Self::add_server)
    #[must_use]
    pub fn with_server(self, uuid: impl Into<String>) -> Self {
        self.add_server(uuid);
        self
    }

    /// Register a server in the backend's zone
    pub fn add_server(&self, uuid: impl Into<String>) {
        let uuid = uuid.into();
        let server = Server {
            name: format!("server-{uuid}"),
            uuid: uuid.clone(),
            zone: Zone::new(self.zone.clone()),
        };
        self.servers.write().insert(uuid, server);
    }

    /// Store a volume as-is, bypassing request validation and counters
    pub fn insert_volume(&self, volume: Volume) {
        self.volumes.write().insert(volume.uuid.clone(), volume);
    }

    /// Snapshot of a stored volume
    #[must_use]
    pub fn volume(&self, uuid: &str) -> Option<Volume> {
        self.volumes.read().get(uuid).cloned()
    }

    /// Number of stored volumes
    #[must_use]
    pub fn volume_count(&self) -> usize {
        self.volumes.read().len()
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: Operation, error: ApiError) {
        self.faults.lock().insert(operation, error);
    }

    /// Number of create calls received
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::Relaxed)
    }

    /// Number of update calls received
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::Relaxed)
    }

    /// Number of delete calls received
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::Relaxed)
    }

    fn injected(&self, operation: Operation) -> ApiResult<()> {
        match self.faults.lock().remove(&operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn attach_limit_error(&self) -> ApiError {
        ApiError::response(
            STATUS_BAD_REQUEST,
            format!(
                "Due to internal limitations, it is currently not possible to attach more than {} volumes to a server.",
                self.max_volumes_per_server
            ),
        )
    }

    fn set_servers(
        &self,
        volumes: &mut HashMap<String, Volume>,
        uuid: &str,
        servers: &[String],
    ) -> ApiResult<()> {
        if servers.len() > 1 {
            return Err(ApiError::response(
                STATUS_BAD_REQUEST,
                "multi attach is not implemented",
            ));
        }

        if let Some(server_uuid) = servers.first() {
            if !self.servers.read().contains_key(server_uuid) {
                return Err(ApiError::not_found(format!(
                    "server {server_uuid} not found"
                )));
            }
            let attached = volumes
                .values()
                .filter(|v| v.uuid != uuid && v.server_uuids.contains(server_uuid))
                .count();
            if attached >= self.max_volumes_per_server {
                return Err(self.attach_limit_error());
            }
        }

        if let Some(volume) = volumes.get_mut(uuid) {
            volume.server_uuids = servers.to_vec();
        }
        Ok(())
    }
}

fn volume_not_found(uuid: &str) -> ApiError {
    ApiError::not_found(format!("volume {uuid} not found"))
}

#[async_trait]
impl VolumeApi for MemoryBackend {
    async fn list(&self, filter: &VolumeFilter) -> ApiResult<Vec<Volume>> {
        self.injected(Operation::ListVolumes)?;

        let mut volumes: Vec<Volume> = self
            .volumes
            .read()
            .values()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uuid.cmp(&b.uuid)));
        Ok(volumes)
    }

    async fn get(&self, uuid: &str) -> ApiResult<Volume> {
        self.injected(Operation::GetVolume)?;
        self.volume(uuid).ok_or_else(|| volume_not_found(uuid))
    }

    async fn create(&self, request: &VolumeRequest) -> ApiResult<Volume> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        self.injected(Operation::CreateVolume)?;

        let name = request
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ApiError::response(STATUS_BAD_REQUEST, "name is required"))?;
        let volume_type = request.volume_type.unwrap_or_default();
        let size_gb = request.size_gb.unwrap_or(volume_type.step_gb());
        if size_gb <= 0 || size_gb % volume_type.step_gb() != 0 {
            return Err(ApiError::response(
                STATUS_BAD_REQUEST,
                format!(
                    "size_gb must be a positive multiple of {} for {volume_type} volumes",
                    volume_type.step_gb()
                ),
            ));
        }

        let volume = Volume {
            uuid: Uuid::new_v4().to_string(),
            name,
            size_gb,
            volume_type,
            zone: Zone::new(request.zone.clone().unwrap_or_else(|| self.zone.clone())),
            server_uuids: Vec::new(),
        };

        self.volumes
            .write()
            .insert(volume.uuid.clone(), volume.clone());

        debug!(uuid = %volume.uuid, name = %volume.name, size_gb, "created volume");
        Ok(volume)
    }

    async fn update(&self, uuid: &str, request: &VolumeRequest) -> ApiResult<()> {
        self.update_calls.fetch_add(1, Ordering::Relaxed);
        self.injected(Operation::UpdateVolume)?;

        let mut volumes = self.volumes.write();
        let current = volumes.get(uuid).ok_or_else(|| volume_not_found(uuid))?;

        if let Some(size_gb) = request.size_gb {
            if size_gb < current.size_gb {
                return Err(ApiError::response(
                    STATUS_BAD_REQUEST,
                    "volumes can only be scaled up",
                ));
            }
            if size_gb % current.volume_type.step_gb() != 0 {
                return Err(ApiError::response(
                    STATUS_BAD_REQUEST,
                    format!(
                        "size_gb must be a multiple of {}",
                        current.volume_type.step_gb()
                    ),
                ));
            }
        }

        if let Some(servers) = &request.server_uuids {
            self.set_servers(&mut volumes, uuid, servers)?;
        }
        if let (Some(size_gb), Some(volume)) = (request.size_gb, volumes.get_mut(uuid)) {
            volume.size_gb = size_gb;
        }
        Ok(())
    }

    async fn delete(&self, uuid: &str) -> ApiResult<()> {
        self.delete_calls.fetch_add(1, Ordering::Relaxed);
        self.injected(Operation::DeleteVolume)?;

        self.volumes
            .write()
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| volume_not_found(uuid))
    }
}

#[async_trait]
impl ServerApi for MemoryBackend {
    async fn get(&self, uuid: &str) -> ApiResult<Server> {
        self.injected(Operation::GetServer)?;
        self.servers
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("server {uuid} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockcsi_common::StorageType;

    fn backend() -> MemoryBackend {
        MemoryBackend::new("rma1", 2)
            .with_server("srv-1")
            .with_server("srv-2")
    }

    async fn create(backend: &MemoryBackend, name: &str, size_gb: i64) -> Volume {
        VolumeApi::create(
            backend,
            &VolumeRequest::create(name, size_gb, StorageType::Ssd, "rma1"),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let backend = backend();
        let volume = create(&backend, "pvc-1", 5).await;

        let fetched = VolumeApi::get(&backend, &volume.uuid).await.unwrap();
        assert_eq!(fetched, volume);
        assert_eq!(fetched.zone.slug, "rma1");
        assert_eq!(backend.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_unaligned_size() {
        let backend = backend();
        let err = VolumeApi::create(
            &backend,
            &VolumeRequest::create("pvc-1", 150, StorageType::Bulk, "rma1"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(backend.volume_count(), 0);
    }

    #[tokio::test]
    async fn test_list_filters_by_name() {
        let backend = backend();
        create(&backend, "a", 1).await;
        create(&backend, "b", 1).await;
        create(&backend, "b", 2).await;

        assert_eq!(backend.list(&VolumeFilter::all()).await.unwrap().len(), 3);
        let named = backend.list(&VolumeFilter::by_name("b")).await.unwrap();
        assert_eq!(named.len(), 2);
        assert!(named.iter().all(|v| v.name == "b"));
    }

    #[tokio::test]
    async fn test_missing_volume_is_not_found() {
        let backend = backend();
        assert!(VolumeApi::get(&backend, "nope").await.unwrap_err().is_not_found());
        assert!(backend.delete("nope").await.unwrap_err().is_not_found());
        assert!(
            backend
                .update("nope", &VolumeRequest::detach())
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert_eq!(backend.delete_calls(), 1);
        assert_eq!(backend.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_attach_and_detach() {
        let backend = backend();
        let volume = create(&backend, "pvc-1", 1).await;

        backend
            .update(&volume.uuid, &VolumeRequest::attach("srv-1"))
            .await
            .unwrap();
        assert_eq!(backend.volume(&volume.uuid).unwrap().server_uuids, vec!["srv-1"]);

        backend
            .update(&volume.uuid, &VolumeRequest::detach())
            .await
            .unwrap();
        assert!(backend.volume(&volume.uuid).unwrap().server_uuids.is_empty());
    }

    #[tokio::test]
    async fn test_attach_rejections() {
        let backend = backend();
        let volume = create(&backend, "pvc-1", 1).await;

        let multi = VolumeRequest {
            server_uuids: Some(vec!["srv-1".into(), "srv-2".into()]),
            ..VolumeRequest::default()
        };
        let err = backend.update(&volume.uuid, &multi).await.unwrap_err();
        assert_eq!(err, ApiError::response(400, "multi attach is not implemented"));

        let err = backend
            .update(&volume.uuid, &VolumeRequest::attach("srv-unknown"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_attach_limit() {
        let backend = backend();
        for name in ["a", "b"] {
            let volume = create(&backend, name, 1).await;
            backend
                .update(&volume.uuid, &VolumeRequest::attach("srv-1"))
                .await
                .unwrap();
        }

        let third = create(&backend, "c", 1).await;
        let err = backend
            .update(&third.uuid, &VolumeRequest::attach("srv-1"))
            .await
            .unwrap_err();
        match err {
            ApiError::Response { status, detail } => {
                assert_eq!(status, 400);
                assert!(detail.contains("not possible to attach more than 2 volumes"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Re-attaching a volume already on the server does not count against it
        let first = backend.list(&VolumeFilter::by_name("a")).await.unwrap();
        backend
            .update(&first[0].uuid, &VolumeRequest::attach("srv-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resize_only_grows() {
        let backend = backend();
        let volume = create(&backend, "pvc-1", 5).await;

        backend
            .update(&volume.uuid, &VolumeRequest::resize(8))
            .await
            .unwrap();
        assert_eq!(backend.volume(&volume.uuid).unwrap().size_gb, 8);

        let err = backend
            .update(&volume.uuid, &VolumeRequest::resize(4))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(backend.volume(&volume.uuid).unwrap().size_gb, 8);
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let backend = backend();
        backend.fail_next(Operation::ListVolumes, ApiError::Timeout);

        assert_eq!(
            backend.list(&VolumeFilter::all()).await.unwrap_err(),
            ApiError::Timeout
        );
        assert!(backend.list(&VolumeFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_lookup() {
        let backend = backend();
        let server = ServerApi::get(&backend, "srv-1").await.unwrap();
        assert_eq!(server.zone.slug, "rma1");
        assert!(
            ServerApi::get(&backend, "srv-9")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }
}
