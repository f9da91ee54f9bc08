//! In-process storage backend.
//!
//! [`MemoryBackend`] models a single RSD storage pool of fixed size.  It keeps
//! all state in memory, so volumes do not survive a restart; it backs the
//! `csi-rsd` binary when no remote resource manager is configured and serves
//! as the backend in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, instrument};

use super::StorageBackend;
use crate::error::CsiError;
use crate::types::{Volume, VolumeId};

/// Context key carrying the requested volume name to Node operations.
pub const CONTEXT_VOLUME_NAME: &str = "csi.rsd.intel.com/volume-name";

/// Fixed-size pool of volumes held in concurrent maps.
#[derive(Debug)]
pub struct MemoryBackend {
    /// Total pool size in bytes.
    capacity_bytes: u64,
    /// Bytes handed out to live volumes.
    allocated: AtomicU64,
    volumes: DashMap<VolumeId, Volume>,
    /// Requested name → assigned id, for idempotent allocation.
    names: DashMap<String, VolumeId>,
}

impl MemoryBackend {
    /// A pool of `capacity_bytes`.
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes,
            allocated: AtomicU64::new(0),
            volumes: DashMap::new(),
            names: DashMap::new(),
        }
    }

    fn reserve(&self, bytes: u64) -> Result<(), CsiError> {
        self.allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes)
                    .filter(|total| *total <= self.capacity_bytes)
            })
            .map(|_| ())
            .map_err(|used| {
                CsiError::ResourceExhausted(format!(
                    "requested {bytes} bytes, {} available",
                    self.capacity_bytes.saturating_sub(used)
                ))
            })
    }

    /// Reserve capacity and record a new volume.  The caller holds the
    /// name entry.
    fn insert_volume(
        &self,
        name: &str,
        capacity_bytes: u64,
        parameters: HashMap<String, String>,
    ) -> Result<Volume, CsiError> {
        self.reserve(capacity_bytes)?;
        let volume = Volume {
            volume_id: VolumeId(format!("rsd-{}", uuid::Uuid::new_v4())),
            name: name.to_owned(),
            capacity_bytes,
            parameters,
            volume_context: HashMap::from([(CONTEXT_VOLUME_NAME.to_owned(), name.to_owned())]),
        };
        self.volumes
            .insert(volume.volume_id.clone(), volume.clone());
        info!(%name, id = %volume.volume_id, capacity_bytes, "volume allocated");
        Ok(volume)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[instrument(skip(self, parameters))]
    async fn allocate(
        &self,
        name: &str,
        capacity_bytes: u64,
        parameters: HashMap<String, String>,
    ) -> Result<Volume, CsiError> {
        // The name entry stays locked until the volume record is in place.
        match self.names.entry(name.to_owned()) {
            Entry::Occupied(mut entry) => {
                let existing = self.volumes.get(entry.get()).map(|v| v.clone());
                let Some(existing) = existing else {
                    // Stale name without metadata: allocate afresh.
                    let volume = self.insert_volume(name, capacity_bytes, parameters)?;
                    entry.insert(volume.volume_id.clone());
                    return Ok(volume);
                };
                if existing.capacity_bytes != capacity_bytes {
                    return Err(CsiError::VolumeAlreadyExists(format!(
                        "{name} with capacity {}",
                        existing.capacity_bytes
                    )));
                }
                debug!(%name, id = %existing.volume_id, "returning existing volume");
                Ok(existing)
            }
            Entry::Vacant(entry) => {
                let volume = self.insert_volume(name, capacity_bytes, parameters)?;
                entry.insert(volume.volume_id.clone());
                Ok(volume)
            }
        }
    }

    #[instrument(skip(self))]
    async fn release(&self, volume_id: &VolumeId) -> Result<bool, CsiError> {
        let name = self.volumes.get(volume_id).map(|v| v.name.clone());
        let Some(name) = name else {
            return Ok(false);
        };
        // Lock the name before the volume, in the same order as `allocate`,
        // so an allocation never sees a name whose volume is half removed.
        let removed = match self.names.entry(name) {
            Entry::Occupied(entry) => {
                let removed = self.volumes.remove(volume_id);
                if entry.get() == volume_id {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => self.volumes.remove(volume_id),
        };
        let Some((_, volume)) = removed else {
            return Ok(false);
        };
        self.allocated
            .fetch_sub(volume.capacity_bytes, Ordering::AcqRel);
        info!(id = %volume_id, "volume released");
        Ok(true)
    }

    async fn get(&self, volume_id: &VolumeId) -> Result<Option<Volume>, CsiError> {
        Ok(self.volumes.get(volume_id).map(|v| v.clone()))
    }

    async fn list(&self) -> Result<Vec<Volume>, CsiError> {
        Ok(self.volumes.iter().map(|r| r.value().clone()).collect())
    }

    async fn available_capacity(&self) -> Result<u64, CsiError> {
        Ok(self
            .capacity_bytes
            .saturating_sub(self.allocated.load(Ordering::Acquire)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[tokio::test]
    async fn allocate_and_release() {
        let backend = MemoryBackend::new(10 * GIB);

        let vol = backend.allocate("db", 4 * GIB, HashMap::new()).await.unwrap();
        assert!(vol.volume_id.0.starts_with("rsd-"));
        assert_eq!(vol.volume_context[CONTEXT_VOLUME_NAME], "db");
        assert_eq!(backend.available_capacity().await.unwrap(), 6 * GIB);
        assert_eq!(backend.list().await.unwrap().len(), 1);

        assert!(backend.release(&vol.volume_id).await.unwrap());
        assert!(!backend.release(&vol.volume_id).await.unwrap());
        assert_eq!(backend.available_capacity().await.unwrap(), 10 * GIB);
        assert!(backend.get(&vol.volume_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn allocate_is_idempotent_by_name() {
        let backend = MemoryBackend::new(10 * GIB);

        let first = backend.allocate("db", GIB, HashMap::new()).await.unwrap();
        let second = backend.allocate("db", GIB, HashMap::new()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.available_capacity().await.unwrap(), 9 * GIB);

        let err = backend
            .allocate("db", 2 * GIB, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CsiError::VolumeAlreadyExists(_)));
    }

    #[tokio::test]
    async fn name_is_reusable_after_release() {
        let backend = MemoryBackend::new(GIB);
        let first = backend.allocate("scratch", GIB, HashMap::new()).await.unwrap();
        backend.release(&first.volume_id).await.unwrap();

        let second = backend.allocate("scratch", GIB, HashMap::new()).await.unwrap();
        assert_ne!(first.volume_id, second.volume_id);
    }

    #[tokio::test]
    async fn pool_cannot_be_overcommitted() {
        let backend = MemoryBackend::new(3 * GIB);
        backend.allocate("a", 2 * GIB, HashMap::new()).await.unwrap();

        let err = backend.allocate("b", 2 * GIB, HashMap::new()).await.unwrap_err();
        assert!(matches!(err, CsiError::ResourceExhausted(_)), "{err}");
        assert!(backend.names.get("b").is_none());
        assert_eq!(backend.available_capacity().await.unwrap(), GIB);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_release_and_allocate_of_one_name() {
        let backend = std::sync::Arc::new(MemoryBackend::new(4 * GIB));

        for _ in 0..2_000 {
            let vol = backend.allocate("pvc", GIB, HashMap::new()).await.unwrap();

            let releaser = std::sync::Arc::clone(&backend);
            let release = tokio::spawn(async move { releaser.release(&vol.volume_id).await });
            let allocator = std::sync::Arc::clone(&backend);
            let allocate =
                tokio::spawn(async move { allocator.allocate("pvc", GIB, HashMap::new()).await });

            release.await.unwrap().unwrap();
            allocate.await.unwrap().unwrap();

            for vol in backend.list().await.unwrap() {
                backend.release(&vol.volume_id).await.unwrap();
            }
            assert!(backend.names.is_empty());
            assert_eq!(backend.available_capacity().await.unwrap(), 4 * GIB);
        }
    }
}
