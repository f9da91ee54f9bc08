//! Storage backends.
//!
//! The driver reaches the RSD resource manager through the [`StorageBackend`]
//! trait and never owns the backend's lifecycle: the handle is created by the
//! caller and shared.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{Volume, VolumeId};

pub mod memory;

pub use memory::MemoryBackend;

/// Volume allocation against a pool of remote storage.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Allocate a volume called `name`.  Allocating an existing name with
    /// the same capacity returns the existing volume.
    async fn allocate(
        &self,
        name: &str,
        capacity_bytes: u64,
        parameters: HashMap<String, String>,
    ) -> Result<Volume, CsiError>;

    /// Release a volume.  Returns `false` when it did not exist.
    async fn release(&self, volume_id: &VolumeId) -> Result<bool, CsiError>;

    /// Look a volume up by id.
    async fn get(&self, volume_id: &VolumeId) -> Result<Option<Volume>, CsiError>;

    /// All allocated volumes.
    async fn list(&self) -> Result<Vec<Volume>, CsiError>;

    /// Unallocated bytes left in the pool.
    async fn available_capacity(&self) -> Result<u64, CsiError>;
}
