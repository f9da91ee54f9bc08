//! CSI Node service trait.
//!
//! Part of the CSI contract but not served by this plugin: RSD volumes are
//! attached to hosts by the resource manager, so the driver only advertises
//! the control plane.  A [`ServiceRegistry`](crate::registry::ServiceRegistry)
//! can still accept an implementation, which keeps the contract complete for
//! other plugins and for tests.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{NodeInfo, NodePublishVolumeRequest, NodeStageVolumeRequest, VolumeId};

/// Node service — host-local attach / mount operations.
#[async_trait]
pub trait CsiNode: Send + Sync {
    /// Stage a volume at the global staging path.
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError>;

    /// Undo [`CsiNode::stage_volume`].
    async fn unstage_volume(
        &self,
        volume_id: &VolumeId,
        staging_target_path: &str,
    ) -> Result<(), CsiError>;

    /// Bind-mount the staged path into the workload.
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError>;

    /// Undo [`CsiNode::publish_volume`].
    async fn unpublish_volume(&self, volume_id: &VolumeId, target_path: &str)
    -> Result<(), CsiError>;

    /// Return information about the node on which this service is running.
    async fn get_info(&self) -> Result<NodeInfo, CsiError>;
}
