//! The RSD CSI driver.
//!
//! [`Driver`] is the composition root: it owns the configuration and the
//! readiness state, shares the storage backend handle, and implements both
//! the Identity and the Controller facet.  [`Driver::run`] brings the plugin
//! up in a fixed order:
//!
//! 1. resolve the endpoint,
//! 2. acquire the listening socket,
//! 3. build the server with the error interceptor,
//! 4. register the active facets,
//! 5. mark the plugin ready,
//! 6. serve until stopped.
//!
//! Any failure in steps 1–4 is returned without serving.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, instrument};

use crate::backend::StorageBackend;
use crate::config::DriverConfig;
use crate::controller::CsiController;
use crate::endpoint::Endpoint;
use crate::error::{CsiError, DriverError};
use crate::identity::CsiIdentity;
use crate::interceptor::{ErrorInterceptor, FatalHook};
use crate::readiness::Readiness;
use crate::registry::{Facet, FacetSet};
use crate::socket;
use crate::transport::server::CsiServer;
use crate::types::*;

/// Name used by Kubernetes and the CSI system for this plugin.
pub const DRIVER_NAME: &str = "csi.rsd.intel.com";

/// Current driver version.
pub const DRIVER_VERSION: &str = "0.0.1";

/// Size given to volumes requested without a capacity: 1 GiB.
pub const DEFAULT_VOLUME_BYTES: u64 = 1 << 30;

const SUPPORTED_FS_TYPES: &[&str] = &["ext4", "xfs"];

/// CSI plugin serving the Identity and Controller facets over a Unix socket.
pub struct Driver {
    config: DriverConfig,
    backend: Arc<dyn StorageBackend>,
    readiness: Readiness,
    started: AtomicBool,
    shutdown: Notify,
    fatal_hook: Option<FatalHook>,
}

impl Driver {
    /// Facets this driver serves.  RSD volumes are attached by the resource
    /// manager, so the Node facet is never served.
    pub const FACETS: FacetSet = FacetSet::CONTROL_PLANE;

    pub fn new(config: DriverConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            config,
            backend,
            readiness: Readiness::new(),
            started: AtomicBool::new(false),
            shutdown: Notify::new(),
            fatal_hook: None,
        }
    }

    /// Replace the process exit taken when a call fails under
    /// [`HandlerErrorPolicy::Terminate`](crate::interceptor::HandlerErrorPolicy::Terminate).
    /// If the hook returns, the error is forwarded to the caller.
    pub fn with_fatal_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &CsiError) + Send + Sync + 'static,
    {
        self.fatal_hook = Some(Arc::new(hook));
        self
    }

    /// The interceptor every call of this driver passes through.
    pub fn interceptor(&self) -> ErrorInterceptor {
        let interceptor = ErrorInterceptor::new(self.config.on_handler_error);
        match &self.fatal_hook {
            Some(hook) => interceptor.with_shared_fatal_hook(Arc::clone(hook)),
            None => interceptor,
        }
    }

    /// The configured endpoint address.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn facets(&self) -> FacetSet {
        Self::FACETS
    }

    /// Whether bootstrap has completed.
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    /// Ask a running [`Driver::run`] to stop accepting connections and
    /// return.  Calls in flight finish on their own tasks.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Start the plugin on the configured endpoint and serve until
    /// [`Driver::stop`] is called or the listener fails.
    ///
    /// A driver runs at most once; a second call fails with
    /// [`DriverError::Configuration`].
    pub async fn run(self: &Arc<Self>) -> Result<(), DriverError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DriverError::config("driver has already been started"));
        }

        let endpoint = Endpoint::parse(&self.config.endpoint)?;
        let listener = socket::acquire_listener(&endpoint.path)?;

        let mut builder = CsiServer::builder(self.interceptor());
        for facet in self.facets().iter() {
            builder = match facet {
                Facet::Identity => builder.add_identity(Arc::clone(self) as Arc<dyn CsiIdentity>)?,
                Facet::Controller => {
                    builder.add_controller(Arc::clone(self) as Arc<dyn CsiController>)?
                }
                Facet::Node => {
                    return Err(DriverError::config(
                        "the node service is not implemented by this driver",
                    ));
                }
            };
        }
        let server = builder.build();

        self.readiness.mark_ready();
        info!(endpoint = %self.config.endpoint, policy = ?self.config.on_handler_error, "server started serving");

        server
            .serve_with_shutdown(listener, self.shutdown.notified())
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))
    }
}

fn check_capabilities(capabilities: &[VolumeCapability]) -> Result<(), CsiError> {
    if capabilities.is_empty() {
        return Err(CsiError::InvalidArgument(
            "volume capabilities are required".into(),
        ));
    }
    match capabilities.iter().find(|c| !is_supported(c)) {
        Some(cap) => Err(CsiError::InvalidArgument(format!(
            "unsupported capability: {:?} with fs type {:?}",
            cap.access_mode, cap.fs_type
        ))),
        None => Ok(()),
    }
}

fn is_supported(cap: &VolumeCapability) -> bool {
    cap.access_mode == AccessMode::ReadWriteOnce && SUPPORTED_FS_TYPES.contains(&cap.fs_type.as_str())
}

// ---------------------------------------------------------------------------
// CsiIdentity
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiIdentity for Driver {
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        Ok(PluginInfo {
            name: DRIVER_NAME.to_owned(),
            vendor_version: DRIVER_VERSION.to_owned(),
        })
    }

    async fn probe(&self) -> Result<bool, CsiError> {
        Ok(self.is_ready())
    }

    async fn get_plugin_capabilities(&self) -> Result<Vec<PluginCapability>, CsiError> {
        Ok(vec![PluginCapability::ControllerService])
    }
}

// ---------------------------------------------------------------------------
// CsiController
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiController for Driver {
    #[instrument(skip(self, req), fields(name = %req.name))]
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError> {
        if req.name.is_empty() {
            return Err(CsiError::InvalidArgument("volume name is required".into()));
        }
        check_capabilities(&req.volume_capabilities)?;

        let capacity = match req.capacity_bytes {
            0 => DEFAULT_VOLUME_BYTES,
            n => n,
        };
        self.backend
            .allocate(&req.name, capacity, req.parameters)
            .await
    }

    #[instrument(skip(self))]
    async fn delete_volume(&self, volume_id: &VolumeId) -> Result<(), CsiError> {
        if volume_id.0.is_empty() {
            return Err(CsiError::InvalidArgument("volume id is required".into()));
        }
        if !self.backend.release(volume_id).await? {
            debug!(%volume_id, "volume already gone");
        }
        Ok(())
    }

    async fn validate_volume_capabilities(
        &self,
        volume_id: &VolumeId,
        capabilities: &[VolumeCapability],
    ) -> Result<bool, CsiError> {
        if volume_id.0.is_empty() {
            return Err(CsiError::InvalidArgument("volume id is required".into()));
        }
        if capabilities.is_empty() {
            return Err(CsiError::InvalidArgument(
                "volume capabilities are required".into(),
            ));
        }
        if self.backend.get(volume_id).await?.is_none() {
            return Err(CsiError::VolumeNotFound(volume_id.to_string()));
        }
        Ok(capabilities.iter().all(is_supported))
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>, CsiError> {
        let mut volumes = self.backend.list().await?;
        volumes.sort_by(|a, b| a.volume_id.cmp(&b.volume_id));
        Ok(volumes)
    }

    async fn get_capacity(&self) -> Result<u64, CsiError> {
        self.backend.available_capacity().await
    }

    async fn get_capabilities(&self) -> Result<Vec<ControllerCapability>, CsiError> {
        Ok(vec![
            ControllerCapability::CreateDeleteVolume,
            ControllerCapability::ListVolumes,
            ControllerCapability::GetCapacity,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::interceptor::HandlerErrorPolicy;

    const GIB: u64 = 1 << 30;

    fn make_driver(endpoint: &str) -> Arc<Driver> {
        Arc::new(Driver::new(
            DriverConfig::new(endpoint),
            Arc::new(MemoryBackend::new(8 * GIB)),
        ))
    }

    fn volume_request(name: &str, capacity_bytes: u64) -> CreateVolumeRequest {
        CreateVolumeRequest {
            name: name.into(),
            capacity_bytes,
            volume_capabilities: vec![VolumeCapability::default()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn identity_reports_name_version_and_capabilities() {
        let drv = make_driver("unix:///unused.sock");
        let info = drv.get_plugin_info().await.unwrap();
        assert_eq!(info.name, "csi.rsd.intel.com");
        assert_eq!(info.vendor_version, "0.0.1");
        assert_eq!(
            drv.get_plugin_capabilities().await.unwrap(),
            vec![PluginCapability::ControllerService]
        );
    }

    #[tokio::test]
    async fn probe_is_false_before_run() {
        let drv = make_driver("unix:///unused.sock");
        assert!(!drv.is_ready());
        assert!(!drv.probe().await.unwrap());
    }

    #[test]
    fn node_facet_is_inactive() {
        let drv = make_driver("unix:///unused.sock");
        assert!(!drv.facets().contains(Facet::Node));
        assert!(drv.facets().contains(Facet::Identity));
        assert!(drv.facets().contains(Facet::Controller));
    }

    #[tokio::test]
    async fn unsupported_scheme_fails_without_readiness() {
        let drv = make_driver("tcp://localhost:1234");
        let err = drv.run().await.unwrap_err();
        assert!(
            matches!(&err, DriverError::Configuration(msg) if msg.contains("tcp")),
            "{err}"
        );
        assert!(!drv.is_ready());
    }

    #[test]
    fn interceptor_follows_configured_policy() {
        let drv = make_driver("unix:///unused.sock");
        assert_eq!(drv.interceptor().policy(), HandlerErrorPolicy::Forward);

        let drv = Driver::new(
            DriverConfig::new("unix:///unused.sock")
                .with_handler_error_policy(HandlerErrorPolicy::Terminate),
            Arc::new(MemoryBackend::new(GIB)),
        );
        assert_eq!(drv.interceptor().policy(), HandlerErrorPolicy::Terminate);
    }

    #[tokio::test]
    async fn create_list_delete() {
        let drv = make_driver("unix:///unused.sock");
        assert!(drv.list_volumes().await.unwrap().is_empty());

        let vol = drv.create_volume(volume_request("pvc-1", 2 * GIB)).await.unwrap();
        assert_eq!(vol.capacity_bytes, 2 * GIB);
        assert_eq!(drv.get_capacity().await.unwrap(), 6 * GIB);
        assert_eq!(drv.list_volumes().await.unwrap(), vec![vol.clone()]);

        drv.delete_volume(&vol.volume_id).await.unwrap();
        drv.delete_volume(&vol.volume_id).await.unwrap();
        assert!(drv.list_volumes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_capacity_gets_the_default_size() {
        let drv = make_driver("unix:///unused.sock");
        let vol = drv.create_volume(volume_request("pvc-0", 0)).await.unwrap();
        assert_eq!(vol.capacity_bytes, DEFAULT_VOLUME_BYTES);
    }

    #[tokio::test]
    async fn create_rejects_bad_requests() {
        let drv = make_driver("unix:///unused.sock");

        let err = drv.create_volume(volume_request("", GIB)).await.unwrap_err();
        assert!(matches!(err, CsiError::InvalidArgument(_)));

        let mut req = volume_request("pvc-2", GIB);
        req.volume_capabilities.clear();
        let err = drv.create_volume(req).await.unwrap_err();
        assert!(matches!(err, CsiError::InvalidArgument(_)));

        let mut req = volume_request("pvc-3", GIB);
        req.volume_capabilities[0].access_mode = AccessMode::ReadWriteMany;
        let err = drv.create_volume(req).await.unwrap_err();
        assert!(matches!(err, CsiError::InvalidArgument(_)));
        assert!(drv.list_volumes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validate_capabilities() {
        let drv = make_driver("unix:///unused.sock");
        let vol = drv.create_volume(volume_request("pvc-4", GIB)).await.unwrap();

        let ok = drv
            .validate_volume_capabilities(&vol.volume_id, &[VolumeCapability::default()])
            .await
            .unwrap();
        assert!(ok);

        let shared = VolumeCapability {
            access_mode: AccessMode::ReadOnlyMany,
            ..Default::default()
        };
        let ok = drv
            .validate_volume_capabilities(&vol.volume_id, &[shared])
            .await
            .unwrap();
        assert!(!ok);

        let err = drv
            .validate_volume_capabilities(&"missing".into(), &[VolumeCapability::default()])
            .await
            .unwrap_err();
        assert_eq!(err, CsiError::VolumeNotFound("missing".into()));
    }

    #[tokio::test]
    async fn controller_capabilities() {
        let drv = make_driver("unix:///unused.sock");
        let caps = drv.get_capabilities().await.unwrap();
        assert!(caps.contains(&ControllerCapability::CreateDeleteVolume));
        assert!(caps.contains(&ControllerCapability::ListVolumes));
        assert!(caps.contains(&ControllerCapability::GetCapacity));
    }
}
