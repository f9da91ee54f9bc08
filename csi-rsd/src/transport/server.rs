//! Unix-socket server that dispatches incoming CSI requests to the
//! registered role facets.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, instrument, warn};

use crate::controller::CsiController;
use crate::error::{CsiError, DriverError};
use crate::identity::CsiIdentity;
use crate::interceptor::ErrorInterceptor;
use crate::message::CsiMessage;
use crate::node::CsiNode;
use crate::registry::{Facet, FacetSet, ServiceRegistry};

use super::MAX_MESSAGE_BYTES;

/// Collects facet registrations before the server starts serving.
#[derive(Debug)]
pub struct ServerBuilder {
    registry: ServiceRegistry,
    interceptor: ErrorInterceptor,
}

impl ServerBuilder {
    pub fn add_identity(mut self, svc: Arc<dyn CsiIdentity>) -> Result<Self, DriverError> {
        self.registry.register_identity(svc)?;
        Ok(self)
    }

    pub fn add_controller(mut self, svc: Arc<dyn CsiController>) -> Result<Self, DriverError> {
        self.registry.register_controller(svc)?;
        Ok(self)
    }

    pub fn add_node(mut self, svc: Arc<dyn CsiNode>) -> Result<Self, DriverError> {
        self.registry.register_node(svc)?;
        Ok(self)
    }

    pub fn build(self) -> CsiServer {
        CsiServer {
            registry: Arc::new(self.registry),
            interceptor: self.interceptor,
        }
    }
}

/// A CSI server: a fixed set of facet implementations behind an
/// [`ErrorInterceptor`].
#[derive(Debug)]
pub struct CsiServer {
    registry: Arc<ServiceRegistry>,
    interceptor: ErrorInterceptor,
}

impl CsiServer {
    /// Start building a server whose calls all pass through `interceptor`.
    pub fn builder(interceptor: ErrorInterceptor) -> ServerBuilder {
        ServerBuilder {
            registry: ServiceRegistry::new(),
            interceptor,
        }
    }

    /// Facets this server answers.
    pub fn facets(&self) -> FacetSet {
        self.registry.facets()
    }

    /// Accept connections until `shutdown` resolves or the listener fails.
    ///
    /// Each connection is handled on its own Tokio task.
    pub async fn serve_with_shutdown<F>(
        &self,
        listener: UnixListener,
        shutdown: F,
    ) -> Result<(), CsiError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("CSI server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) if is_transient(&e) => {
                            warn!(error = %e, "CSI accept failed, continuing");
                            continue;
                        }
                        Err(e) => return Err(CsiError::transport(e)),
                    };
                    let registry = Arc::clone(&self.registry);
                    let interceptor = self.interceptor.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, &registry, &interceptor).await {
                            warn!(error = %e, "CSI connection error");
                        }
                    });
                }
            }
        }
    }

    /// Process a single connection: read request → dispatch → write response.
    #[instrument(skip_all)]
    async fn handle_connection(
        mut stream: UnixStream,
        registry: &ServiceRegistry,
        interceptor: &ErrorInterceptor,
    ) -> Result<(), CsiError> {
        let mut buf = Vec::new();
        (&mut stream)
            .take(MAX_MESSAGE_BYTES + 1)
            .read_to_end(&mut buf)
            .await
            .map_err(CsiError::transport)?;

        let response = if buf.len() as u64 > MAX_MESSAGE_BYTES {
            CsiMessage::Error(CsiError::InvalidArgument(format!(
                "request exceeds {MAX_MESSAGE_BYTES} bytes"
            )))
        } else {
            match serde_json::from_slice::<CsiMessage>(&buf) {
                Ok(request) => {
                    debug!(%request, "CSI request received");
                    Self::dispatch(registry, interceptor, request).await
                }
                Err(e) => CsiMessage::Error(CsiError::InvalidArgument(format!(
                    "malformed request: {e}"
                ))),
            }
        };

        let payload = serde_json::to_vec(&response).map_err(CsiError::internal)?;
        stream
            .write_all(&payload)
            .await
            .map_err(CsiError::transport)?;
        stream.shutdown().await.map_err(CsiError::transport)?;
        Ok(())
    }

    /// Route a request to its facet through the interceptor and wrap the
    /// outcome in a response [`CsiMessage`].
    pub(crate) async fn dispatch(
        registry: &ServiceRegistry,
        interceptor: &ErrorInterceptor,
        request: CsiMessage,
    ) -> CsiMessage {
        let (Some(facet), Some(method)) = (request.facet(), request.method()) else {
            warn!(msg = %request, "unexpected message variant received as request");
            return CsiMessage::Error(CsiError::InvalidArgument(format!(
                "unexpected message: {request}"
            )));
        };
        if !registry.facets().contains(facet) {
            debug!(%method, "call to unregistered service");
            return CsiMessage::Error(unimplemented(facet));
        }

        interceptor
            .intercept(&method, Self::call(registry, request))
            .await
            .unwrap_or_else(CsiMessage::Error)
    }

    async fn call(registry: &ServiceRegistry, request: CsiMessage) -> Result<CsiMessage, CsiError> {
        match request {
            // --- Identity ---------------------------------------------------
            CsiMessage::Probe => identity(registry)?
                .probe()
                .await
                .map(CsiMessage::ProbeResult),
            CsiMessage::GetPluginInfo => identity(registry)?
                .get_plugin_info()
                .await
                .map(CsiMessage::PluginInfoResponse),
            CsiMessage::GetPluginCapabilities => identity(registry)?
                .get_plugin_capabilities()
                .await
                .map(CsiMessage::PluginCapabilitiesResponse),

            // --- Controller -------------------------------------------------
            CsiMessage::CreateVolume(req) => controller(registry)?
                .create_volume(req)
                .await
                .map(CsiMessage::VolumeCreated),
            CsiMessage::DeleteVolume(id) => controller(registry)?
                .delete_volume(&id)
                .await
                .map(|()| CsiMessage::Ok),
            CsiMessage::ListVolumes => controller(registry)?
                .list_volumes()
                .await
                .map(CsiMessage::VolumeList),
            CsiMessage::GetCapacity => controller(registry)?
                .get_capacity()
                .await
                .map(CsiMessage::Capacity),
            CsiMessage::ValidateVolumeCapabilities {
                volume_id,
                capabilities,
            } => controller(registry)?
                .validate_volume_capabilities(&volume_id, &capabilities)
                .await
                .map(CsiMessage::CapabilitiesValid),
            CsiMessage::ControllerGetCapabilities => controller(registry)?
                .get_capabilities()
                .await
                .map(CsiMessage::ControllerCapabilitiesResponse),

            // --- Node -------------------------------------------------------
            CsiMessage::StageVolume(req) => node(registry)?
                .stage_volume(req)
                .await
                .map(|()| CsiMessage::Ok),
            CsiMessage::UnstageVolume {
                volume_id,
                staging_target_path,
            } => node(registry)?
                .unstage_volume(&volume_id, &staging_target_path)
                .await
                .map(|()| CsiMessage::Ok),
            CsiMessage::PublishVolume(req) => node(registry)?
                .publish_volume(req)
                .await
                .map(|()| CsiMessage::Ok),
            CsiMessage::UnpublishVolume {
                volume_id,
                target_path,
            } => node(registry)?
                .unpublish_volume(&volume_id, &target_path)
                .await
                .map(|()| CsiMessage::Ok),
            CsiMessage::GetNodeInfo => node(registry)?
                .get_info()
                .await
                .map(CsiMessage::NodeInfoResponse),

            other => Err(CsiError::InvalidArgument(format!(
                "unexpected message: {other}"
            ))),
        }
    }
}

fn unimplemented(facet: Facet) -> CsiError {
    CsiError::Unimplemented(format!("unknown service {facet}"))
}

fn identity(registry: &ServiceRegistry) -> Result<&Arc<dyn CsiIdentity>, CsiError> {
    registry
        .identity()
        .ok_or_else(|| unimplemented(Facet::Identity))
}

fn controller(registry: &ServiceRegistry) -> Result<&Arc<dyn CsiController>, CsiError> {
    registry
        .controller()
        .ok_or_else(|| unimplemented(Facet::Controller))
}

fn node(registry: &ServiceRegistry) -> Result<&Arc<dyn CsiNode>, CsiError> {
    registry.node().ok_or_else(|| unimplemented(Facet::Node))
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}
