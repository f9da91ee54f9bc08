//! Unix-socket client used by orchestrators, sidecars and tests to issue CSI
//! requests.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, instrument};

use crate::error::CsiError;
use crate::message::CsiMessage;
use crate::types::{PluginInfo, Volume};

use super::MAX_MESSAGE_BYTES;

/// A lightweight CSI client.  Every request uses its own connection.
#[derive(Debug, Clone)]
pub struct CsiClient {
    path: PathBuf,
}

impl CsiClient {
    /// Client for the plugin listening at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Send a request and wait for the corresponding response.
    ///
    /// Writes the JSON-serialized request, shuts down the write half, then
    /// reads the full response.
    #[instrument(skip(self), fields(msg = %msg))]
    pub async fn request(&self, msg: &CsiMessage) -> Result<CsiMessage, CsiError> {
        let mut stream = UnixStream::connect(&self.path)
            .await
            .map_err(CsiError::transport)?;

        let payload = serde_json::to_vec(msg).map_err(CsiError::internal)?;
        stream
            .write_all(&payload)
            .await
            .map_err(CsiError::transport)?;
        stream.shutdown().await.map_err(CsiError::transport)?;

        let mut buf = Vec::new();
        (&mut stream)
            .take(MAX_MESSAGE_BYTES)
            .read_to_end(&mut buf)
            .await
            .map_err(CsiError::transport)?;

        let response: CsiMessage = serde_json::from_slice(&buf).map_err(CsiError::transport)?;
        debug!(%response, "CSI response received");
        Ok(response)
    }

    /// Identity `Probe`.
    pub async fn probe(&self) -> Result<bool, CsiError> {
        match self.request(&CsiMessage::Probe).await? {
            CsiMessage::ProbeResult(ready) => Ok(ready),
            other => Err(unexpected(other)),
        }
    }

    /// Identity `GetPluginInfo`.
    pub async fn plugin_info(&self) -> Result<PluginInfo, CsiError> {
        match self.request(&CsiMessage::GetPluginInfo).await? {
            CsiMessage::PluginInfoResponse(info) => Ok(info),
            other => Err(unexpected(other)),
        }
    }

    /// Controller `ListVolumes`.
    pub async fn list_volumes(&self) -> Result<Vec<Volume>, CsiError> {
        match self.request(&CsiMessage::ListVolumes).await? {
            CsiMessage::VolumeList(volumes) => Ok(volumes),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(resp: CsiMessage) -> CsiError {
    match resp {
        CsiMessage::Error(e) => e,
        other => CsiError::TransportError(format!("unexpected response: {other}")),
    }
}
