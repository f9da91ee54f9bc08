//! Error types for the RSD CSI plugin.
//!
//! Two enums cover the two places a failure can surface:
//!
//! * [`DriverError`] is returned by [`Driver::run`](crate::driver::Driver::run)
//!   while bootstrapping, before a single request is served.
//! * [`CsiError`] is returned by the Identity / Controller handlers.  It is
//!   [`Serialize`]/[`Deserialize`] so it can travel back to the caller inside a
//!   [`CsiMessage::Error`](crate::message::CsiMessage::Error).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a role-facet handler.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum CsiError {
    /// A volume with the same name but incompatible parameters exists.
    #[error("volume {0} already exists")]
    VolumeAlreadyExists(String),

    /// The requested volume was not found.
    #[error("volume {0} not found")]
    VolumeNotFound(String),

    /// The backend has no room left for the requested allocation.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The method belongs to a service this plugin does not serve.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// The storage backend (RSD resource manager) returned an error.
    #[error("backend error: {0}")]
    BackendError(String),

    /// A socket / framing level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CsiError {
    /// Create a [`CsiError::BackendError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn backend<E: std::fmt::Display>(e: E) -> Self {
        Self::BackendError(e.to_string())
    }

    /// Create a [`CsiError::TransportError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::TransportError(e.to_string())
    }

    /// Create a [`CsiError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Failure while bringing the driver up or while running its accept loop.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Bad endpoint string, unsupported transport, or a misuse of the
    /// driver itself (duplicate registration, second `run`).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The socket path could not be cleared or bound.
    #[error("resource error at {}: {reason}", .path.display())]
    Resource {
        /// Filesystem path of the socket.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },

    /// The listener failed after serving started.
    #[error("transport error: {0}")]
    Transport(String),
}

impl DriverError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn resource<E: std::fmt::Display>(path: impl Into<PathBuf>, e: E) -> Self {
        Self::Resource {
            path: path.into(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CsiError::VolumeNotFound("vol-123".into());
        assert_eq!(err.to_string(), "volume vol-123 not found");
    }

    #[test]
    fn csi_error_survives_the_wire() {
        let err = CsiError::ResourceExhausted("need 10 bytes, 4 free".into());
        let json = serde_json::to_string(&err).expect("serialize");
        let de: CsiError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err, de);
    }

    #[test]
    fn resource_error_names_the_path() {
        let err = DriverError::resource("/run/csi/csi.sock", "permission denied");
        assert_eq!(
            err.to_string(),
            "resource error at /run/csi/csi.sock: permission denied"
        );
    }
}
