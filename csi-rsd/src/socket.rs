//! Listening socket acquisition.
//!
//! A plugin that was upgraded or restarted uncleanly leaves its socket file
//! behind.  [`acquire_listener`] removes whatever occupies the path and binds
//! a fresh listener in its place.

use std::io;
use std::path::Path;

use tokio::net::UnixListener;
use tracing::info;

use crate::error::DriverError;

/// Clear `path` and bind a Unix domain socket listener on it.
///
/// Must be called from within a Tokio runtime.
pub fn acquire_listener(path: &Path) -> Result<UnixListener, DriverError> {
    remove_stale(path)?;
    UnixListener::bind(path)
        .map_err(|e| DriverError::resource(path, format!("failed to listen on socket: {e}")))
}

fn remove_stale(path: &Path) -> Result<(), DriverError> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(DriverError::resource(
                path,
                format!("failed to inspect socket path: {e}"),
            ));
        }
    };

    info!(path = %path.display(), "removing stale socket");
    let removed = if metadata.is_dir() {
        std::fs::remove_dir(path)
    } else {
        std::fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DriverError::resource(
            path,
            format!("failed to remove unix domain socket file: {e}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_on_a_fresh_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("csi.sock");

        let _listener = acquire_listener(&path).unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn replaces_a_stale_socket() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("csi.sock");

        let first = acquire_listener(&path).unwrap();
        drop(first);
        assert!(path.exists(), "dropping a listener leaves its file behind");

        let _second = acquire_listener(&path).unwrap();
        tokio::net::UnixStream::connect(&path).await.unwrap();
    }

    #[tokio::test]
    async fn replaces_a_regular_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("csi.sock");
        std::fs::write(&path, b"left over").unwrap();

        let _listener = acquire_listener(&path).unwrap();
        tokio::net::UnixStream::connect(&path).await.unwrap();
    }

    #[tokio::test]
    async fn unremovable_entry_is_a_resource_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("csi.sock");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let err = acquire_listener(&path).unwrap_err();
        assert!(matches!(err, DriverError::Resource { .. }), "{err}");
        assert!(path.join("keep").exists());
    }

    #[tokio::test]
    async fn missing_parent_directory_is_a_resource_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing").join("csi.sock");

        let err = acquire_listener(&path).unwrap_err();
        assert!(matches!(err, DriverError::Resource { .. }), "{err}");
    }
}
