//! # csi-rsd — CSI plugin for Intel Rack Scale Design storage
//!
//! `csi-rsd` implements the bootstrap and service-dispatch layer of a
//! [Container Storage Interface][csi] plugin.  The plugin listens on a Unix
//! domain socket, serves the Identity and Controller facets, and delegates
//! volume work to a [`StorageBackend`](backend::StorageBackend).  It follows
//! the usual conventions: Tokio async runtime, `tracing` for observability,
//! `thiserror` for structured errors.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`driver`] | [`Driver`] composition root; implements Identity + Controller. |
//! | [`endpoint`] | Parse `unix://` addresses into socket paths. |
//! | [`socket`] | Remove stale socket files and bind the listener. |
//! | [`interceptor`] | Log failing calls; forward or terminate. |
//! | [`registry`] | Facet sets and the service registry. |
//! | [`readiness`] | Lock-guarded readiness flag behind `Probe`. |
//! | [`config`] | [`DriverConfig`] and the binary's command line. |
//! | [`types`] | Volumes, capabilities, plugin info. |
//! | [`error`] | [`CsiError`] for handlers, [`DriverError`] for bootstrap. |
//! | [`message`] | [`CsiMessage`] wire envelope. |
//! | [`identity`], [`controller`], [`node`] | Role-facet traits. |
//! | [`transport`] | Unix-socket server and client. |
//! | [`backend`] | Storage backend trait and the in-memory pool. |
//!
//! [csi]: https://github.com/container-storage-interface/spec

pub mod backend;
pub mod config;
pub mod controller;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod interceptor;
pub mod message;
pub mod node;
pub mod readiness;
pub mod registry;
pub mod socket;
pub mod transport;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use config::DriverConfig;
pub use controller::CsiController;
pub use driver::Driver;
pub use error::{CsiError, DriverError};
pub use identity::CsiIdentity;
pub use interceptor::HandlerErrorPolicy;
pub use message::CsiMessage;
pub use node::CsiNode;
pub use types::*;
