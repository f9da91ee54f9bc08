//! Driver configuration and the command line of the `csi-rsd` binary.
//!
//! Every flag can also be supplied through the environment:
//! - `CSI_ENDPOINT`: listening address, `unix://` only.
//! - `CSI_ON_HANDLER_ERROR`: `forward` (default) or `terminate`.
//! - `CSI_RSD_CAPACITY_BYTES`: size of the built-in storage pool.
//! - `CSI_LOG_FORMAT`: `text` (default) or `json`.

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::interceptor::HandlerErrorPolicy;

/// Where the kubelet expects to find the plugin socket.
pub const DEFAULT_ENDPOINT: &str = "unix:///var/lib/kubelet/plugins/csi.rsd.intel.com/csi.sock";

/// Default size of the built-in storage pool: 1 TiB.
pub const DEFAULT_CAPACITY_BYTES: u64 = 1 << 40;

/// Settings the [`Driver`](crate::driver::Driver) is constructed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Listening address, e.g. `unix:///tmp/csi.sock`.
    pub endpoint: String,
    /// Reaction to a failing handler.
    #[serde(default)]
    pub on_handler_error: HandlerErrorPolicy,
}

impl DriverConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            on_handler_error: HandlerErrorPolicy::default(),
        }
    }

    pub fn with_handler_error_policy(mut self, policy: HandlerErrorPolicy) -> Self {
        self.on_handler_error = policy;
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// CSI plugin for Intel Rack Scale Design storage.
#[derive(Debug, Parser)]
#[command(name = "csi-rsd", version)]
pub struct Cli {
    /// CSI endpoint.
    #[arg(long, env = "CSI_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// What to do when a CSI call fails.
    #[arg(long, env = "CSI_ON_HANDLER_ERROR", value_enum, default_value_t = HandlerErrorPolicy::Forward)]
    pub on_handler_error: HandlerErrorPolicy,

    /// Size of the storage pool in bytes.
    #[arg(long, env = "CSI_RSD_CAPACITY_BYTES", default_value_t = DEFAULT_CAPACITY_BYTES)]
    pub capacity_bytes: u64,

    /// Log output format.
    #[arg(long, env = "CSI_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig::new(&self.endpoint).with_handler_error_policy(self.on_handler_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["csi-rsd"]).unwrap();
        assert_eq!(cli.driver_config(), DriverConfig::default());
        assert_eq!(cli.capacity_bytes, DEFAULT_CAPACITY_BYTES);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "csi-rsd",
            "--endpoint",
            "unix:///tmp/rsd.sock",
            "--on-handler-error",
            "terminate",
            "--log-format",
            "json",
        ])
        .unwrap();
        let config = cli.driver_config();
        assert_eq!(config.endpoint, "unix:///tmp/rsd.sock");
        assert_eq!(config.on_handler_error, HandlerErrorPolicy::Terminate);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(Cli::try_parse_from(["csi-rsd", "--on-handler-error", "ignore"]).is_err());
    }
}
