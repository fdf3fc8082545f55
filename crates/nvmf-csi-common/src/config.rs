//! Configuration types for nvmf-csi
//!
//! The driver reads a TOML file into [`DriverConfig`]. Every section and
//! field has a default so a missing or partial file still yields a usable
//! configuration; command-line flags override file values.

use crate::types::{DEFAULT_TARGET_PORT, Transport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the controller daemon
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Plugin identity and gRPC endpoint
    pub driver: PluginConfig,
    /// Allocation store
    pub store: StoreConfig,
    /// Fabric discovery
    pub discovery: DiscoveryConfig,
    /// Logging
    pub logging: LoggingConfig,
}

/// Plugin identity and serving endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// CSI plugin name reported by GetPluginInfo
    pub name: String,
    /// Identifier of the node running this controller
    pub node_id: String,
    /// `unix:///path/to/csi.sock` or `tcp://host:port`
    pub endpoint: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            name: "csi.nvmf.io".to_string(),
            node_id: String::new(),
            endpoint: "unix:///csi/csi.sock".to_string(),
        }
    }
}

/// Allocation store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the redb allocation database
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/nvmf-csi/allocations.redb"),
        }
    }
}

/// Fabric discovery configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Path or name of the `nvme` binary
    pub nvme_cli: String,
    /// Transport used when a StorageClass does not name one
    pub default_transport: Transport,
    /// Service id used when a StorageClass does not name one
    pub default_port: u16,
    /// Host NQN passed to discovery (`--hostnqn`)
    pub host_nqn: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            nvme_cli: "nvme".to_string(),
            default_transport: Transport::Tcp,
            default_port: DEFAULT_TARGET_PORT,
            host_nqn: None,
        }
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: DriverConfig = toml::from_str("").unwrap();
        assert_eq!(config.driver.name, "csi.nvmf.io");
        assert_eq!(config.discovery.default_port, 4420);
        assert_eq!(config.discovery.default_transport, Transport::Tcp);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_partial_sections() {
        let config: DriverConfig = toml::from_str(
            r#"
            [driver]
            node_id = "controller-0"

            [discovery]
            default_transport = "rdma"
            host_nqn = "nqn.2014-08.org.nvmexpress:uuid:host-0"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.driver.node_id, "controller-0");
        assert_eq!(config.driver.endpoint, "unix:///csi/csi.sock");
        assert_eq!(config.discovery.default_transport, Transport::Rdma);
        assert_eq!(config.discovery.nvme_cli, "nvme");
        assert!(config.discovery.host_nqn.is_some());
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }
}
