//! Fabric discovery
//!
//! Enumerates NVMe-oF subsystems reachable through a discovery controller.
//! The production backend shells out to `nvme discover` and parses its JSON
//! discovery log page.

use std::collections::HashMap;

use async_trait::async_trait;
use nvmf_csi_common::config::DiscoveryConfig;
use nvmf_csi_common::{
    PARAM_TARGET_ADDR, PARAM_TARGET_PORT, PARAM_TARGET_TYPE, Transport, UnknownTransport,
};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::device::DeviceDescriptor;

/// Well-known NQN of discovery controllers
pub const DISCOVERY_NQN: &str = "nqn.2014-08.org.nvmexpress.discovery";

/// Discovery error
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Required parameter absent from the StorageClass
    #[error("missing discovery parameter: {0}")]
    MissingParameter(&'static str),

    /// Parameter present but unusable
    #[error("invalid discovery parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// `nvme` could not be started
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// `nvme discover` exited unsuccessfully
    #[error("nvme discover failed ({status}): {stderr}")]
    CommandFailed { status: String, stderr: String },

    /// Discovery log page could not be parsed
    #[error("failed to parse discovery log: {0}")]
    Parse(#[from] serde_json::Error),

    /// Any other fabric failure
    #[error("fabric error: {0}")]
    Fabric(String),
}

impl From<UnknownTransport> for DiscoveryError {
    fn from(e: UnknownTransport) -> Self {
        Self::InvalidParameter {
            name: PARAM_TARGET_TYPE,
            reason: e.to_string(),
        }
    }
}

/// Enumerates reachable NVMe-oF targets
#[async_trait]
pub trait FabricDiscoverer: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Query the fabric using StorageClass `parameters`
    async fn discover(
        &self,
        parameters: &HashMap<String, String>,
    ) -> Result<Vec<DeviceDescriptor>, DiscoveryError>;
}

/// Where to send a discovery request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryParams {
    pub transport: Transport,
    pub address: String,
    pub port: u16,
}

impl DiscoveryParams {
    /// Parse StorageClass parameters, filling gaps from `defaults`
    pub fn from_parameters(
        parameters: &HashMap<String, String>,
        defaults: &DiscoveryConfig,
    ) -> Result<Self, DiscoveryError> {
        let address = parameters
            .get(PARAM_TARGET_ADDR)
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .ok_or(DiscoveryError::MissingParameter(PARAM_TARGET_ADDR))?
            .to_string();

        let transport = match parameters.get(PARAM_TARGET_TYPE) {
            Some(t) if !t.trim().is_empty() => t.parse()?,
            _ => defaults.default_transport,
        };

        let port = match parameters.get(PARAM_TARGET_PORT) {
            Some(p) if !p.trim().is_empty() => {
                p.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| DiscoveryError::InvalidParameter {
                        name: PARAM_TARGET_PORT,
                        reason: e.to_string(),
                    })?
            }
            _ => defaults.default_port,
        };

        Ok(Self {
            transport,
            address,
            port,
        })
    }
}

// ── nvme-cli discovery log page ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DiscoveryLog {
    #[serde(default)]
    records: Vec<DiscoveryLogEntry>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryLogEntry {
    #[serde(default)]
    trtype: String,
    #[serde(default)]
    adrfam: String,
    #[serde(default)]
    subtype: String,
    #[serde(default)]
    trsvcid: String,
    #[serde(default)]
    traddr: String,
    #[serde(default)]
    subnqn: String,
}

impl DiscoveryLogEntry {
    fn is_discovery_subsystem(&self) -> bool {
        self.subtype.contains("discovery") || self.subnqn == DISCOVERY_NQN
    }

    fn endpoint(&self) -> String {
        let addr = self.traddr.trim();
        if self.adrfam.eq_ignore_ascii_case("ipv6") && !addr.starts_with('[') {
            format!("[{}]:{}", addr, self.trsvcid.trim())
        } else {
            format!("{}:{}", addr, self.trsvcid.trim())
        }
    }
}

/// Parse `nvme discover -o json` output into one descriptor per subsystem.
///
/// Records sharing a subsystem NQN are merged into a single multipath
/// descriptor. Descriptor order follows first appearance in the log.
pub fn parse_discovery_log(json: &str) -> Result<Vec<DeviceDescriptor>, DiscoveryError> {
    let log: DiscoveryLog = serde_json::from_str(json)?;
    let mut descriptors: Vec<DeviceDescriptor> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in log.records {
        if entry.is_discovery_subsystem() || entry.subnqn.is_empty() {
            continue;
        }
        let transport: Transport = match entry.trtype.parse() {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping discovery record for {}: {}", entry.subnqn, e);
                continue;
            }
        };
        let endpoint = entry.endpoint();

        if let Some(&i) = index.get(&entry.subnqn) {
            let descriptor = &mut descriptors[i];
            if !descriptor.endpoints.contains(&endpoint) {
                descriptor.endpoints.push(endpoint);
            }
        } else {
            index.insert(entry.subnqn.clone(), descriptors.len());
            descriptors.push(DeviceDescriptor {
                nqn: entry.subnqn,
                transport,
                endpoints: vec![endpoint],
            });
        }
    }

    Ok(descriptors)
}

/// Discovers targets by running `nvme discover`
#[derive(Debug, Clone)]
pub struct NvmeCliDiscoverer {
    config: DiscoveryConfig,
}

impl NvmeCliDiscoverer {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    fn command(&self, params: &DiscoveryParams) -> Command {
        let mut cmd = Command::new(&self.config.nvme_cli);
        cmd.arg("discover")
            .args(["-t", params.transport.as_str()])
            .args(["-a", params.address.as_str()])
            .args(["-s", &params.port.to_string()])
            .args(["-o", "json"]);
        if let Some(host_nqn) = &self.config.host_nqn {
            cmd.args(["--hostnqn", host_nqn.as_str()]);
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl FabricDiscoverer for NvmeCliDiscoverer {
    fn name(&self) -> &str {
        "nvme-cli"
    }

    async fn discover(
        &self,
        parameters: &HashMap<String, String>,
    ) -> Result<Vec<DeviceDescriptor>, DiscoveryError> {
        let params = DiscoveryParams::from_parameters(parameters, &self.config)?;
        debug!(
            "Discovering NVMe-oF targets via {}:{} ({})",
            params.address, params.port, params.transport
        );

        let output = self
            .command(&params)
            .output()
            .await
            .map_err(|source| DiscoveryError::Spawn {
                command: self.config.nvme_cli.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DiscoveryError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let descriptors = parse_discovery_log(&String::from_utf8_lossy(&output.stdout))?;
        debug!(
            "Discovery via {}:{} returned {} subsystem(s)",
            params.address,
            params.port,
            descriptors.len()
        );
        Ok(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = r#"{
      "device": "nvme0",
      "genctr": 4,
      "records": [
        {"trtype": "tcp", "adrfam": "ipv4", "subtype": "current discovery subsystem",
         "treq": "not specified", "portid": 1, "trsvcid": "8009",
         "subnqn": "nqn.2014-08.org.nvmexpress.discovery", "traddr": "10.0.0.5"},
        {"trtype": "tcp", "adrfam": "ipv4", "subtype": "nvme subsystem",
         "treq": "not specified", "portid": 1, "trsvcid": "4420",
         "subnqn": "nqn.2024-01.io.example:disk-b", "traddr": "10.0.0.5"},
        {"trtype": "tcp", "adrfam": "ipv4", "subtype": "nvme subsystem",
         "treq": "not specified", "portid": 1, "trsvcid": "4420",
         "subnqn": "nqn.2024-01.io.example:disk-a", "traddr": "10.0.0.5"},
        {"trtype": "tcp", "adrfam": "ipv4", "subtype": "nvme subsystem",
         "treq": "not specified", "portid": 2, "trsvcid": "4420",
         "subnqn": "nqn.2024-01.io.example:disk-a", "traddr": "10.0.1.5"},
        {"trtype": "tcp", "adrfam": "ipv4", "subtype": "nvme subsystem",
         "treq": "not specified", "portid": 2, "trsvcid": "4420",
         "subnqn": "nqn.2024-01.io.example:disk-a", "traddr": "10.0.1.5"},
        {"trtype": "rdma", "adrfam": "ipv6", "subtype": "nvme subsystem",
         "treq": "not specified", "portid": 3, "trsvcid": "4420",
         "subnqn": "nqn.2024-01.io.example:disk-c", "traddr": "fd00::5"}
      ]
    }"#;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_parse_groups_multipath_and_skips_discovery() {
        let devices = parse_discovery_log(LOG).unwrap();
        assert_eq!(devices.len(), 3);

        assert_eq!(devices[0].nqn, "nqn.2024-01.io.example:disk-b");
        assert_eq!(devices[0].endpoints, vec!["10.0.0.5:4420"]);

        assert_eq!(devices[1].nqn, "nqn.2024-01.io.example:disk-a");
        assert_eq!(devices[1].transport, Transport::Tcp);
        assert_eq!(devices[1].endpoints, vec!["10.0.0.5:4420", "10.0.1.5:4420"]);

        assert_eq!(devices[2].transport, Transport::Rdma);
        assert_eq!(devices[2].endpoints, vec!["[fd00::5]:4420"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_discovery_log("not json"),
            Err(DiscoveryError::Parse(_))
        ));
        assert!(parse_discovery_log("{}").unwrap().is_empty());
    }

    #[test]
    fn test_params_defaults() {
        let defaults = DiscoveryConfig::default();
        let p = DiscoveryParams::from_parameters(&params(&[("targetTrAddr", "10.0.0.5")]), &defaults)
            .unwrap();
        assert_eq!(p.address, "10.0.0.5");
        assert_eq!(p.port, 4420);
        assert_eq!(p.transport, Transport::Tcp);
    }

    #[test]
    fn test_params_explicit_and_invalid() {
        let defaults = DiscoveryConfig::default();
        let p = DiscoveryParams::from_parameters(
            &params(&[
                ("targetTrAddr", "10.0.0.5"),
                ("targetTrPort", "8009"),
                ("targetTrType", "rdma"),
            ]),
            &defaults,
        )
        .unwrap();
        assert_eq!(p.port, 8009);
        assert_eq!(p.transport, Transport::Rdma);

        assert!(matches!(
            DiscoveryParams::from_parameters(&params(&[]), &defaults),
            Err(DiscoveryError::MissingParameter(PARAM_TARGET_ADDR))
        ));
        assert!(matches!(
            DiscoveryParams::from_parameters(
                &params(&[("targetTrAddr", "10.0.0.5"), ("targetTrPort", "http")]),
                &defaults
            ),
            Err(DiscoveryError::InvalidParameter { .. })
        ));
        assert!(matches!(
            DiscoveryParams::from_parameters(
                &params(&[("targetTrAddr", "10.0.0.5"), ("targetTrType", "ib")]),
                &defaults
            ),
            Err(DiscoveryError::InvalidParameter { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let discoverer = NvmeCliDiscoverer::new(DiscoveryConfig {
            nvme_cli: "/nonexistent/nvme".to_string(),
            ..DiscoveryConfig::default()
        });
        let err = discoverer
            .discover(&params(&[("targetTrAddr", "127.0.0.1")]))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Spawn { .. }));
    }
}
