//! nvmf-csi Driver - CSI controller daemon
//!
//! Serves the CSI Identity and Controller services, handing out pre-provisioned
//! NVMe-oF subsystems as volumes.

mod endpoint;
mod identity;
mod service;

use anyhow::{Context, Result};
use clap::Parser;
use endpoint::ListenEndpoint;
use identity::IdentityService;
use nvmf_csi_common::{DriverConfig, config::LogFormat};
use nvmf_csi_controller::ControllerServer;
use nvmf_csi_proto::csi::{
    controller_server::ControllerServer as CsiControllerServer, identity_server::IdentityServer,
};
use nvmf_csi_registry::{DeviceRegistry, NvmeCliDiscoverer, RedbAllocationStore};
use service::ControllerService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "nvmf-csi-driver")]
#[command(about = "CSI controller driver for NVMe-oF volumes")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/nvmf-csi/driver.toml")]
    config: PathBuf,

    /// CSI endpoint (unix:///path/to/csi.sock or tcp://host:port)
    #[arg(long, env = "CSI_ENDPOINT")]
    endpoint: Option<String>,

    /// Node identifier
    #[arg(long, env = "NODE_ID")]
    node_id: Option<String>,

    /// CSI plugin name
    #[arg(long)]
    drivername: Option<String>,

    /// Allocation database path
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// nvme-cli binary
    #[arg(long)]
    nvme_cli: Option<String>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (text or json)
    #[arg(long)]
    log_format: Option<String>,
}

/// Read the config file; a missing file yields defaults
fn load_config(path: &Path) -> Result<DriverConfig> {
    if !path.exists() {
        return Ok(DriverConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Merge CLI args over the config file (CLI takes precedence)
fn apply_overrides(mut config: DriverConfig, args: Args) -> Result<DriverConfig> {
    if let Some(endpoint) = args.endpoint {
        config.driver.endpoint = endpoint;
    }
    if let Some(node_id) = args.node_id {
        config.driver.node_id = node_id;
    }
    if let Some(name) = args.drivername {
        config.driver.name = name;
    }
    if let Some(path) = args.store_path {
        config.store.path = path;
    }
    if let Some(nvme_cli) = args.nvme_cli {
        config.discovery.nvme_cli = nvme_cli;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = match format.as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => anyhow::bail!("unknown log format {other}, expected text or json"),
        };
    }
    Ok(config)
}

fn init_tracing(config: &DriverConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Bind the unix socket, replacing a stale one left by a previous run
fn bind_unix(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create socket directory {}", parent.display()))?;
    }
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
    }
    UnixListener::bind(path).with_context(|| format!("failed to bind {}", path.display()))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down...");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.clone();
    let config = apply_overrides(load_config(&config_path)?, args)?;

    init_tracing(&config);

    info!("Starting nvmf-csi driver {}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", config_path.display());
    info!("Driver name: {}", config.driver.name);
    info!("Node ID: {}", config.driver.node_id);
    info!("Allocation store: {}", config.store.path.display());

    let endpoint: ListenEndpoint = config
        .driver
        .endpoint
        .parse()
        .with_context(|| format!("invalid endpoint {}", config.driver.endpoint))?;

    let store = RedbAllocationStore::open(&config.store.path).with_context(|| {
        format!("failed to open allocation store {}", config.store.path.display())
    })?;
    let discoverer = NvmeCliDiscoverer::new(config.discovery.clone());
    let registry = DeviceRegistry::new(Arc::new(store), Arc::new(discoverer));

    let core = Arc::new(ControllerServer::new(registry));
    let _initial_sync = core.spawn_initial_sync();

    let router = Server::builder()
        .add_service(IdentityServer::new(IdentityService::new(
            config.driver.name.clone(),
        )))
        .add_service(CsiControllerServer::new(ControllerService::new(core)));

    info!("Starting gRPC server on {}", endpoint);

    match endpoint {
        ListenEndpoint::Unix(path) => {
            let listener = bind_unix(&path)?;
            router
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown_signal())
                .await?;
            std::fs::remove_file(&path).ok();
        }
        ListenEndpoint::Tcp(addr) => {
            router.serve_with_shutdown(addr, shutdown_signal()).await?;
        }
    }

    info!("nvmf-csi driver shut down gracefully");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "nvmf-csi-driver",
            "--endpoint",
            "tcp://127.0.0.1:10000",
            "--node-id",
            "controller-1",
            "--log-format",
            "json",
        ]);
        let config = apply_overrides(DriverConfig::default(), args).unwrap();

        assert_eq!(config.driver.endpoint, "tcp://127.0.0.1:10000");
        assert_eq!(config.driver.node_id, "controller-1");
        assert_eq!(config.driver.name, "csi.nvmf.io");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let args = Args::parse_from(["nvmf-csi-driver", "--log-format", "xml"]);
        assert!(apply_overrides(DriverConfig::default(), args).is_err());
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/nvmf-csi/driver.toml")).unwrap();
        assert_eq!(config.driver.endpoint, "unix:///csi/csi.sock");
    }
}
