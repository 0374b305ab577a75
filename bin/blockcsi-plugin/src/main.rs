//! blockcsi plugin - CSI controller for cloud block storage
//!
//! Serves the CSI Identity and Controller services on a unix socket (or a
//! TCP address for development) and drives volumes on the block storage API.

use anyhow::{Context, Result};
use blockcsi_cloud::{CloudClient, HttpClient, MemoryBackend};
use blockcsi_common::{BackendKind, Config, Endpoint, LogFormat, LoggingConfig};
use blockcsi_driver::{ControllerService, IdentityService, VolumeController};
use blockcsi_proto::csi::controller_server::ControllerServer;
use blockcsi_proto::csi::identity_server::IdentityServer;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "blockcsi-plugin")]
#[command(about = "CSI controller plugin for cloud block storage")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/blockcsi/plugin.toml")]
    config: String,

    /// CSI endpoint (unix:///path/to/csi.sock or tcp://host:port)
    #[arg(long)]
    endpoint: Option<String>,

    /// Zone volumes are provisioned in
    #[arg(long)]
    zone: Option<String>,

    /// Block storage API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Block storage API token
    #[arg(long, env = "BLOCKCSI_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Use the in-memory backend instead of the REST API
    #[arg(long)]
    memory_backend: bool,

    /// Server registered in the in-memory backend (repeatable)
    #[arg(long = "memory-server")]
    memory_servers: Vec<String>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Merge CLI args into the file configuration (CLI takes precedence)
    fn apply(&self, config: &mut Config) {
        if let Some(endpoint) = &self.endpoint {
            config.plugin.endpoint.clone_from(endpoint);
        }
        if let Some(zone) = &self.zone {
            config.plugin.zone.clone_from(zone);
        }
        if let Some(api_url) = &self.api_url {
            config.backend.api_url.clone_from(api_url);
        }
        if let Some(token) = &self.api_token {
            config.backend.api_token = Some(token.clone());
        }
        if self.memory_backend {
            config.backend.kind = BackendKind::Memory;
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| logging.level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn build_client(config: &Config, memory_servers: &[String]) -> Result<CloudClient> {
    match config.backend.kind {
        BackendKind::Http => {
            let token = config.backend.api_token.clone().unwrap_or_default();
            let client = HttpClient::new(
                &config.backend.api_url,
                token,
                Duration::from_secs(config.backend.timeout_secs),
            )
            .context("failed to build block storage API client")?;
            info!(api_url = %client.base_url(), "using block storage API");
            Ok(CloudClient::new(Arc::new(client)))
        }
        BackendKind::Memory => {
            warn!("using in-memory backend, volumes are lost on exit");
            let backend = MemoryBackend::new(
                &config.plugin.zone,
                config.backend.max_volumes_per_server,
            );
            for server in memory_servers {
                backend.add_server(server);
            }
            Ok(CloudClient::new(Arc::new(backend)))
        }
    }
}

/// Bind a unix socket, creating its directory and replacing a stale socket
/// left behind by a previous run.
fn bind_unix(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create socket directory {}", parent.display()))?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to remove stale socket {}", path.display()));
        }
    }
    UnixListener::bind(path).with_context(|| format!("failed to bind {}", path.display()))
}

async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {e}");
            None
        }
    };
    let sigterm = async {
        match terminate.as_mut() {
            Some(stream) => {
                stream.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
        () = sigterm => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging);

    info!("Starting blockcsi plugin {}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config);
    info!("Zone: {}", config.plugin.zone);

    let client = build_client(&config, &args.memory_servers)?;
    let controller = VolumeController::new(client, config.plugin.zone.clone());

    let router = Server::builder()
        .timeout(Duration::from_secs(config.plugin.request_timeout_secs))
        .add_service(IdentityServer::new(IdentityService::new()))
        .add_service(ControllerServer::new(ControllerService::new(controller)));

    let endpoint: Endpoint = config.plugin.endpoint.parse()?;
    match endpoint {
        Endpoint::Unix(path) => {
            let listener = bind_unix(&path)?;
            info!("Starting gRPC server on unix://{}", path.display());
            router
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown_signal())
                .await?;
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to remove socket {}: {e}", path.display());
            }
        }
        Endpoint::Tcp(addr) => {
            info!("Starting gRPC server on {}", addr);
            router.serve_with_shutdown(addr, shutdown_signal()).await?;
        }
    }

    info!("blockcsi plugin stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::try_parse_from([
            "blockcsi-plugin",
            "--zone",
            "lpg1",
            "--endpoint",
            "tcp://127.0.0.1:10000",
            "--api-token",
            "secret",
            "--log-level",
            "debug",
        ])
        .unwrap();

        let mut config = Config::from_toml("[plugin]\nzone = \"rma1\"\n").unwrap();
        args.apply(&mut config);

        assert_eq!(config.plugin.zone, "lpg1");
        assert_eq!(config.plugin.endpoint, "tcp://127.0.0.1:10000");
        assert_eq!(config.backend.api_token.as_deref(), Some("secret"));
        assert_eq!(config.backend.kind, BackendKind::Http);
        assert_eq!(config.logging.level, "debug");
        config.validate().unwrap();
    }

    #[test]
    fn test_memory_backend_flag() {
        let args = Args::try_parse_from([
            "blockcsi-plugin",
            "--memory-backend",
            "--memory-server",
            "node-1",
            "--memory-server",
            "node-2",
        ])
        .unwrap();
        assert_eq!(args.memory_servers, vec!["node-1", "node-2"]);

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert_eq!(config.plugin.endpoint, Config::default().plugin.endpoint);
    }

    #[tokio::test]
    async fn test_bind_unix_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin").join("csi.sock");

        let first = bind_unix(&path).unwrap();
        drop(first);
        assert!(path.exists());

        // A socket file from a previous run must not prevent binding
        let _second = bind_unix(&path).unwrap();
    }
}
