//! `quarry serve` command implementation.
//!
//! Loads the configuration, builds the registry and serves it over HTTP or
//! stdio. On Unix, `SIGHUP` reloads the configuration file: a new registry
//! is built and swapped in only if the whole file validates.

use anyhow::{Context, Result};
use clap::Args;
use quarry_core::QuarryConfig;
use quarry_mcp::{HttpServer, McpServer, Registry, RegistryHandle};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Arguments for `quarry serve`.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Configuration file path.
    #[arg(short, long, env = "QUARRY_CONFIG", default_value = "tools.yaml")]
    pub config: PathBuf,

    /// Address to bind the HTTP server to.
    #[arg(short, long, default_value = "127.0.0.1")]
    pub address: IpAddr,

    /// Port to bind the HTTP server to.
    #[arg(short, long, default_value_t = 5000)]
    pub port: u16,

    /// Serve MCP over stdin/stdout instead of HTTP.
    #[arg(long)]
    pub stdio: bool,
}

/// Build a registry from a configuration file.
pub fn load_registry(path: &Path) -> Result<Registry> {
    let config = QuarryConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;
    Registry::load(&config).with_context(|| format!("Invalid configuration in {:?}", path))
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let registry = load_registry(&args.config)?;
    tracing::info!(config = ?args.config, tools = registry.len(), "Configuration loaded");

    let handle = RegistryHandle::new(registry);
    spawn_reload_on_hangup(handle.clone(), args.config.clone());

    let server = McpServer::new(handle);
    if args.stdio {
        server.run_stdio().await?;
    } else {
        let addr = SocketAddr::new(args.address, args.port);
        HttpServer::new(addr, server).run(shutdown_signal()).await?;
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Rebuild the registry from `path` and swap it in.
///
/// On failure the current registry stays in place.
pub async fn reload(handle: &RegistryHandle, path: &Path) -> Result<usize> {
    let registry = load_registry(path)?;
    let tools = registry.len();
    handle.swap(registry).await;
    Ok(tools)
}

#[cfg(unix)]
fn spawn_reload_on_hangup(handle: RegistryHandle, path: PathBuf) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangups = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGHUP; reload disabled");
                return;
            }
        };
        while hangups.recv().await.is_some() {
            tracing::info!(config = ?path, "SIGHUP received, reloading configuration");
            match reload(&handle, &path).await {
                Ok(tools) => tracing::info!(tools, "Configuration reloaded"),
                Err(e) => tracing::error!(
                    error = %format!("{:#}", e),
                    "Reload failed, keeping the current configuration"
                ),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_handle: RegistryHandle, _path: PathBuf) {}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
