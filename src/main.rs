//! podman-wsl-proxy
//!
//! Transparent reverse proxy between local container-tooling clients and
//! a podman engine socket in another WSL mount namespace.
//!
//! ```text
//!                       ┌──────────────────────────────────────────────┐
//!                       │                podman-wsl-proxy               │
//!                       │                                               │
//!   podman/docker CLI   │  ┌──────────┐   ┌─────────┐   ┌───────────┐  │
//!   ────────────────────┼─▶│   net    │──▶│  proxy  │──▶│  rewrite  │  │   engine
//!    (downstream Unix   │  │ listener │   │ engine  │   │ translate │  │    socket
//!        socket)        │  └──────────┘   └────┬────┘   └───────────┘  │  (upstream)
//!                       │                      │ 101: raw forwarder    │
//!                       │  ┌───────────────────▼───────────────────┐   │
//!                       │  │   lifecycle: tracker / idle / signals │   │
//!                       │  └───────────────────────────────────────┘   │
//!                       └──────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use podman_wsl_proxy::cli::Args;
use podman_wsl_proxy::lifecycle::{idle, signals, ActivityTracker, Shutdown};
use podman_wsl_proxy::net::BoundSocket;
use podman_wsl_proxy::translate::{Translator, Wslpath};
use podman_wsl_proxy::ProxyServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = args.resolve()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "podman_wsl_proxy={}",
                    config.log_level
                ))
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        upstream = %config.upstream_socket.display(),
        downstream = %config.downstream_socket.display(),
        idle_timeout_secs = config.idle_timeout_secs,
        "configuration loaded"
    );

    let shared_root = config
        .resolved_shared_root()
        .ok_or("no shared root configured")?;
    tracing::info!(shared_root = %shared_root.display(), "translating bind mounts");

    let translator = Arc::new(Translator::new(shared_root, Box::new(Wslpath)));
    let config = Arc::new(config);
    let shutdown = Arc::new(Shutdown::new());
    let tracker = ActivityTracker::new();

    let server = ProxyServer::new(
        Arc::clone(&config),
        translator,
        tracker.clone(),
        Arc::clone(&shutdown),
    );

    server.preflight().await?;
    let socket = BoundSocket::acquire(&config.downstream_socket)?;

    tokio::spawn(signals::run(Arc::clone(&shutdown)));
    if let Some(timeout) = config.idle_timeout() {
        tokio::spawn(idle::run_idle_timer(tracker, timeout, Arc::clone(&shutdown)));
    }

    server.run(socket).await?;
    tracing::info!("shutdown complete");
    Ok(())
}
