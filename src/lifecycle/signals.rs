//! OS signal handling.
//!
//! SIGINT and SIGTERM both trigger the same graceful-shutdown sequence
//! as the idle timer.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};

use crate::lifecycle::shutdown::Shutdown;

pub async fn run(shutdown: Arc<Shutdown>) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received"),
        _ = terminate.recv() => tracing::info!("terminate received"),
    }
    shutdown.trigger();
}
