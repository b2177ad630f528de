//! Crate-level error taxonomy.
//!
//! Startup errors (listen setup, upstream pre-flight) are fatal and bubble
//! up to `main`. Per-request failures never reach this type; they are
//! converted to structured HTTP error responses for the one client that
//! caused them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::net::ListenerError;

/// Prefix stamped on every proxy-generated error message so clients can
/// tell proxy failures apart from engine failures.
pub const PRODUCT_TAG: &str = "podman-wsl-proxy";

/// Fatal errors surfaced at startup or during server teardown.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The upstream engine socket could not be dialed.
    #[error("upstream socket {path} is unreachable: {source}")]
    UpstreamUnreachable { path: PathBuf, source: io::Error },

    /// The upstream answered the pre-flight probe with a non-OK status.
    #[error("upstream health probe returned status {0}")]
    UpstreamProbeFailed(u16),

    /// The downstream listening socket could not be set up.
    #[error(transparent)]
    ListenSetup(#[from] ListenerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
