//! Downstream listening-socket acquisition.
//!
//! Two modes:
//! - socket activation: the process manager passes an already-bound
//!   descriptor as fd 3 and announces it via `LISTEN_FDS`/`LISTEN_PID`;
//!   the descriptor is adopted as-is and never unlinked on shutdown
//! - owned path: the socket file is created under the configured path
//!   (parent directory 0755, stale file removed first) and chmod'ed 0660

use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::{env, fs, io, process};

use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};

/// First descriptor passed by socket activation.
const SD_LISTEN_FD: RawFd = 3;

const SOCKET_DIR_MODE: u32 = 0o755;
const SOCKET_MODE: u32 = 0o660;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to prepare socket directory {path}: {source}")]
    Dir { path: PathBuf, source: io::Error },

    #[error("failed to remove stale socket {path}: {source}")]
    Stale { path: PathBuf, source: io::Error },

    #[error("failed to bind {path}: {source}")]
    Bind { path: PathBuf, source: io::Error },

    #[error("failed to set permissions on {path}: {source}")]
    Permissions { path: PathBuf, source: io::Error },

    #[error("socket activation: {0}")]
    Activation(String),
}

/// The downstream listening socket plus ownership of its path, if any.
pub struct BoundSocket {
    listener: UnixListener,
    owned_path: Option<PathBuf>,
}

impl BoundSocket {
    /// Adopt a socket-activated descriptor when one was passed, otherwise
    /// bind the configured path.
    pub fn acquire(path: &Path) -> Result<Self, ListenerError> {
        if let Some(listener) = Self::from_activation()? {
            tracing::info!("adopted socket-activated listener");
            return Ok(Self {
                listener,
                owned_path: None,
            });
        }
        Self::bind_owned(path)
    }

    fn from_activation() -> Result<Option<UnixListener>, ListenerError> {
        let Ok(listen_fds) = env::var("LISTEN_FDS") else {
            return Ok(None);
        };
        let count: i32 = listen_fds.parse().map_err(|_| {
            ListenerError::Activation(format!("LISTEN_FDS is not an integer: {listen_fds}"))
        })?;
        if count < 1 {
            return Err(ListenerError::Activation(format!(
                "LISTEN_FDS={count}, expected at least 1"
            )));
        }
        if let Ok(listen_pid) = env::var("LISTEN_PID") {
            if listen_pid.parse::<u32>().ok() != Some(process::id()) {
                // The descriptors are addressed to another process.
                return Ok(None);
            }
        }

        let std_listener = unsafe { std::os::unix::net::UnixListener::from_raw_fd(SD_LISTEN_FD) };
        std_listener
            .set_nonblocking(true)
            .map_err(|e| ListenerError::Activation(format!("fd 3 is not usable: {e}")))?;
        let listener = UnixListener::from_std(std_listener)
            .map_err(|e| ListenerError::Activation(format!("fd 3 is not a listener: {e}")))?;
        Ok(Some(listener))
    }

    fn bind_owned(path: &Path) -> Result<Self, ListenerError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::DirBuilder::new()
                    .recursive(true)
                    .mode(SOCKET_DIR_MODE)
                    .create(dir)
                    .map_err(|source| ListenerError::Dir {
                        path: dir.to_path_buf(),
                        source,
                    })?;
            }
        }

        if path.exists() {
            fs::remove_file(path).map_err(|source| ListenerError::Stale {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let listener = UnixListener::bind(path).map_err(|source| ListenerError::Bind {
            path: path.to_path_buf(),
            source,
        })?;

        fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_MODE)).map_err(|source| {
            ListenerError::Permissions {
                path: path.to_path_buf(),
                source,
            }
        })?;

        tracing::info!(path = %path.display(), "listening");
        Ok(Self {
            listener,
            owned_path: Some(path.to_path_buf()),
        })
    }

    pub async fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }

    pub fn is_activated(&self) -> bool {
        self.owned_path.is_none()
    }

    /// Tear down the listener, unlinking the socket file only when this
    /// process created it.
    pub fn close(self) {
        if let Some(path) = self.owned_path {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to unlink socket");
            }
        }
    }
}
