//! Host-path to engine-path translation.
//!
//! A path the client sees (its own mount namespace) must be rewritten to
//! the path the engine sees. Paths already under the WSL shared mount are
//! valid on both sides; everything else is resolved through the external
//! `wslpath` converter to decide whether it lives in this distro (and gets
//! prefixed with the shared root) or on a Windows drive (and is already
//! addressable by the engine).

use std::io;
use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;

use crate::error::PRODUCT_TAG;

/// Prefix under which WSL distro filesystems are cross-mounted.
pub const SHARED_MOUNT_PREFIX: &str = "/mnt/wsl/";

/// UNC prefix `wslpath` reports for paths local to a WSL distro.
const WSL_UNC_PREFIX: &str = "\\\\wsl.localhost\\";

#[derive(Debug, Error)]
pub enum TranslateError {
    /// Internal contract violation: bind sources must be absolute.
    #[error("{PRODUCT_TAG} bug: unexpected path format, expected an absolute path: '{0}'")]
    BadPathFormat(String),

    #[error("converting '{path}' to a Windows path: {source}")]
    Convert { path: String, source: io::Error },
}

/// External collaborator mapping a distro path to Windows addressing.
pub trait WindowsPathConverter: Send + Sync {
    fn to_windows(&self, path: &str) -> io::Result<String>;
}

impl<F> WindowsPathConverter for F
where
    F: Fn(&str) -> io::Result<String> + Send + Sync,
{
    fn to_windows(&self, path: &str) -> io::Result<String> {
        self(path)
    }
}

/// Production converter shelling out to the `wslpath` utility.
pub struct Wslpath;

impl WindowsPathConverter for Wslpath {
    fn to_windows(&self, path: &str) -> io::Result<String> {
        let output = Command::new("wslpath").arg("-aw").arg(path).output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "wslpath -aw exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

pub struct Translator {
    shared_root: PathBuf,
    converter: Box<dyn WindowsPathConverter>,
}

impl Translator {
    pub fn new(shared_root: PathBuf, converter: Box<dyn WindowsPathConverter>) -> Self {
        Self {
            shared_root,
            converter,
        }
    }

    /// Map a host path to the path the engine must see.
    ///
    /// Already-translated paths (under the shared mount) come back
    /// unchanged, so translating twice is a no-op.
    pub fn translate(&self, host_path: &str) -> Result<String, TranslateError> {
        if host_path.starts_with(SHARED_MOUNT_PREFIX) {
            return Ok(host_path.to_string());
        }

        let windows_path =
            self.converter
                .to_windows(host_path)
                .map_err(|source| TranslateError::Convert {
                    path: host_path.to_string(),
                    source,
                })?;

        if windows_path.starts_with(WSL_UNC_PREFIX) {
            // Local to this distro: re-anchor under the shared root.
            if !host_path.starts_with('/') {
                return Err(TranslateError::BadPathFormat(host_path.to_string()));
            }
            let joined = self.shared_root.join(host_path.trim_start_matches('/'));
            return Ok(joined.to_string_lossy().into_owned());
        }

        // A Windows drive path; the engine can address it directly.
        Ok(windows_path)
    }
}
