//! Configuration schema definitions.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Path to the engine API socket to forward to.
    pub upstream_socket: PathBuf,

    /// Path the proxy listens on (ignored when a socket-activated
    /// descriptor is inherited).
    pub downstream_socket: PathBuf,

    /// WSL distro name used to derive the shared root. Falls back to the
    /// `WSL_DISTRO_NAME` environment variable when unset.
    pub wsl_distro_name: Option<String>,

    /// Explicit shared-root override. When unset, derived from the distro
    /// name as `/mnt/wsl/distro-roots/<distro>`.
    pub shared_root: Option<PathBuf>,

    /// Seconds of zero active connections before the proxy shuts itself
    /// down. Negative disables idle shutdown.
    pub idle_timeout_secs: i64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            upstream_socket: PathBuf::from(
                "/mnt/wsl/podman-sockets/podman-machine-default/podman-root.sock",
            ),
            downstream_socket: PathBuf::from("/run/podman/podman.sock"),
            wsl_distro_name: None,
            shared_root: None,
            idle_timeout_secs: -1,
        }
    }
}

impl ProxyConfig {
    /// The shared-root prefix bind-mount paths are rewritten under.
    pub fn resolved_shared_root(&self) -> Option<PathBuf> {
        if let Some(root) = &self.shared_root {
            return Some(root.clone());
        }
        let distro = self
            .wsl_distro_name
            .clone()
            .or_else(|| env::var("WSL_DISTRO_NAME").ok())?;
        Some(PathBuf::from(format!("/mnt/wsl/distro-roots/{distro}")))
    }

    /// Idle-shutdown duration, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        u64::try_from(self.idle_timeout_secs)
            .ok()
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_idle_timeout_disables() {
        let config = ProxyConfig {
            idle_timeout_secs: -1,
            ..Default::default()
        };
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn idle_timeout_in_seconds() {
        let config = ProxyConfig {
            idle_timeout_secs: 30,
            ..Default::default()
        };
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn shared_root_override_wins() {
        let config = ProxyConfig {
            wsl_distro_name: Some("Ubuntu".to_string()),
            shared_root: Some(PathBuf::from("/mnt/wsl/custom")),
            ..Default::default()
        };
        assert_eq!(
            config.resolved_shared_root(),
            Some(PathBuf::from("/mnt/wsl/custom"))
        );
    }

    #[test]
    fn shared_root_derived_from_distro_name() {
        let config = ProxyConfig {
            wsl_distro_name: Some("Ubuntu".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.resolved_shared_root(),
            Some(PathBuf::from("/mnt/wsl/distro-roots/Ubuntu"))
        );
    }
}
