//! Command-line surface.
//!
//! Flags overlay the optional TOML config file; the merged result is
//! validated once and then immutable for the process lifetime.

use std::path::PathBuf;

use clap::Parser;

use crate::config::validation::validate_config;
use crate::config::{load_file, ConfigError, ProxyConfig};

#[derive(Debug, Parser)]
#[command(name = "podman-wsl-proxy", version, about)]
pub struct Args {
    /// Set the log level (default: info)
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Path to the upstream podman socket
    /// (default: /mnt/wsl/podman-sockets/podman-machine-default/podman-root.sock)
    #[arg(short = 'u', long)]
    pub upstream_socket: Option<PathBuf>,

    /// Path to the downstream podman socket (default: /run/podman/podman.sock)
    #[arg(short = 'd', long)]
    pub downstream_socket: Option<PathBuf>,

    /// Name of the WSL distro (default: $WSL_DISTRO_NAME)
    #[arg(short = 'n', long)]
    pub wsl_distro_name: Option<String>,

    /// Shared-root prefix override (default: /mnt/wsl/distro-roots/<distro>)
    #[arg(long)]
    pub shared_root: Option<PathBuf>,

    /// Shut down after this many seconds without connections; negative
    /// disables (default: -1)
    #[arg(short = 't', long, allow_negative_numbers = true)]
    pub idle_timeout_secs: Option<i64>,

    /// Optional TOML config file; flags override its values
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Merge the config file (if any) with the flags and validate.
    pub fn resolve(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_file(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(path) = self.upstream_socket {
            config.upstream_socket = path;
        }
        if let Some(path) = self.downstream_socket {
            config.downstream_socket = path;
        }
        if let Some(name) = self.wsl_distro_name {
            config.wsl_distro_name = Some(name);
        }
        if let Some(root) = self.shared_root {
            config.shared_root = Some(root);
        }
        if let Some(secs) = self.idle_timeout_secs {
            config.idle_timeout_secs = secs;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}
