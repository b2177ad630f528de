//! Configuration validation.
//!
//! Semantic checks on a fully resolved config; serde handles the
//! syntactic ones. Returns all violations, not just the first.

use thiserror::Error;

use crate::config::schema::ProxyConfig;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("upstream socket path must not be empty")]
    EmptyUpstream,

    #[error("downstream socket path must not be empty")]
    EmptyDownstream,

    #[error("upstream and downstream sockets must be different paths")]
    SocketsIdentical,

    #[error(
        "no shared root: set shared_root, wsl_distro_name, or the WSL_DISTRO_NAME environment variable"
    )]
    NoSharedRoot,
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.upstream_socket.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyUpstream);
    }
    if config.downstream_socket.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyDownstream);
    }
    if !config.upstream_socket.as_os_str().is_empty()
        && config.upstream_socket == config.downstream_socket
    {
        errors.push(ValidationError::SocketsIdentical);
    }
    if config.resolved_shared_root().is_none() {
        errors.push(ValidationError::NoSharedRoot);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
