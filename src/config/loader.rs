//! Configuration loading from disk.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::ValidationError;

/// Error type for configuration loading and resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Deserialize a TOML config file. Validation runs later, after CLI flags
/// have been overlaid.
pub fn load_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_partial_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "upstream_socket = \"/tmp/engine.sock\"").unwrap();
        writeln!(file, "idle_timeout_secs = 5").unwrap();

        let config = load_file(file.path()).unwrap();
        assert_eq!(
            config.upstream_socket,
            std::path::PathBuf::from("/tmp/engine.sock")
        );
        assert_eq!(config.idle_timeout_secs, 5);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "upstream_socket = [not toml").unwrap();
        assert!(matches!(
            load_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
