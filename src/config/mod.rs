//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! CLI flags (+ optional TOML file)
//!     → loader.rs (parse & deserialize)
//!     → cli.rs overlay (flags win over file values)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - All fields have defaults so a bare invocation works on a stock setup
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_file, ConfigError};
pub use schema::ProxyConfig;
