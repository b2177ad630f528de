//! The proxy engine.
//!
//! # Data Flow
//! ```text
//! Downstream Unix connection
//!     → engine.rs (per-request loop: parse head, intercept, dial, relay)
//!         → rewrite (container-creation bodies only)
//!         → plain relay (streamed, flush per chunk)
//!         → forward.rs (raw byte relay after a protocol upgrade)
//! ```

pub mod engine;
pub mod forward;

pub use engine::ProxyServer;
