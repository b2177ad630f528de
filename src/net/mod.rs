//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Unix connection
//!     → listener.rs (socket acquisition: owned path or activated fd)
//!     → identity.rs (peer credentials, best-effort)
//!     → Hand off to the proxy engine
//! ```
//!
//! # Design Decisions
//! - The socket file is owned (created, permissioned, unlinked) only when
//!   the proxy bound it itself; an activated descriptor belongs to the
//!   process manager
//! - Identity enrichment never affects forwarding, only log context

pub mod identity;
pub mod listener;

pub use identity::ConnectionIdentity;
pub use listener::{BoundSocket, ListenerError};
