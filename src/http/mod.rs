//! Minimal HTTP/1.1 layer over raw duplex streams.
//!
//! # Data Flow
//! ```text
//! Unix stream (downstream or upstream)
//!     → body.rs CarryStream (head/line/body reads, over-read bytes kept)
//!     → head.rs (httparse view, raw bytes retained for verbatim relay)
//!     → engine decides: streamed relay, buffered rewrite, or takeover
//! ```
//!
//! # Design Decisions
//! - No buffered HTTP framework: relay must be byte-identical (header
//!   casing included) and upgrade takeover needs the raw stream back
//!   mid-connection
//! - Heads are parsed for decisions only; the bytes written out are the
//!   bytes read in, except the few headers the proxy owns
//! - Over-read bytes stay visible so a takeover can flush them first

pub mod body;
pub mod head;
pub mod response;

pub use body::{BodyFraming, CarryStream};
pub use head::{RequestHead, ResponseHead};
