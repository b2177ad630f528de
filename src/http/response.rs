//! Proxy-generated responses.
//!
//! Everything the engine says is relayed verbatim; these are only the
//! responses the proxy itself must produce (bad bodies, unreachable
//! upstream). The payload follows the engine's own error-report shape so
//! clients parse it the same way.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::PRODUCT_TAG;
use crate::http::body::CarryStream;

/// Wire shape of an engine error report.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub cause: String,
    pub message: String,
    pub response: u16,
}

pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

/// Write a structured error response and leave the connection for the
/// caller to close.
pub async fn write_error<S>(
    stream: &mut CarryStream<S>,
    status: u16,
    message: &str,
    cause: &(dyn std::fmt::Display + Sync),
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let report = ErrorReport {
        cause: cause.to_string(),
        message: format!("{PRODUCT_TAG}: {message}"),
        response: status,
    };
    let body = serde_json::to_vec(&report).unwrap_or_default();
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        status_text(status),
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await
}
