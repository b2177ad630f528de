//! Request and response head parsing.
//!
//! Heads are parsed with `httparse` for routing and framing decisions,
//! but the header list keeps the names exactly as received so the bytes
//! written back out are the bytes that came in.

use std::io;

const MAX_HEADERS: usize = 100;

/// One header, name bytes as received.
#[derive(Debug, Clone)]
pub struct Header {
    pub name: String,
    pub value: Vec<u8>,
}

/// A parsed request head.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub headers: Vec<Header>,
}

impl RequestHead {
    pub fn parse(raw: &[u8]) -> io::Result<Self> {
        let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut storage);
        match req.parse(raw) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "incomplete request head",
                ));
            }
            Err(e) => {
                return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string()));
            }
        }

        let (Some(method), Some(path)) = (req.method, req.path) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request line missing method or path",
            ));
        };

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            headers: collect_headers(req.headers),
        })
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header_str("content-type")
    }

    /// Whether the client signaled protocol-upgrade intent.
    pub fn is_upgrade(&self) -> bool {
        self.header_str("connection").is_some_and(|v| {
            let v = v.to_ascii_lowercase();
            v.split(',').any(|token| token.trim() == "upgrade")
        })
    }

    /// Whether the client asked for the connection to close after this
    /// exchange.
    pub fn wants_close(&self) -> bool {
        self.header_str("connection").is_some_and(|v| {
            let v = v.to_ascii_lowercase();
            v.split(',').any(|token| token.trim() == "close")
        })
    }

    /// Serialize for transmission upstream. The request line and headers
    /// are echoed as received, except: `Connection` is forced to `close`
    /// when `force_close` is set, and a rewritten body replaces the
    /// original length headers with a recomputed `Content-Length`.
    pub fn serialize(&self, force_close: bool, content_length_override: Option<usize>) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.path.as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");

        let mut wrote_connection = false;
        for header in &self.headers {
            if force_close && header.name.eq_ignore_ascii_case("connection") {
                out.extend_from_slice(b"Connection: close\r\n");
                wrote_connection = true;
                continue;
            }
            if content_length_override.is_some()
                && (header.name.eq_ignore_ascii_case("content-length")
                    || header.name.eq_ignore_ascii_case("transfer-encoding"))
            {
                continue;
            }
            out.extend_from_slice(header.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(&header.value);
            out.extend_from_slice(b"\r\n");
        }
        if force_close && !wrote_connection {
            out.extend_from_slice(b"Connection: close\r\n");
        }
        if let Some(len) = content_length_override {
            out.extend_from_slice(format!("Content-Length: {len}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

/// A parsed response head. The raw bytes are relayed verbatim; this view
/// exists only for the status and framing decisions.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<Header>,
}

impl ResponseHead {
    pub fn parse(raw: &[u8]) -> io::Result<Self> {
        let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut resp = httparse::Response::new(&mut storage);
        match resp.parse(raw) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "incomplete response head",
                ));
            }
            Err(e) => {
                return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string()));
            }
        }

        let Some(status) = resp.code else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "status line missing code",
            ));
        };

        Ok(Self {
            status,
            headers: collect_headers(resp.headers),
        })
    }
}

fn collect_headers(parsed: &[httparse::Header<'_>]) -> Vec<Header> {
    parsed
        .iter()
        .map(|h| Header {
            name: h.name.to_string(),
            value: h.value.to_vec(),
        })
        .collect()
}

fn header_str<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .and_then(|h| std::str::from_utf8(&h.value).ok())
}

/// Strip a leading `/vMAJOR.MINOR(.PATCH)?/` API-version prefix.
///
/// Used for routing decisions only; the path sent upstream stays as
/// received.
pub fn strip_version_prefix(path: &str) -> &str {
    let Some(rest) = path.strip_prefix("/v") else {
        return path;
    };
    let Some(end) = rest.find('/') else {
        return path;
    };
    let version = &rest[..end];
    if !version.is_empty()
        && version.contains('.')
        && version.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        &rest[end..]
    } else {
        path
    }
}
