//! Stream buffering and body framing.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::head::{Header, RequestHead, ResponseHead};

/// Upper bound on a head or framing line; anything larger is malformed.
const MAX_HEAD_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

/// A duplex stream with an explicit read-ahead buffer.
///
/// Head and line reads inevitably pull in bytes past what they consume;
/// those bytes stay in `buf` where body reads and upgrade takeover can
/// see them, instead of vanishing into an opaque reader. Writes pass
/// straight through.
pub struct CarryStream<S> {
    inner: S,
    buf: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> CarryStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Drain the read-ahead buffer, e.g. to flush it to the peer before a
    /// takeover.
    pub fn take_buffered(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Give up the stream. The caller must have drained the buffer first.
    pub fn into_inner(self) -> (S, Vec<u8>) {
        (self.inner, self.buf)
    }

    async fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.inner.read(&mut chunk).await?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Read one complete head section (through the blank line), returning
    /// its raw bytes. `Ok(None)` means the peer closed before sending
    /// anything.
    pub async fn read_head(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(end) = find_head_end(&self.buf) {
                let rest = self.buf.split_off(end);
                return Ok(Some(std::mem::replace(&mut self.buf, rest)));
            }
            if self.buf.len() > MAX_HEAD_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "header section too large",
                ));
            }
            if self.fill().await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-header",
                ));
            }
        }
    }

    /// Read exactly `n` bytes.
    pub async fn read_exact_vec(&mut self, n: usize) -> io::Result<Vec<u8>> {
        while self.buf.len() < n {
            if self.fill().await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-body",
                ));
            }
        }
        let rest = self.buf.split_off(n);
        Ok(std::mem::replace(&mut self.buf, rest))
    }

    /// Read one CRLF-terminated line, terminator included.
    pub async fn read_line(&mut self) -> io::Result<Vec<u8>> {
        loop {
            if let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") {
                let rest = self.buf.split_off(pos + 2);
                return Ok(std::mem::replace(&mut self.buf, rest));
            }
            if self.buf.len() > MAX_HEAD_BYTES {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
            }
            if self.fill().await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-line",
                ));
            }
        }
    }

    /// Read whatever is available, buffer first.
    pub async fn read_some(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if !self.buf.is_empty() {
            let n = out.len().min(self.buf.len());
            out[..n].copy_from_slice(&self.buf[..n]);
            self.buf.drain(..n);
            return Ok(n);
        }
        self.inner.read(out).await
    }

    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data).await
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// How a message body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    None,
    ContentLength(u64),
    Chunked,
    UntilClose,
}

impl BodyFraming {
    fn from_headers(headers: &[Header]) -> Option<Self> {
        let chunked = header_str(headers, "transfer-encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
        if chunked {
            return Some(Self::Chunked);
        }
        header_str(headers, "content-length")
            .and_then(|cl| cl.trim().parse::<u64>().ok())
            .map(Self::ContentLength)
    }

    pub fn for_request(head: &RequestHead) -> Self {
        Self::from_headers(&head.headers).unwrap_or(Self::None)
    }

    pub fn for_response(head: &ResponseHead, request_method: &str) -> Self {
        if request_method.eq_ignore_ascii_case("HEAD")
            || matches!(head.status, 100..=199 | 204 | 304)
        {
            return Self::None;
        }
        Self::from_headers(&head.headers).unwrap_or(Self::UntilClose)
    }
}

fn header_str<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .and_then(|h| std::str::from_utf8(&h.value).ok())
}

/// Buffer a complete framed body. Chunked bodies come back de-chunked.
pub async fn read_framed_body<S>(
    src: &mut CarryStream<S>,
    framing: BodyFraming,
) -> io::Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match framing {
        BodyFraming::None => Ok(Vec::new()),
        BodyFraming::ContentLength(n) => src.read_exact_vec(n as usize).await,
        BodyFraming::Chunked => {
            let mut body = Vec::new();
            loop {
                let line = src.read_line().await?;
                let size = parse_chunk_size(&line)?;
                if size == 0 {
                    loop {
                        let trailer = src.read_line().await?;
                        if trailer == b"\r\n" {
                            break;
                        }
                    }
                    return Ok(body);
                }
                let mut chunk = src.read_exact_vec(size + 2).await?;
                chunk.truncate(size);
                body.append(&mut chunk);
            }
        }
        BodyFraming::UntilClose => {
            let mut body = Vec::new();
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                let n = src.read_some(&mut chunk).await?;
                if n == 0 {
                    return Ok(body);
                }
                body.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

/// Relay a framed body verbatim, flushing after every write so the peer
/// observes data as it arrives.
pub async fn relay_body<S, D>(
    src: &mut CarryStream<S>,
    dst: &mut D,
    framing: BodyFraming,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: AsyncWrite + Unpin,
{
    match framing {
        BodyFraming::None => Ok(()),
        BodyFraming::ContentLength(n) => copy_exact(src, dst, n).await,
        BodyFraming::UntilClose => copy_until_close(src, dst).await,
        BodyFraming::Chunked => {
            loop {
                let line = src.read_line().await?;
                dst.write_all(&line).await?;
                let size = parse_chunk_size(&line)?;
                if size == 0 {
                    loop {
                        let trailer = src.read_line().await?;
                        dst.write_all(&trailer).await?;
                        if trailer == b"\r\n" {
                            break;
                        }
                    }
                    dst.flush().await?;
                    return Ok(());
                }
                copy_exact(src, dst, (size + 2) as u64).await?;
            }
        }
    }
}

async fn copy_exact<S, D>(src: &mut CarryStream<S>, dst: &mut D, len: u64) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: AsyncWrite + Unpin,
{
    let mut remaining = len;
    let mut buf = [0u8; READ_CHUNK];
    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        let n = src.read_some(&mut buf[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-body",
            ));
        }
        dst.write_all(&buf[..n]).await?;
        dst.flush().await?;
        remaining -= n as u64;
    }
    Ok(())
}

async fn copy_until_close<S, D>(src: &mut CarryStream<S>, dst: &mut D) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: AsyncWrite + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = src.read_some(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        dst.write_all(&buf[..n]).await?;
        dst.flush().await?;
    }
}

fn parse_chunk_size(line: &[u8]) -> io::Result<usize> {
    let text = std::str::from_utf8(line)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-ascii chunk size line"))?;
    let size = text.trim_end().split(';').next().unwrap_or(text);
    usize::from_str_radix(size.trim(), 16)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size"))
}
