//! Bidirectional raw byte relay for upgraded connections.
//!
//! Once a protocol upgrade has been negotiated, both directions must be
//! serviced from a single task; a blocking read on one side would stall
//! the other indefinitely. The loop therefore waits on readiness of both
//! streams at once and only ever issues non-blocking reads.

use std::io;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

const FORWARD_BUF_SIZE: usize = 4096;

/// Relay bytes between two connected streams until either side closes or
/// an unrecoverable I/O error occurs. The caller closes both sides.
pub async fn forward(downstream: &mut UnixStream, upstream: &mut UnixStream) -> io::Result<()> {
    let mut buf = [0u8; FORWARD_BUF_SIZE];
    loop {
        let downstream_ready = tokio::select! {
            ready = downstream.readable() => {
                ready?;
                true
            }
            ready = upstream.readable() => {
                ready?;
                false
            }
        };

        let (src, dst) = if downstream_ready {
            (&mut *downstream, &mut *upstream)
        } else {
            (&mut *upstream, &mut *downstream)
        };

        match src.try_read(&mut buf) {
            // Peer closed; forwarding is done.
            Ok(0) => return Ok(()),
            Ok(n) => {
                dst.write_all(&buf[..n]).await?;
                dst.flush().await?;
            }
            // Readiness was stale; nothing to read right now.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_exact(stream: &mut UnixStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        stream.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn relays_interleaved_bursts_in_both_directions() {
        let (mut client, mut proxy_side_a) = UnixStream::pair().unwrap();
        let (mut server, mut proxy_side_b) = UnixStream::pair().unwrap();

        let forwarder =
            tokio::spawn(async move { forward(&mut proxy_side_a, &mut proxy_side_b).await });

        client.write_all(b"c1").await.unwrap();
        assert_eq!(read_exact(&mut server, 2).await, b"c1");

        server.write_all(b"s1s2").await.unwrap();
        assert_eq!(read_exact(&mut client, 4).await, b"s1s2");

        client.write_all(b"c2").await.unwrap();
        server.write_all(b"s3").await.unwrap();
        assert_eq!(read_exact(&mut server, 2).await, b"c2");
        assert_eq!(read_exact(&mut client, 2).await, b"s3");

        drop(client);
        forwarder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn close_on_either_side_ends_the_loop() {
        let (client, mut proxy_side_a) = UnixStream::pair().unwrap();
        let (server, mut proxy_side_b) = UnixStream::pair().unwrap();

        let forwarder =
            tokio::spawn(async move { forward(&mut proxy_side_a, &mut proxy_side_b).await });

        drop(server);
        drop(client);
        forwarder.await.unwrap().unwrap();
    }
}
