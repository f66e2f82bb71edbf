//! Byte relay primitives
//!
//! Every daemon in the family reduces to the same move: take two reliable
//! byte channels and splice them together until one side is done. [`link`]
//! is that splice; it copies full-duplex and couples the lifetimes of its
//! two endpoints, so closing either end tears the whole pair down.
//!
//! Copies go through 32 KiB buffers drawn from a process-wide pool to keep
//! allocation pressure flat under heavy stream churn.

use std::io;
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Size of each copy buffer.
pub const COPY_BUF_SIZE: usize = 32 * 1024;

/// Buffers kept for reuse; anything beyond this is simply freed.
const MAX_POOLED: usize = 64;

static BUF_POOL: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());

/// A copy buffer checked out of the shared pool. Returns itself to the pool
/// on drop, including when the copy future is cancelled mid-transfer.
struct PooledBuf(Option<Vec<u8>>);

impl PooledBuf {
    fn checkout() -> Self {
        let buf = BUF_POOL
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_else(|| vec![0u8; COPY_BUF_SIZE]);
        Self(Some(buf))
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.0.take() {
            let mut pool = BUF_POOL.lock().unwrap_or_else(|e| e.into_inner());
            if pool.len() < MAX_POOLED {
                pool.push(buf);
            }
        }
    }
}

impl std::ops::Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.as_deref().unwrap_or(&[])
    }
}

impl std::ops::DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.0.as_deref_mut().unwrap_or(&mut [])
    }
}

/// Copy `src` to `dst` through a pooled buffer until EOF or I/O failure.
/// Returns the number of bytes moved.
pub async fn copy_buffered<R, W>(src: &mut R, dst: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = PooledBuf::checkout();
    let mut total = 0u64;

    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        dst.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}

/// Splice two byte streams together, copying in both directions until either
/// direction completes (EOF, reset, or I/O failure).
///
/// The first direction to finish wins: both streams are closed when `link`
/// returns, which unblocks whatever the slower direction was still waiting
/// on. Clean EOF and error are not distinguished; both just release the pair.
pub async fn link<A, B>(a: A, b: B)
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut read_a, mut write_a) = tokio::io::split(a);
    let (mut read_b, mut write_b) = tokio::io::split(b);

    let forward = async {
        let copied = copy_buffered(&mut read_a, &mut write_b).await;
        let _ = write_b.shutdown().await;
        copied
    };
    let backward = async {
        let copied = copy_buffered(&mut read_b, &mut write_a).await;
        let _ = write_a.shutdown().await;
        copied
    };

    tokio::select! {
        copied = forward => trace!("forward direction finished ({:?} bytes)", copied),
        copied = backward => trace!("backward direction finished ({:?} bytes)", copied),
    }
    // Dropping all four halves here closes both streams and unblocks the
    // direction that lost the race.
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_copy_buffered_moves_everything() {
        let payload: Vec<u8> = (0..COPY_BUF_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let (mut near, mut far) = duplex(4096);

        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            near.write_all(&payload).await.unwrap();
            near.shutdown().await.unwrap();
        });

        let mut sink = Vec::new();
        let copied = copy_buffered(&mut far, &mut sink).await.unwrap();

        writer.await.unwrap();
        assert_eq!(copied, expected.len() as u64);
        assert_eq!(sink, expected);
    }

    #[tokio::test]
    async fn test_link_relays_both_directions() {
        let (client_side, relay_left) = duplex(1024);
        let (relay_right, server_side) = duplex(1024);
        tokio::spawn(link(relay_left, relay_right));

        let (mut client_read, mut client_write) = tokio::io::split(client_side);
        let (mut server_read, mut server_write) = tokio::io::split(server_side);

        client_write.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server_write.write_all(b"pong").await.unwrap();
        client_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_link_couples_lifetimes() {
        let (client_side, relay_left) = duplex(1024);
        let (relay_right, server_side) = duplex(1024);
        let relay = tokio::spawn(link(relay_left, relay_right));

        // Closing one end must finish the relay and EOF the other end.
        drop(client_side);
        relay.await.unwrap();

        let (mut server_read, _server_write) = tokio::io::split(server_side);
        let n = server_read.read(&mut [0u8; 8]).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_pool_reuses_buffers() {
        // Run enough sequential copies to cycle the pool.
        for _ in 0..4 {
            let (mut a, mut b) = duplex(256);
            let writer = tokio::spawn(async move {
                a.write_all(b"data").await.unwrap();
                a.shutdown().await.unwrap();
                a
            });
            let mut sink = Vec::new();
            copy_buffered(&mut b, &mut sink).await.unwrap();
            assert_eq!(sink, b"data");
            writer.await.unwrap();
        }

        let pooled = BUF_POOL.lock().unwrap_or_else(|e| e.into_inner()).len();
        assert!(pooled <= MAX_POOLED);
    }
}
