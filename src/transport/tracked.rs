//! Stream wrapper that keeps count of live connections and the bytes moved
//! through each of them.
//!
//! Used by the in-process transport so tests can check that every connection
//! opened for a call is released once the call is over.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

/// A wrapper around a stream that counts bytes read and written, and holds
/// one unit of a shared live-connection counter until dropped.
pub struct Tracked<S> {
    /// The wrapped stream
    inner: S,
    /// Shared count of live tracked streams
    live: Arc<AtomicUsize>,
    /// Bytes successfully read so far
    read: u64,
    /// Bytes successfully written so far
    written: u64,
}

impl<S> Tracked<S> {
    /// Wraps `inner`, incrementing `live` until the wrapper is dropped.
    pub fn new(inner: S, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Tracked { inner, live, read: 0, written: 0 }
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl<S> Drop for Tracked<S> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        trace!("Stream released after {} bytes read, {} written", self.read, self.written);
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Tracked<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let res = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = res {
            self.read += (buf.filled().len() - before) as u64;
        }
        res
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Tracked<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let res = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(size)) = res {
            self.written += size as u64;
        }
        res
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
