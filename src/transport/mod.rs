//! Transport abstraction.
//!
//! The protocol needs two capabilities from a transport: a [`Dialer`] that
//! opens a fresh connection on demand, and a [`Listener`] that accepts them.
//! Both are object-safe traits, so collaborators can bring their own
//! transports (encrypted channels, tunnels) without the core knowing about
//! them.
//!
//! Two transports ship with the crate:
//!
//! - `tcp`: plain TCP sockets.
//! - `pipe`: an in-process rendezvous transport for running a client and a
//!   server in the same process without any network.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

pub mod pipe;
pub mod tcp;
mod tracked;

pub use pipe::PipeNet;
pub use tcp::{TcpDialer, TcpListener};
pub use tracked::Tracked;

/// Any bidirectional byte stream a connection can be built from.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

/// One end of an established connection.
///
/// Dropping a connection closes it; `shutdown()` closes only the write half,
/// which the peer observes as EOF.
pub struct Connection {
    stream: Box<dyn Stream>,
    peer: String,
}

impl Connection {
    pub fn new(stream: impl Stream + 'static, peer: impl Into<String>) -> Self {
        Self { stream: Box::new(stream), peer: peer.into() }
    }

    /// Address of the remote end, for logging.
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish()
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// Opens new connections to a server.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self) -> io::Result<Connection>;
}

/// Accepts connections from clients.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Waits for the next connection.
    ///
    /// Implementations must be cancel-safe: dropping the future before it
    /// completes must not lose a connection that was not handed out.
    async fn accept(&self) -> io::Result<Connection>;

    /// Stops accepting. Pending and future `accept` calls fail.
    fn close(&self);

    /// Human readable listening address.
    fn local_addr(&self) -> String;
}

#[async_trait]
impl<D: Dialer + ?Sized> Dialer for Arc<D> {
    async fn dial(&self) -> io::Result<Connection> {
        (**self).dial().await
    }
}

#[async_trait]
impl<L: Listener + ?Sized> Listener for Arc<L> {
    async fn accept(&self) -> io::Result<Connection> {
        (**self).accept().await
    }

    fn close(&self) {
        (**self).close()
    }

    fn local_addr(&self) -> String {
        (**self).local_addr()
    }
}

pub(crate) fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "listener closed")
}
