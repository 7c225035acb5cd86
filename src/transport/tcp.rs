//! TCP transport.

use std::io;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::{closed_error, Connection, Dialer, Listener};
use crate::protocol::rpc::Cancellation;

/// Dials a fixed TCP address, e.g. `"127.0.0.1:4000"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpDialer(pub String);

impl TcpDialer {
    /// Creates a dialer for `addr`, a `host:port` string resolved on each dial.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> io::Result<Connection> {
        let socket = TcpStream::connect(&self.0).await?;
        let _ = socket.set_nodelay(true);
        let peer = socket.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| self.0.clone());
        debug!("Dialed {}", peer);
        Ok(Connection::new(socket, peer))
    }
}

/// TCP listener bound to a local address.
pub struct TcpListener {
    /// Tokio listener accepting incoming connections
    listener: tokio::net::TcpListener,
    /// Address the listener is actually bound to
    local_addr: SocketAddr,
    /// Cancelled by `close`
    closed: Cancellation,
}

impl TcpListener {
    /// Binds to `addr` in the form `"IP:PORT"`.
    ///
    /// Port 0 lets the OS pick a free port; use [`TcpListener::port`] to
    /// find out which one was assigned.
    pub async fn bind(addr: &str) -> io::Result<TcpListener> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Listening on {:?}", local_addr);
        Ok(TcpListener { listener, local_addr, closed: Cancellation::new() })
    }

    /// Returns the actual port number on which the listener is bound
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the IP address on which the listener is bound
    pub fn ip(&self) -> IpAddr {
        self.local_addr.ip()
    }

    /// A dialer connecting to this listener.
    pub fn dialer(&self) -> TcpDialer {
        TcpDialer(self.local_addr.to_string())
    }
}

#[async_trait]
impl Listener for TcpListener {
    async fn accept(&self) -> io::Result<Connection> {
        if self.closed.is_cancelled() {
            return Err(closed_error());
        }
        tokio::select! {
            accepted = self.listener.accept() => {
                let (socket, addr) = accepted?;
                let _ = socket.set_nodelay(true);
                Ok(Connection::new(socket, addr.to_string()))
            }
            _ = self.closed.cancelled() => Err(closed_error()),
        }
    }

    fn close(&self) {
        self.closed.cancel();
    }

    fn local_addr(&self) -> String {
        self.local_addr.to_string()
    }
}
