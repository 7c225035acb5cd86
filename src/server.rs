//! The server accepts connections and dispatches each one on its own task.
//!
//! This module implements the accept loop that:
//! - Accepts connections from any [`Listener`]
//! - Builds a per-connection context sharing the immutable registry
//! - Spawns an asynchronous task per connection
//! - Stops on `close()` or when the caller's cancellation token fires
//!
//! Shutdown is graceful with respect to accepting: once [`Server::close`]
//! returns, no further connection is dispatched. Connections already being
//! served run to completion.

use std::io;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::protocol::rpc::{dispatch, Cancellation, Coder, Context, Registry};
use crate::transport::{Listener, TcpListener};

/// Default buffer size used when proxying stream calls.
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Serves the methods of a [`Registry`] over any transport.
pub struct Server {
    /// Methods exposed by this server, shared read-only with every connection
    registry: Arc<Registry>,
    /// Coder used for tags, envelopes and normal replies
    coder: Coder,
    /// Buffer size used when proxying stream calls
    copy_buffer_size: usize,
    /// Cancelled by `close`
    shutdown: Cancellation,
    /// Held by the accept loop while it runs
    running: Mutex<()>,
}

impl Server {
    /// Creates a server exposing `registry`.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            coder: Coder::default(),
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            shutdown: Cancellation::new(),
            running: Mutex::new(()),
        }
    }

    /// Sets the buffer size used when proxying read and write streams.
    pub fn with_copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = size.max(1);
        self
    }

    /// Sets the largest method name or argument record the server accepts.
    pub fn with_max_record_length(mut self, length: usize) -> Self {
        self.coder = Coder::new(length);
        self
    }

    /// The methods this server dispatches to.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Accepts connections from `listener` until the server is closed,
    /// `cancel` fires, or the listener fails.
    ///
    /// Each connection is handled on its own task; the loop never waits for
    /// a connection to finish before accepting the next one. Only one accept
    /// loop runs at a time per server; a second call waits for the first.
    pub async fn accept<L: Listener + ?Sized>(
        &self,
        listener: &L,
        cancel: &Cancellation,
    ) -> io::Result<()> {
        let _running = self.running.lock().await;
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        info!("Serving {} methods on {}", self.registry.len(), listener.local_addr());

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Accept loop on {} closed", listener.local_addr());
                    return Ok(());
                }
                _ = cancel.cancelled() => {
                    debug!("Accept loop on {} cancelled", listener.local_addr());
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let conn = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Accept on {} failed: {}", listener.local_addr(), e);
                            return Err(e);
                        }
                    };
                    let context = Context {
                        client_addr: conn.peer().to_string(),
                        registry: self.registry.clone(),
                        coder: self.coder,
                        copy_buffer_size: self.copy_buffer_size,
                    };
                    debug!("Accepting connection {:?}", context);
                    tokio::spawn(async move {
                        let client_addr = context.client_addr.clone();
                        if let Err(e) = dispatch::handle_connection(conn, context).await {
                            debug!("Connection from {} closed: {:?}", client_addr, e);
                        }
                    });
                }
            }
        }
    }

    /// Binds a TCP listener on `addr` and serves it, see [`Server::accept`].
    pub async fn listen(&self, addr: &str, cancel: &Cancellation) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.accept(&listener, cancel).await
    }

    /// Stops accepting connections.
    ///
    /// Returns once any running accept loop has exited, so no connection is
    /// dispatched after this call completes. Later calls to `accept` return
    /// immediately.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let _running = self.running.lock().await;
        debug!("Server closed");
    }
}
