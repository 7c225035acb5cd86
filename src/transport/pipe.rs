//! In-process rendezvous transport.
//!
//! A [`PipeNet`] is both a [`Dialer`] and a [`Listener`]. Each `dial` creates
//! a connected pair of in-memory duplex streams and hands the server end to
//! an `accept` call that is already waiting; `dial` blocks until some
//! `accept` is ready, and `accept` blocks until some `dial` arrives. Waiting
//! accepts are served first come, first served. A connection handed to an
//! accept that is dropped before it returns is kept for the next `accept`,
//! so `accept` is cancel-safe.
//!
//! No network is involved, which makes this the transport of choice for
//! running a client and a server inside one test.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::trace;

use super::{closed_error, Connection, Dialer, Listener, Tracked};
use crate::protocol::rpc::Cancellation;

/// Default capacity of each direction of an in-memory connection.
pub const DEFAULT_PIPE_BUFFER_SIZE: usize = 64 * 1024;

type Acceptor = oneshot::Sender<Connection>;
type Backlog = std::sync::Mutex<VecDeque<Connection>>;

fn lock(backlog: &Backlog) -> MutexGuard<'_, VecDeque<Connection>> {
    backlog.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The receiving side of one waiting `accept`.
///
/// Dropping it after a dial already delivered a connection moves that
/// connection to the backlog instead of closing it.
struct PendingAccept<'a> {
    connection: oneshot::Receiver<Connection>,
    backlog: &'a Backlog,
}

impl Drop for PendingAccept<'_> {
    fn drop(&mut self) {
        self.connection.close();
        if let Ok(conn) = self.connection.try_recv() {
            trace!("Keeping connection {} of an abandoned accept", conn.peer());
            lock(self.backlog).push_back(conn);
        }
    }
}

struct Inner {
    /// Accepts waiting for a connection, in arrival order
    waiting_tx: mpsc::UnboundedSender<Acceptor>,
    /// Dials take the next waiting accept from here, one at a time
    waiting_rx: Mutex<mpsc::UnboundedReceiver<Acceptor>>,
    /// Delivered connections whose accept was dropped, oldest first
    backlog: Backlog,
    /// Cancelled by `close`
    closed: Cancellation,
    /// Live connection endpoints, both halves counted
    live: Arc<AtomicUsize>,
    /// Capacity of each duplex direction
    buffer_size: usize,
    /// Numbering for peer names
    next_id: AtomicU64,
}

/// Cloneable handle to an in-process network. Clones share state.
#[derive(Clone)]
pub struct PipeNet {
    inner: Arc<Inner>,
}

impl Default for PipeNet {
    fn default() -> Self {
        Self::new()
    }
}

impl PipeNet {
    /// Creates a net using [`DEFAULT_PIPE_BUFFER_SIZE`].
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_PIPE_BUFFER_SIZE)
    }

    /// Creates a net whose connections buffer `buffer_size` bytes per
    /// direction before writes block.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (waiting_tx, waiting_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                waiting_tx,
                waiting_rx: Mutex::new(waiting_rx),
                backlog: Backlog::default(),
                closed: Cancellation::new(),
                live: Arc::new(AtomicUsize::new(0)),
                buffer_size,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Number of connection endpoints created by this net that are still
    /// alive. Each connection contributes two until both ends are dropped.
    pub fn open_connections(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    fn pair(&self) -> (Connection, Connection) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (client, server) = tokio::io::duplex(self.inner.buffer_size);
        let peer = format!("pipe:{id}");
        (
            Connection::new(Tracked::new(client, self.inner.live.clone()), peer.clone()),
            Connection::new(Tracked::new(server, self.inner.live.clone()), peer),
        )
    }
}

#[async_trait]
impl Dialer for PipeNet {
    async fn dial(&self) -> io::Result<Connection> {
        let closed = &self.inner.closed;
        let mut waiting = tokio::select! {
            guard = self.inner.waiting_rx.lock() => guard,
            _ = closed.cancelled() => return Err(closed_error()),
        };

        loop {
            let acceptor = tokio::select! {
                acceptor = waiting.recv() => acceptor.ok_or_else(closed_error)?,
                _ = closed.cancelled() => return Err(closed_error()),
            };

            let (client, server) = self.pair();
            match acceptor.send(server) {
                Ok(()) => {
                    trace!("Pipe connection {} established", client.peer());
                    return Ok(client);
                }
                // That accept was abandoned before a connection arrived.
                Err(_) => trace!("Skipping abandoned accept"),
            }
        }
    }
}

#[async_trait]
impl Listener for PipeNet {
    async fn accept(&self) -> io::Result<Connection> {
        let closed = &self.inner.closed;
        if closed.is_cancelled() {
            return Err(closed_error());
        }

        let queued = lock(&self.inner.backlog).pop_front();
        if let Some(conn) = queued {
            return Ok(conn);
        }

        let (acceptor, connection) = oneshot::channel();
        self.inner.waiting_tx.send(acceptor).map_err(|_| closed_error())?;
        let mut pending = PendingAccept { connection, backlog: &self.inner.backlog };
        tokio::select! {
            conn = &mut pending.connection => conn.map_err(|_| closed_error()),
            _ = closed.cancelled() => Err(closed_error()),
        }
    }

    fn close(&self) {
        self.inner.closed.cancel();
        lock(&self.inner.backlog).clear();
    }

    fn local_addr(&self) -> String {
        "pipe".to_string()
    }
}
