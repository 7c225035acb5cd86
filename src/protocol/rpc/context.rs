//! Per-connection server state.
//!
//! Every accepted connection gets its own [`Context`], carrying the peer's
//! address for logging and shared, read-only handles to the registry and the
//! server's I/O settings.

use std::fmt;
use std::sync::Arc;

use super::registry::Registry;
use super::wire::Coder;

/// Execution context for one accepted connection.
#[derive(Clone)]
pub struct Context {
    /// Peer address, used for logging
    pub client_addr: String,

    /// Methods this server exposes; never mutated while serving
    pub registry: Arc<Registry>,

    /// Coder used for the tag, envelope and normal replies
    pub coder: Coder,

    /// Buffer size used when proxying stream calls
    pub copy_buffer_size: usize,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("rpc::Context")
            .field("client_addr", &self.client_addr)
            .field("methods", &self.registry.len())
            .field("coder", &self.coder)
            .field("copy_buffer_size", &self.copy_buffer_size)
            .finish()
    }
}
