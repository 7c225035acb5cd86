//! streamrpc - a connection-per-call RPC framework
//!
//! This library lets a process expose methods of registered objects and lets
//! remote clients invoke them over any byte-stream transport. Besides
//! ordinary value-returning calls, a method may hand back a live readable or
//! writable byte stream which the framework proxies over the call's
//! connection.
//!
//! ## Supported Features
//!
//! - Three method classes: normal request/response, read streams and write streams
//! - Capability discovery handshake, so clients know every method's class up front
//! - Self-describing XDR values, no out-of-band type registration
//! - TCP transport and an in-process rendezvous transport for tests
//! - Asynchronous operation with Tokio runtime, one task per connection
//! - Graceful shutdown and explicit cancellation tokens
//!
//! ## Main Components
//!
//! - `transport`: the `Dialer` and `Listener` abstraction and its TCP and
//!   in-process implementations.
//!
//! - `protocol`: the XDR coder, record framing, method registry and the
//!   server-side dispatch of a connection.
//!
//! - `server`: the accept loop that serves a registry over a listener.
//!
//! - `client`: the handshake and the three call entry points.
//!
//! ## Usage
//!
//! Build a [`Registry`] from one or more [`Service`]s, hand it to a
//! [`Server`] and accept on a listener. Create a [`Client`] from a dialer
//! pointing at that listener and call methods by their qualified name,
//! `Service.Method`.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::Client;
pub use error::{Error, RegistryError, Result, StrError};
pub use protocol::rpc::{Args, Cancellation, Handler, Registry, RegistryBuilder, Service};
pub use protocol::xdr;
pub use protocol::xdr::rpc::{CapabilityMap, RpcClass};
pub use protocol::xdr::value::Value;
pub use server::Server;
pub use transport::{Connection, Dialer, Listener, PipeNet, TcpDialer, TcpListener};
