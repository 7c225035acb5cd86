//! The call protocol.
//!
//! Each logical call uses its own connection. The connection starts with a
//! one byte tag choosing between capability discovery (handshake) and a call;
//! a call then carries the method name and argument list, after which the
//! method's class decides the rest of the exchange:
//!
//! 1. Normal: the server replies with one list of return values.
//! 2. ReadStream: the server copies the method's byte source to the client.
//! 3. WriteStream: the server copies the client's bytes into the method's sink.
//!
//! This module holds the pieces that implement that protocol:
//! the value coder and framing, the method registry, the per-connection
//! dispatcher and the cancellation token used by accept loops and clients.

mod cancel;
mod context;
pub mod dispatch;
pub mod registry;
mod wire;

pub use cancel::Cancellation;
pub use context::Context;
pub use registry::{Args, ByteSink, ByteSource, FromArgs, Handler, MethodDescriptor, Registry};
pub use registry::{RegistryBuilder, Service};
pub use wire::{Coder, DEFAULT_MAX_RECORD_LENGTH};
