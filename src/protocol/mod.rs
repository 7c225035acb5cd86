//! Protocol module implements the wire protocol of the framework.
//!
//! It contains two components:
//!
//! - `xdr`: External Data Representation (XDR) for serialization and deserialization
//!   of values, capability maps and call envelopes according to RFC 4506.
//!
//! - `rpc`: the connection-per-call protocol: record framing of values, the
//!   method registry, server-side dispatch of a connection and cancellation.

pub mod rpc;
pub mod xdr;
