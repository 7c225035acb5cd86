//! Error types.
//!
//! [`StrError`] is the only error representation that crosses the wire: a
//! concrete string-backed value that methods return and clients receive
//! verbatim. [`Error`] is what callers of the client API see, and
//! [`RegistryError`] reports mistakes made while building a registry.

use std::fmt;
use std::io::{Read, Write};

use thiserror::Error;

use crate::protocol::xdr::rpc::RpcClass;
use crate::protocol::xdr::{deserialize, Deserialize, Serialize};

/// A serializable error value. The nil value means "no error".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StrError(Option<String>);

impl StrError {
    /// Creates a non-nil error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self(Some(message.into()))
    }

    /// The "no error" value.
    pub fn nil() -> Self {
        Self(None)
    }

    /// Returns true for the "no error" value.
    pub fn is_nil(&self) -> bool {
        self.0.is_none()
    }

    /// The error text, `None` for nil.
    pub fn message(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// `Ok(())` for nil, `Err(self)` otherwise.
    pub fn into_result(self) -> std::result::Result<(), StrError> {
        if self.is_nil() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for StrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(message) => f.write_str(message),
            None => f.write_str("<nil>"),
        }
    }
}

impl std::error::Error for StrError {}

impl From<&str> for StrError {
    fn from(message: &str) -> Self {
        StrError::new(message)
    }
}

impl From<String> for StrError {
    fn from(message: String) -> Self {
        StrError::new(message)
    }
}

impl From<std::io::Error> for StrError {
    fn from(err: std::io::Error) -> Self {
        StrError::new(err.to_string())
    }
}

/// Encoded as XDR optional string.
impl Serialize for StrError {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.0.serialize(dest)
    }
}

impl Deserialize for StrError {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0 = deserialize(src)?;
        Ok(())
    }
}

/// Errors surfaced to callers of [`crate::Client`].
#[derive(Error, Debug)]
pub enum Error {
    /// Dial, accept or I/O failure. Never retried.
    #[error("transport error: {0}")]
    Transport(std::io::Error),

    /// The peer sent something that does not follow the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("method {method} is a {actual} rpc, called as {expected}")]
    WrongRpcClass { method: String, expected: RpcClass, actual: RpcClass },

    #[error("method {method} returned {actual} values, expected {expected}")]
    ArityMismatch { method: String, expected: usize, actual: usize },

    /// The error returned by the remote method itself.
    #[error("{0}")]
    Application(StrError),

    #[error("call cancelled")]
    Cancelled,
}

/// Malformed data is a protocol violation; everything else is transport.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::InvalidData => Error::Protocol(err.to_string()),
            _ => Error::Transport(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported while building a [`crate::Registry`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid service name {0:?}: must be non-empty and contain no '.'")]
    InvalidServiceName(String),

    #[error("invalid method name {0:?}: must be non-empty and contain no '.'")]
    InvalidMethodName(String),

    #[error("already registered {0}")]
    AlreadyRegistered(String),

    #[error("method {0} registered twice")]
    DuplicateMethod(String),
}
