//! Data structures exchanged at the start of every connection: the purpose
//! tag, the method classes, the capability map sent during the handshake and
//! the envelope of a call.

use std::collections::BTreeMap;
use std::fmt;

use num_derive::{FromPrimitive, ToPrimitive};

use super::value::Value;
use super::{DeserializeEnum, SerializeEnum};

/// First byte of every connection, selecting how the server handles it.
///
/// The tag is sent as a single raw byte rather than an XDR integer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Tag {
    /// A single call: method name, arguments, then a class-specific response.
    Call = 1,
    /// Capability discovery: the server answers with its [`CapabilityMap`].
    Handshake = 2,
}

/// Transport discipline a method uses once its envelope has been sent.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum RpcClass {
    /// Buffered request/response: the server answers with a list of values.
    #[default]
    Normal = 0,
    /// The server streams raw bytes to the client until EOF.
    ReadStream = 1,
    /// The client streams raw bytes to the server until it closes its side.
    WriteStream = 2,
}
impl SerializeEnum for RpcClass {}
impl DeserializeEnum for RpcClass {}

impl RpcClass {
    /// Classifies a method name by the `Normal_`, `Read_` and `Write_`
    /// prefix convention, returning the class and the bare method name.
    ///
    /// Names without a recognised prefix, or with nothing after it,
    /// yield `None`.
    pub fn from_method_name(raw: &str) -> Option<(RpcClass, &str)> {
        const PREFIXES: [(&str, RpcClass); 3] = [
            ("Normal_", RpcClass::Normal),
            ("Read_", RpcClass::ReadStream),
            ("Write_", RpcClass::WriteStream),
        ];

        PREFIXES.iter().find_map(|(prefix, class)| {
            raw.strip_prefix(prefix).filter(|name| !name.is_empty()).map(|name| (*class, name))
        })
    }
}

impl fmt::Display for RpcClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpcClass::Normal => "normal",
            RpcClass::ReadStream => "read-stream",
            RpcClass::WriteStream => "write-stream",
        };
        f.write_str(name)
    }
}

/// Qualified method name (`Type.Method`) to class, as sent in the handshake.
pub type CapabilityMap = BTreeMap<String, RpcClass>;

/// A call as built by the client: the qualified method name followed by the
/// positional arguments. On the wire these are two consecutive records after
/// the [`Tag::Call`] byte, letting the server resolve the method before it
/// decodes any argument.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallEnvelope {
    pub method: String,
    pub args: Vec<Value>,
}

impl CallEnvelope {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self { method: method.into(), args }
    }
}
