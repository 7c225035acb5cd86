//! Self-describing values carried in argument and return lists.
//!
//! A [`Value`] is a closed tagged union over every shape the protocol can
//! move: scalars, strings, opaque bytes, lists, maps, named-field structs and
//! [`StrError`]. Each value is encoded as an XDR enum discriminant followed by
//! the payload for that discriminant, so a decoder reconstructs the exact
//! variant without any prior registration of concrete types.

use std::fmt;
use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};

use super::utils::invalid_data;
use super::{deserialize, Deserialize, DeserializeEnum, Serialize, SerializeEnum};
use crate::error::StrError;

/// Nesting limit applied while decoding. Values are recursive, and the
/// decoder runs on untrusted input.
pub const MAX_VALUE_DEPTH: usize = 64;

/// A wire-representable argument or return value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// The absence of a value.
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Key/value pairs in insertion order. Keys may be any value.
    Map(Vec<(Value, Value)>),
    /// Named fields in declaration order.
    Struct(Vec<(String, Value)>),
    Error(StrError),
}

/// Discriminant written ahead of every [`Value`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
enum ValueKind {
    #[default]
    Nil = 0,
    Bool = 1,
    Int = 2,
    Uint = 3,
    Float = 4,
    Str = 5,
    Bytes = 6,
    List = 7,
    Map = 8,
    Struct = 9,
    Error = 10,
}
impl SerializeEnum for ValueKind {}
impl DeserializeEnum for ValueKind {}

impl Value {
    /// Builds a [`Value::List`] from anything convertible into values.
    pub fn list<I, T>(items: I) -> Value
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Builds a [`Value::Struct`] from `(field, value)` pairs.
    pub fn record<I, K, T>(fields: I) -> Value
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<Value>,
    {
        Value::Struct(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Looks up a field of a [`Value::Struct`].
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Human readable name of the variant, used in conversion errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
            Value::Error(_) => "error",
        }
    }

    fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Uint(_) => ValueKind::Uint,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::Struct(_) => ValueKind::Struct,
            Value::Error(_) => ValueKind::Error,
        }
    }

    fn deserialize_nested<R: Read>(src: &mut R, depth: usize) -> std::io::Result<Value> {
        if depth > MAX_VALUE_DEPTH {
            return Err(invalid_data(format!("Value nesting exceeds {MAX_VALUE_DEPTH}")));
        }

        let value = match deserialize::<ValueKind>(src)? {
            ValueKind::Nil => Value::Nil,
            ValueKind::Bool => Value::Bool(deserialize(src)?),
            ValueKind::Int => Value::Int(deserialize(src)?),
            ValueKind::Uint => Value::Uint(deserialize(src)?),
            ValueKind::Float => Value::Float(deserialize(src)?),
            ValueKind::Str => Value::Str(deserialize(src)?),
            ValueKind::Bytes => Value::Bytes(deserialize(src)?),
            ValueKind::List => {
                let length = deserialize::<u32>(src)? as usize;
                let mut items = Vec::with_capacity(length.min(super::utils::MAX_PREALLOCATED_ITEMS));
                for _ in 0..length {
                    items.push(Value::deserialize_nested(src, depth + 1)?);
                }
                Value::List(items)
            }
            ValueKind::Map => {
                let length = deserialize::<u32>(src)? as usize;
                let mut entries = Vec::with_capacity(length.min(super::utils::MAX_PREALLOCATED_ITEMS));
                for _ in 0..length {
                    let key = Value::deserialize_nested(src, depth + 1)?;
                    let value = Value::deserialize_nested(src, depth + 1)?;
                    entries.push((key, value));
                }
                Value::Map(entries)
            }
            ValueKind::Struct => {
                let length = deserialize::<u32>(src)? as usize;
                let mut fields = Vec::with_capacity(length.min(super::utils::MAX_PREALLOCATED_ITEMS));
                for _ in 0..length {
                    let name = deserialize::<String>(src)?;
                    let value = Value::deserialize_nested(src, depth + 1)?;
                    fields.push((name, value));
                }
                Value::Struct(fields)
            }
            ValueKind::Error => Value::Error(deserialize(src)?),
        };

        Ok(value)
    }
}

impl Serialize for Value {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.kind().serialize(dest)?;
        match self {
            Value::Nil => Ok(()),
            Value::Bool(v) => v.serialize(dest),
            Value::Int(v) => v.serialize(dest),
            Value::Uint(v) => v.serialize(dest),
            Value::Float(v) => v.serialize(dest),
            Value::Str(v) => v.serialize(dest),
            Value::Bytes(v) => v.as_slice().serialize(dest),
            Value::List(v) => v.serialize(dest),
            Value::Map(v) => v.serialize(dest),
            Value::Struct(v) => v.serialize(dest),
            Value::Error(v) => v.serialize(dest),
        }
    }
}

impl Deserialize for Value {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = Value::deserialize_nested(src, 0)?;
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::List(v) => write!(f, "<list of {}>", v.len()),
            Value::Map(v) => write!(f, "<map of {}>", v.len()),
            Value::Struct(v) => write!(f, "<struct of {} fields>", v.len()),
            Value::Error(e) => write!(f, "error({e})"),
        }
    }
}

fn mismatch(expected: &str, got: &Value) -> StrError {
    StrError::new(format!("expected {expected}, got {}", got.kind_name()))
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Uint(v as u64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<StrError> for Value {
    fn from(v: StrError) -> Self {
        Value::Error(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

// Conversions out of a Value. An application error held in the value is
// surfaced as-is, so `let n: i64 = value.try_into()?` propagates it.

impl TryFrom<Value> for bool {
    type Error = StrError;

    fn try_from(v: Value) -> Result<Self, StrError> {
        match v {
            Value::Bool(b) => Ok(b),
            Value::Error(e) => Err(e),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = StrError;

    fn try_from(v: Value) -> Result<Self, StrError> {
        match v {
            Value::Int(n) => Ok(n),
            Value::Uint(n) => {
                i64::try_from(n).map_err(|_| StrError::new(format!("{n} out of range for int")))
            }
            Value::Error(e) => Err(e),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl TryFrom<Value> for i32 {
    type Error = StrError;

    fn try_from(v: Value) -> Result<Self, StrError> {
        let n = i64::try_from(v)?;
        i32::try_from(n).map_err(|_| StrError::new(format!("{n} out of range for i32")))
    }
}

impl TryFrom<Value> for u64 {
    type Error = StrError;

    fn try_from(v: Value) -> Result<Self, StrError> {
        match v {
            Value::Uint(n) => Ok(n),
            Value::Int(n) => {
                u64::try_from(n).map_err(|_| StrError::new(format!("{n} out of range for uint")))
            }
            Value::Error(e) => Err(e),
            other => Err(mismatch("uint", &other)),
        }
    }
}

impl TryFrom<Value> for u32 {
    type Error = StrError;

    fn try_from(v: Value) -> Result<Self, StrError> {
        let n = u64::try_from(v)?;
        u32::try_from(n).map_err(|_| StrError::new(format!("{n} out of range for u32")))
    }
}

impl TryFrom<Value> for usize {
    type Error = StrError;

    fn try_from(v: Value) -> Result<Self, StrError> {
        let n = u64::try_from(v)?;
        usize::try_from(n).map_err(|_| StrError::new(format!("{n} out of range for usize")))
    }
}

impl TryFrom<Value> for f64 {
    type Error = StrError;

    fn try_from(v: Value) -> Result<Self, StrError> {
        match v {
            Value::Float(n) => Ok(n),
            Value::Error(e) => Err(e),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = StrError;

    fn try_from(v: Value) -> Result<Self, StrError> {
        match v {
            Value::Str(s) => Ok(s),
            Value::Error(e) => Err(e),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = StrError;

    fn try_from(v: Value) -> Result<Self, StrError> {
        match v {
            Value::Bytes(b) => Ok(b),
            Value::Error(e) => Err(e),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl TryFrom<Value> for Vec<Value> {
    type Error = StrError;

    fn try_from(v: Value) -> Result<Self, StrError> {
        match v {
            Value::List(items) => Ok(items),
            Value::Error(e) => Err(e),
            other => Err(mismatch("list", &other)),
        }
    }
}

/// The error variant converts without failing, so that a method returning a
/// [`StrError`] as an ordinary output can be read back as one.
impl TryFrom<Value> for StrError {
    type Error = StrError;

    fn try_from(v: Value) -> Result<Self, StrError> {
        match v {
            Value::Error(e) => Ok(e),
            Value::Nil => Ok(StrError::nil()),
            other => Err(mismatch("error", &other)),
        }
    }
}
