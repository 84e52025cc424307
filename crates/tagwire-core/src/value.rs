//! Dynamic application values.
//!
//! The engine has no code-generation backend in-tree, so encode, decode and
//! size all operate on a dynamic value model. A [`Value`] carries one field's
//! application-level payload; a [`MessageValue`] is a whole message instance,
//! keyed by field index, with its captured unknown fields alongside.

use crate::unknown::UnknownFieldSet;
use bytes::Bytes;
use std::collections::BTreeMap;

/// One application-level value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicitly absent (single-slot wrappers, unset optional fields)
    None,
    /// Boolean
    Bool(bool),
    /// 32-bit signed integer (int32, sint32, sfixed32)
    I32(i32),
    /// 64-bit signed integer (int64, sint64, sfixed64)
    I64(i64),
    /// 32-bit unsigned integer (uint32, fixed32)
    U32(u32),
    /// 64-bit unsigned integer (uint64, fixed64)
    U64(u64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Bytes),
    /// Enum constant by number
    Enum(i32),
    /// Nested message or group instance
    Message(Box<MessageValue>),
    /// Repeated field elements, in order
    List(Vec<Value>),
    /// Map field entries; BTreeMap keeps encode order deterministic
    Map(BTreeMap<MapKey, Value>),
}

impl Value {
    /// Returns true for `Value::None`
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Borrows the nested message, if this value is one
    pub fn as_message(&self) -> Option<&MessageValue> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Short human-readable name of this value's variant
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Message(_) => "message",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl From<MessageValue> for Value {
    fn from(m: MessageValue) -> Self {
        Value::Message(Box::new(m))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

/// A map key.
///
/// Restricted to the legal protobuf key kinds; floats, bytes and nested
/// shapes are never keys. `Ord` gives maps a deterministic encode order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    /// Boolean key
    Bool(bool),
    /// 32-bit signed key (int32, sint32, sfixed32)
    I32(i32),
    /// 64-bit signed key (int64, sint64, sfixed64)
    I64(i64),
    /// 32-bit unsigned key (uint32, fixed32)
    U32(u32),
    /// 64-bit unsigned key (uint64, fixed64)
    U64(u64),
    /// String key
    String(String),
}

impl MapKey {
    /// Lifts the key into a plain [`Value`] for shape-generic encoding
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(v) => Value::Bool(*v),
            MapKey::I32(v) => Value::I32(*v),
            MapKey::I64(v) => Value::I64(*v),
            MapKey::U32(v) => Value::U32(*v),
            MapKey::U64(v) => Value::U64(*v),
            MapKey::String(v) => Value::String(v.clone()),
        }
    }

    /// Lowers a decoded [`Value`] back into a key, if it is a legal key kind
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(MapKey::Bool(v)),
            Value::I32(v) => Some(MapKey::I32(v)),
            Value::I64(v) => Some(MapKey::I64(v)),
            Value::U32(v) => Some(MapKey::U32(v)),
            Value::U64(v) => Some(MapKey::U64(v)),
            Value::String(v) => Some(MapKey::String(v)),
            _ => None,
        }
    }
}

/// One message (or group) instance.
///
/// Fields are keyed by their wire index; unknown fields captured during a
/// previous decode live alongside and re-encode byte-identically.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageValue {
    /// Populated fields by index
    pub fields: BTreeMap<u32, Value>,
    /// Fields captured from the wire with no matching descriptor entry
    pub unknown: UnknownFieldSet,
}

impl MessageValue {
    /// Creates an empty message value
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field by index, returning self for chaining
    pub fn with_field(mut self, index: u32, value: impl Into<Value>) -> Self {
        self.fields.insert(index, value.into());
        self
    }

    /// Sets a field by index
    pub fn set(&mut self, index: u32, value: impl Into<Value>) {
        self.fields.insert(index, value.into());
    }

    /// Gets a field by index
    pub fn get(&self, index: u32) -> Option<&Value> {
        self.fields.get(&index)
    }

    /// Returns true if no fields (known or unknown) are populated
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.unknown.is_empty()
    }
}
