//! Schema model: declarations in, resolved descriptors out.
//!
//! This module is the engine's front half. A [`Schema`] holds the
//! declaration tree handed over by an external producer (a `.proto` parser,
//! an annotated type model, or the [`import`] adapter for
//! `FileDescriptorProto`). The [`resolver`] turns declarations into an
//! immutable [`DescriptorPool`](descriptor::DescriptorPool) exactly once;
//! every encode/decode/size call afterwards works from the pool.
//!
//! ## Submodules
//!
//! - [`shape`]: the closed [`PropertyShape`](shape::PropertyShape) variant
//!   set and default-value rules
//! - [`convert`]: the converter registry and strict/nullable pipeline
//! - [`descriptor`]: resolved, immutable descriptors and the pool arena
//! - [`resolver`]: the declaration → descriptor resolution pass
//! - [`import`]: `FileDescriptorProto` → [`Schema`] adapter

pub mod convert;
pub mod descriptor;
pub mod import;
pub mod resolver;
pub mod shape;

use crate::value::Value;
use crate::wire::WireType;
use std::collections::HashMap;
use std::ops::RangeInclusive;

/// The protobuf scalar kinds.
///
/// Each kind pins both the application-level representation and the wire
/// encoding; `int32` and `sint32` share a representation but differ on the
/// wire (plain varint vs. zigzag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Plain varint, sign-extended negative values
    Int32,
    /// Plain varint
    Int64,
    /// Plain varint
    Uint32,
    /// Plain varint
    Uint64,
    /// Zigzag varint
    Sint32,
    /// Zigzag varint
    Sint64,
    /// Varint 0 or 1
    Bool,
    /// Little-endian 4 bytes, unsigned
    Fixed32,
    /// Little-endian 8 bytes, unsigned
    Fixed64,
    /// Little-endian 4 bytes, signed
    Sfixed32,
    /// Little-endian 8 bytes, signed
    Sfixed64,
    /// IEEE 754 single, 4 bytes
    Float,
    /// IEEE 754 double, 8 bytes
    Double,
    /// Length-delimited UTF-8
    String,
    /// Length-delimited raw bytes
    Bytes,
}

impl ScalarKind {
    /// The wire type this kind encodes with
    pub fn wire_type(self) -> WireType {
        match self {
            ScalarKind::Int32
            | ScalarKind::Int64
            | ScalarKind::Uint32
            | ScalarKind::Uint64
            | ScalarKind::Sint32
            | ScalarKind::Sint64
            | ScalarKind::Bool => WireType::Varint,
            ScalarKind::Fixed32 | ScalarKind::Sfixed32 | ScalarKind::Float => WireType::Fixed32,
            ScalarKind::Fixed64 | ScalarKind::Sfixed64 | ScalarKind::Double => WireType::Fixed64,
            ScalarKind::String | ScalarKind::Bytes => WireType::Len,
        }
    }

    /// Returns true for kinds legal inside a packed repeated run
    pub fn is_numeric(self) -> bool {
        !matches!(self, ScalarKind::String | ScalarKind::Bytes)
    }

    /// Returns true for kinds legal as map keys (integral and string only)
    pub fn is_valid_map_key(self) -> bool {
        !matches!(
            self,
            ScalarKind::Float | ScalarKind::Double | ScalarKind::Bytes
        )
    }

    /// The wire-kind zero value for this kind
    pub fn zero(self) -> Value {
        match self {
            ScalarKind::Int32 | ScalarKind::Sint32 | ScalarKind::Sfixed32 => Value::I32(0),
            ScalarKind::Int64 | ScalarKind::Sint64 | ScalarKind::Sfixed64 => Value::I64(0),
            ScalarKind::Uint32 | ScalarKind::Fixed32 => Value::U32(0),
            ScalarKind::Uint64 | ScalarKind::Fixed64 => Value::U64(0),
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::Float => Value::F32(0.0),
            ScalarKind::Double => Value::F64(0.0),
            ScalarKind::String => Value::String(std::string::String::new()),
            ScalarKind::Bytes => Value::Bytes(bytes::Bytes::new()),
        }
    }

    /// The proto source name of this kind
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::Uint32 => "uint32",
            ScalarKind::Uint64 => "uint64",
            ScalarKind::Sint32 => "sint32",
            ScalarKind::Sint64 => "sint64",
            ScalarKind::Bool => "bool",
            ScalarKind::Fixed32 => "fixed32",
            ScalarKind::Fixed64 => "fixed64",
            ScalarKind::Sfixed32 => "sfixed32",
            ScalarKind::Sfixed64 => "sfixed64",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
            ScalarKind::String => "string",
            ScalarKind::Bytes => "bytes",
        }
    }
}

/// Reference to a declared type: a scalar or a named message/group/enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// A primitive kind
    Scalar(ScalarKind),
    /// A message, group, or enum declaration by name
    Named(String),
}

/// The structural nesting of a declared field, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldShape {
    /// The bare type, no container
    Plain(TypeRef),
    /// A single-slot wrapper around the contained shape
    Optional(Box<FieldShape>),
    /// An ordered collection of elements
    Repeated {
        /// Element shape
        element: Box<FieldShape>,
        /// Encode elements as one length-delimited run
        packed: bool,
    },
    /// A key-value map
    Map {
        /// Key kind; scalar only
        key: ScalarKind,
        /// Value shape
        value: Box<FieldShape>,
    },
}

impl FieldShape {
    /// Shorthand for a plain scalar shape
    pub fn scalar(kind: ScalarKind) -> Self {
        FieldShape::Plain(TypeRef::Scalar(kind))
    }

    /// Shorthand for a plain named-type shape
    pub fn named(name: impl Into<String>) -> Self {
        FieldShape::Plain(TypeRef::Named(name.into()))
    }

    /// Shorthand for an unpacked repeated shape
    pub fn repeated(element: FieldShape) -> Self {
        FieldShape::Repeated {
            element: Box::new(element),
            packed: false,
        }
    }

    /// Shorthand for a packed repeated shape
    pub fn packed(element: FieldShape) -> Self {
        FieldShape::Repeated {
            element: Box::new(element),
            packed: true,
        }
    }

    /// Shorthand for a map shape
    pub fn map(key: ScalarKind, value: FieldShape) -> Self {
        FieldShape::Map {
            key,
            value: Box::new(value),
        }
    }

    /// Shorthand for an optional wrapper
    pub fn optional(inner: FieldShape) -> Self {
        FieldShape::Optional(Box::new(inner))
    }
}

/// One declared field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Wire index; positive and unique within the message
    pub index: u32,
    /// Declared structural shape
    pub shape: FieldShape,
    /// Declared wire-kind override, validated against the shape
    pub wire: Option<WireType>,
    /// Must be present at encode time
    pub required: bool,
    /// Excluded entirely from resolution output
    pub ignored: bool,
    /// Name of a registered converter to wrap the field with
    pub converter: Option<String>,
    /// Explicit default value, taking precedence over the wire-kind zero
    pub default: Option<Value>,
    /// Oneof label; organizational only, wire encoding is unaffected
    pub oneof: Option<String>,
}

impl FieldDecl {
    /// Creates a plain optional field declaration
    pub fn new(name: impl Into<String>, index: u32, shape: FieldShape) -> Self {
        Self {
            name: name.into(),
            index,
            shape,
            wire: None,
            required: false,
            ignored: false,
            converter: None,
            default: None,
            oneof: None,
        }
    }

    /// Marks the field required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field ignored
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Declares a wire-kind override to validate at resolution
    pub fn with_wire(mut self, wire: WireType) -> Self {
        self.wire = Some(wire);
        self
    }

    /// Attaches a named converter
    pub fn with_converter(mut self, name: impl Into<String>) -> Self {
        self.converter = Some(name.into());
        self
    }

    /// Attaches an explicit default value
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Assigns the field to a oneof label
    pub fn in_oneof(mut self, label: impl Into<String>) -> Self {
        self.oneof = Some(label.into());
        self
    }
}

/// Whether a declaration is a length-prefixed message or a legacy group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Length-delimited embedded message
    Message,
    /// Start/end delimited group sharing one field index
    Group,
}

/// One declared message or group type
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDecl {
    /// Type name, unique within the schema
    pub name: String,
    /// Message or group framing
    pub kind: MessageKind,
    /// Declared fields in source order
    pub fields: Vec<FieldDecl>,
    /// Index ranges that must never be assigned
    pub reserved: Vec<RangeInclusive<u32>>,
    /// Whether decoded instances capture unknown fields for round-tripping
    pub capture_unknown: bool,
}

impl MessageDecl {
    /// Creates an empty message declaration that captures unknown fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MessageKind::Message,
            fields: Vec::new(),
            reserved: Vec::new(),
            capture_unknown: true,
        }
    }

    /// Creates an empty group declaration
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Group,
            ..Self::new(name)
        }
    }

    /// Appends a field
    pub fn with_field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    /// Reserves an index range
    pub fn with_reserved(mut self, range: RangeInclusive<u32>) -> Self {
        self.reserved.push(range);
        self
    }

    /// Sets whether unknown fields are captured (true by default)
    pub fn capture_unknown(mut self, capture: bool) -> Self {
        self.capture_unknown = capture;
        self
    }
}

/// One declared enum type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDecl {
    /// Type name, unique within the schema
    pub name: String,
    /// Constant name and number pairs
    pub values: Vec<(String, i32)>,
}

impl EnumDecl {
    /// Creates an empty enum declaration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    /// Appends a constant
    pub fn with_value(mut self, name: impl Into<String>, number: i32) -> Self {
        self.values.push((name.into(), number));
        self
    }
}

/// The full declaration tree consumed by the resolver
#[derive(Debug, Clone, Default)]
pub struct Schema {
    messages: Vec<MessageDecl>,
    enums: Vec<EnumDecl>,
    message_names: HashMap<String, usize>,
    enum_names: HashMap<String, usize>,
}

impl Schema {
    /// Creates an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a message or group declaration
    pub fn with_message(mut self, decl: MessageDecl) -> Self {
        self.message_names
            .insert(decl.name.clone(), self.messages.len());
        self.messages.push(decl);
        self
    }

    /// Adds an enum declaration
    pub fn with_enum(mut self, decl: EnumDecl) -> Self {
        self.enum_names.insert(decl.name.clone(), self.enums.len());
        self.enums.push(decl);
        self
    }

    /// Looks up a message declaration by name
    pub fn message(&self, name: &str) -> Option<&MessageDecl> {
        self.message_names.get(name).map(|&i| &self.messages[i])
    }

    /// Looks up an enum declaration by name
    pub fn enum_decl(&self, name: &str) -> Option<&EnumDecl> {
        self.enum_names.get(name).map(|&i| &self.enums[i])
    }

    /// All message declarations in insertion order
    pub fn messages(&self) -> &[MessageDecl] {
        &self.messages
    }

    /// All enum declarations in insertion order
    pub fn enums(&self) -> &[EnumDecl] {
        &self.enums
    }
}
