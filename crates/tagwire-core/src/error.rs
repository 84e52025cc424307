//! Error types for the tagwire-core library.
//!
//! This module provides comprehensive error handling using the `thiserror` crate.
//! Errors are split along the three phases of the engine:
//!
//! - [`ResolutionError`]: schema-build time, raised once and fatal for the type
//! - [`WireFormatError`]: decode time, fatal for the current decode call
//! - [`ValidationError`]: encode time (missing required fields, shape mismatches)
//!
//! The top-level [`Error`] wraps all three for APIs that span phases.

use thiserror::Error;

/// Result type alias for tagwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type wrapping all engine failure modes
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Schema resolution failed
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The wire data was structurally invalid
    #[error(transparent)]
    Wire(#[from] WireFormatError),

    /// The value being encoded violated the schema
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A strict converter rejected a value
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Schema-build time errors.
///
/// Any of these prevents a usable descriptor pool from being produced for the
/// offending type. They are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResolutionError {
    /// A field's declared shape has more wrapper nesting than can be
    /// unambiguously unwrapped
    #[error("ambiguous shape for field '{field}': {details}")]
    AmbiguousShape {
        /// Qualified field name (message.field)
        field: String,
        /// What made the shape ambiguous
        details: String,
    },

    /// A declared converter name has no registered implementation
    #[error("unresolved converter '{name}' on field '{field}'")]
    UnresolvedConverter {
        /// The converter name as declared
        name: String,
        /// Qualified field name
        field: String,
    },

    /// Two fields claim the same index within one message
    #[error("duplicate field index {index} in message '{message}'")]
    DuplicateIndex {
        /// Message name
        message: String,
        /// The contested index
        index: u32,
    },

    /// A field uses an index the message has marked reserved
    #[error("field '{field}' uses reserved index {index} in message '{message}'")]
    ReservedIndexViolation {
        /// Message name
        message: String,
        /// Offending field name
        field: String,
        /// The reserved index
        index: u32,
    },

    /// The declared wire kind cannot carry the declared primitive
    #[error("incompatible wire kind for field '{field}': {details}")]
    IncompatibleWireKind {
        /// Qualified field name
        field: String,
        /// What was incompatible
        details: String,
    },

    /// A nominal type reference has no declaration in the schema
    #[error("unknown type '{name}' referenced by field '{field}'")]
    UnknownType {
        /// The unresolved type name
        name: String,
        /// Qualified field name
        field: String,
    },

    /// A map key shape is not a legal protobuf key kind
    #[error("invalid map key for field '{field}': {details}")]
    InvalidMapKey {
        /// Qualified field name
        field: String,
        /// Why the key is invalid
        details: String,
    },

    /// The packed flag was set on a non-numeric or non-repeated field
    #[error("packed is not legal for field '{field}': {details}")]
    InvalidPacked {
        /// Qualified field name
        field: String,
        /// Why packed is not applicable
        details: String,
    },

    /// A field index is zero or exceeds the protobuf maximum
    #[error("invalid field index {index} for field '{field}': must be between 1 and {max}")]
    InvalidIndex {
        /// Qualified field name
        field: String,
        /// The invalid index
        index: u32,
        /// Maximum valid field index
        max: u32,
    },

    /// Importing a FileDescriptorProto failed
    #[error("descriptor import failed: {0}")]
    Import(String),
}

impl ResolutionError {
    /// Creates a new ambiguous-shape error
    pub fn ambiguous_shape(field: impl Into<String>, details: impl Into<String>) -> Self {
        Self::AmbiguousShape {
            field: field.into(),
            details: details.into(),
        }
    }

    /// Creates a new incompatible-wire-kind error
    pub fn incompatible_wire_kind(field: impl Into<String>, details: impl Into<String>) -> Self {
        Self::IncompatibleWireKind {
            field: field.into(),
            details: details.into(),
        }
    }

    /// Creates a new import error
    pub fn import(msg: impl Into<String>) -> Self {
        Self::Import(msg.into())
    }
}

/// Decode-time errors.
///
/// All of these abort the entire decode call; no partial value is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WireFormatError {
    /// A varint did not terminate within 10 bytes
    #[error("malformed varint at offset {offset}: no terminator within 10 bytes")]
    MalformedVarint {
        /// Byte offset where the varint began
        offset: usize,
    },

    /// Fewer bytes remained than the wire format required
    #[error("truncated stream at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedStream {
        /// Byte offset of the read
        offset: usize,
        /// Bytes the read required
        needed: usize,
        /// Bytes actually remaining
        available: usize,
    },

    /// A length prefix exceeded the remaining input
    #[error("length {length} at offset {offset} exceeds {remaining} remaining bytes")]
    NegativeOrOversizedLength {
        /// Byte offset of the length prefix
        offset: usize,
        /// The declared length
        length: u64,
        /// Bytes actually remaining
        remaining: usize,
    },

    /// A tag's low 3 bits did not map to a known wire kind
    #[error("invalid wire type {code} at offset {offset}")]
    InvalidWireType {
        /// The unknown wire-kind code
        code: u8,
        /// Byte offset of the tag
        offset: usize,
    },

    /// A group end tag carried a different index than the open group
    #[error("unmatched group end: expected index {expected}, found {found}")]
    UnmatchedGroupEnd {
        /// Index of the group awaiting its end tag
        expected: u32,
        /// Index the end tag actually carried
        found: u32,
    },

    /// A group start tag was never closed before the stream ended
    #[error("group {index} was not closed before end of input")]
    UnterminatedGroup {
        /// Index of the unclosed group
        index: u32,
    },

    /// A string field's payload was not valid UTF-8
    #[error("invalid UTF-8 in string field at offset {offset}")]
    InvalidUtf8 {
        /// Byte offset of the payload
        offset: usize,
    },

    /// A tag carried a field index of zero or above the protobuf maximum
    #[error("invalid field index {index}: must be between 1 and {max}")]
    InvalidFieldIndex {
        /// The invalid index
        index: u32,
        /// Maximum valid field index
        max: u32,
    },
}

impl WireFormatError {
    /// Creates a new malformed-varint error
    pub fn malformed_varint(offset: usize) -> Self {
        Self::MalformedVarint { offset }
    }

    /// Creates a new truncated-stream error
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::TruncatedStream {
            offset,
            needed,
            available,
        }
    }
}

/// Encode-time validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// A required field had no value at encode time
    #[error("required field '{field}' (index {index}) of message '{message}' is unset")]
    MissingRequiredField {
        /// Message name
        message: String,
        /// Field name
        field: String,
        /// Field index
        index: u32,
    },

    /// The value's variant did not match the field's resolved shape
    #[error("value for field '{field}' does not match its shape: {details}")]
    ShapeMismatch {
        /// Qualified field name
        field: String,
        /// What mismatched
        details: String,
    },
}

impl ValidationError {
    /// Creates a new shape-mismatch error
    pub fn shape_mismatch(field: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            field: field.into(),
            details: details.into(),
        }
    }
}

/// A converter rejected a value.
///
/// For strict converters this aborts the whole encode or decode; nullable
/// converters substitute the field's default rule instead of surfacing this.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("converter '{converter}' rejected value: {details}")]
pub struct ConvertError {
    /// Name of the converter that failed
    pub converter: String,
    /// Why the conversion failed
    pub details: String,
}

impl ConvertError {
    /// Creates a new conversion error
    pub fn new(converter: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            converter: converter.into(),
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error_display() {
        let err = ResolutionError::DuplicateIndex {
            message: "Foo".into(),
            index: 3,
        };
        assert!(err.to_string().contains("duplicate field index 3"));
        assert!(err.to_string().contains("Foo"));
    }

    #[test]
    fn test_wire_error_display() {
        let err = WireFormatError::malformed_varint(12);
        assert!(err.to_string().contains("offset 12"));
    }

    #[test]
    fn test_error_wrapping() {
        let err: Error = WireFormatError::malformed_varint(0).into();
        assert!(matches!(err, Error::Wire(_)));

        let err: Error = ConvertError::new("uuid", "bad length").into();
        assert!(matches!(err, Error::Convert(_)));
    }
}
