//! Resolved field shapes and default-value rules.
//!
//! [`PropertyShape`] is the closed variant set every encode/decode/size
//! strategy dispatches over. There is no reflection and no open extension:
//! a new kind of field means a new variant here and new match arms in the
//! codec, caught exhaustively by the compiler.

use crate::schema::convert::ConverterSpec;
use crate::schema::descriptor::{EnumId, MessageId};
use crate::schema::ScalarKind;
use crate::value::Value;
use crate::wire::WireType;
use std::collections::BTreeMap;

/// The canonical encode/decode/size strategy for one field, derived once at
/// resolution time
#[derive(Debug, Clone)]
pub enum PropertyShape {
    /// A primitive value
    Scalar(ScalarKind),
    /// An enum constant, encoded as a varint of its number
    Enum(EnumId),
    /// A length-delimited embedded message
    Message(MessageId),
    /// A start/end delimited group sharing the field's index
    Group(MessageId),
    /// An ordered sequence of elements
    Repeated {
        /// Shape of each element
        element: Box<PropertyShape>,
        /// Encode as one length-delimited run of concatenated values
        packed: bool,
    },
    /// A key-value map, each entry an embedded two-field message
    Map {
        /// Key kind; scalar only, key lives at entry index 1
        key: ScalarKind,
        /// Value shape, at entry index 2
        value: Box<PropertyShape>,
    },
    /// An inner shape bridged through a converter pair
    Wrapped {
        /// The shape the wire actually carries
        inner: Box<PropertyShape>,
        /// The to-wire/from-wire bridge
        converter: ConverterSpec,
    },
}

impl PropertyShape {
    /// Returns true if this shape is a numeric scalar (legal packed element)
    pub fn is_numeric_scalar(&self) -> bool {
        matches!(self, PropertyShape::Scalar(kind) if kind.is_numeric())
    }

    /// The wire type this shape naturally encodes with.
    ///
    /// Unpacked repeated shapes report their element's wire type, since
    /// each element carries its own tag.
    pub fn natural_wire(&self) -> WireType {
        match self {
            PropertyShape::Scalar(kind) => kind.wire_type(),
            PropertyShape::Enum(_) => WireType::Varint,
            PropertyShape::Message(_) => WireType::Len,
            PropertyShape::Group(_) => WireType::StartGroup,
            PropertyShape::Repeated { element, packed } => {
                if *packed {
                    WireType::Len
                } else {
                    element.natural_wire()
                }
            }
            PropertyShape::Map { .. } => WireType::Len,
            PropertyShape::Wrapped { inner, .. } => inner.natural_wire(),
        }
    }

    /// Short name of the shape variant, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyShape::Scalar(_) => "scalar",
            PropertyShape::Enum(_) => "enum",
            PropertyShape::Message(_) => "message",
            PropertyShape::Group(_) => "group",
            PropertyShape::Repeated { .. } => "repeated",
            PropertyShape::Map { .. } => "map",
            PropertyShape::Wrapped { .. } => "wrapped",
        }
    }
}

/// How an absent field materializes at decode time.
///
/// Exactly one rule applies per field: an explicit factory value wins;
/// otherwise scalars fall back to the wire-kind zero, collections to empty,
/// and wrappers and nominal shapes to "no value".
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultRule {
    /// An explicit declared default
    Explicit(Value),
    /// The wire-kind zero value (0, 0.0, false, empty string/bytes)
    ZeroOfKind(ScalarKind),
    /// An empty repeated collection
    EmptyList,
    /// An empty map
    EmptyMap,
    /// No value; the field is simply absent
    Absent,
}

impl DefaultRule {
    /// Produces the default value, or `None` when the rule is absence
    pub fn materialize(&self) -> Option<Value> {
        match self {
            DefaultRule::Explicit(value) => Some(value.clone()),
            DefaultRule::ZeroOfKind(kind) => Some(kind.zero()),
            DefaultRule::EmptyList => Some(Value::List(Vec::new())),
            DefaultRule::EmptyMap => Some(Value::Map(BTreeMap::new())),
            DefaultRule::Absent => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_materialization() {
        assert_eq!(
            DefaultRule::ZeroOfKind(ScalarKind::Int32).materialize(),
            Some(Value::I32(0))
        );
        assert_eq!(
            DefaultRule::ZeroOfKind(ScalarKind::Bool).materialize(),
            Some(Value::Bool(false))
        );
        assert_eq!(
            DefaultRule::EmptyList.materialize(),
            Some(Value::List(vec![]))
        );
        assert_eq!(DefaultRule::Absent.materialize(), None);
        assert_eq!(
            DefaultRule::Explicit(Value::I32(7)).materialize(),
            Some(Value::I32(7))
        );
    }

    #[test]
    fn test_numeric_scalar_check() {
        assert!(PropertyShape::Scalar(ScalarKind::Int32).is_numeric_scalar());
        assert!(PropertyShape::Scalar(ScalarKind::Double).is_numeric_scalar());
        assert!(!PropertyShape::Scalar(ScalarKind::String).is_numeric_scalar());
        assert!(!PropertyShape::Enum(EnumId::new(0)).is_numeric_scalar());
    }
}
