//! Resolved descriptors and the descriptor pool.
//!
//! A [`DescriptorPool`] is an arena of fully resolved message and enum
//! descriptors, indexed by [`MessageId`]/[`EnumId`] and by name. It is built
//! exactly once per schema by the resolver, is immutable afterwards, and is
//! safe to share across threads behind an `Arc` without synchronization.
//! The id-based indexing is what lets self-referential and mutually
//! recursive types exist: a shape holds an id into the pool rather than an
//! owning reference.
//!
//! The pool is the descriptor cache. It is owned by the caller (one per
//! process, or one per test) rather than living in an implicit global, so
//! resolution stays deterministic and testable in isolation.

use crate::schema::shape::{DefaultRule, PropertyShape};
use crate::schema::MessageKind;
use std::collections::HashMap;
use std::ops::RangeInclusive;

/// Index of a message descriptor within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(usize);

impl MessageId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Index of an enum descriptor within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(usize);

impl EnumId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// One resolved field: index, strategy, default rule, flags
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Wire index; positive and unique within the message
    pub index: u32,
    /// The canonical encode/decode/size strategy
    pub shape: PropertyShape,
    /// What an absent field materializes as at decode time
    pub default: DefaultRule,
    /// Must be present at encode time
    pub required: bool,
    /// Oneof label; organizational only
    pub oneof: Option<String>,
}

/// One resolved message or group type.
///
/// Built once, never mutated, shared for every subsequent encode/decode
/// call against the type.
#[derive(Debug, Clone)]
pub struct MessageDescriptor {
    /// Type name
    pub name: String,
    /// Message or group framing
    pub kind: MessageKind,
    fields: Vec<FieldDescriptor>,
    reserved: Vec<RangeInclusive<u32>>,
    captures_unknown: bool,
}

impl MessageDescriptor {
    pub(crate) fn new(
        name: String,
        kind: MessageKind,
        mut fields: Vec<FieldDescriptor>,
        reserved: Vec<RangeInclusive<u32>>,
        captures_unknown: bool,
    ) -> Self {
        fields.sort_by_key(|f| f.index);
        Self {
            name,
            kind,
            fields,
            reserved,
            captures_unknown,
        }
    }

    /// Fields in ascending index order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by wire index
    pub fn field(&self, index: u32) -> Option<&FieldDescriptor> {
        self.fields
            .binary_search_by_key(&index, |f| f.index)
            .ok()
            .map(|i| &self.fields[i])
    }

    /// Returns true if the index falls in a reserved range
    pub fn is_reserved(&self, index: u32) -> bool {
        self.reserved.iter().any(|r| r.contains(&index))
    }

    /// Whether decoded instances capture unknown fields
    pub fn captures_unknown(&self) -> bool {
        self.captures_unknown
    }
}

/// One resolved enum type: a number ↔ constant mapping
#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    /// Type name
    pub name: String,
    values: Vec<(String, i32)>,
    by_number: HashMap<i32, usize>,
}

impl EnumDescriptor {
    pub(crate) fn new(name: String, values: Vec<(String, i32)>) -> Self {
        // First constant wins for aliased numbers
        let mut by_number = HashMap::new();
        for (i, (_, number)) in values.iter().enumerate() {
            by_number.entry(*number).or_insert(i);
        }
        Self {
            name,
            values,
            by_number,
        }
    }

    /// Constant name and number pairs in declaration order
    pub fn values(&self) -> &[(String, i32)] {
        &self.values
    }

    /// Looks up a constant name by number
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.by_number
            .get(&number)
            .map(|&i| self.values[i].0.as_str())
    }

    /// Returns true if the number maps to a declared constant
    pub fn contains(&self, number: i32) -> bool {
        self.by_number.contains_key(&number)
    }
}

/// Immutable arena of resolved descriptors
#[derive(Debug, Clone, Default)]
pub struct DescriptorPool {
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    message_names: HashMap<String, MessageId>,
    enum_names: HashMap<String, EnumId>,
}

impl DescriptorPool {
    pub(crate) fn from_parts(
        messages: Vec<MessageDescriptor>,
        enums: Vec<EnumDescriptor>,
        message_names: HashMap<String, MessageId>,
        enum_names: HashMap<String, EnumId>,
    ) -> Self {
        Self {
            messages,
            enums,
            message_names,
            enum_names,
        }
    }

    /// The message descriptor behind an id
    pub fn message(&self, id: MessageId) -> &MessageDescriptor {
        &self.messages[id.index()]
    }

    /// The enum descriptor behind an id
    pub fn enum_descriptor(&self, id: EnumId) -> &EnumDescriptor {
        &self.enums[id.index()]
    }

    /// Looks up a message id by type name
    pub fn message_id(&self, name: &str) -> Option<MessageId> {
        self.message_names.get(name).copied()
    }

    /// Looks up an enum id by type name
    pub fn enum_id(&self, name: &str) -> Option<EnumId> {
        self.enum_names.get(name).copied()
    }

    /// Number of resolved message types
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Number of resolved enum types
    pub fn enum_count(&self) -> usize {
        self.enums.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_pool_is_send_sync() {
        assert_send_sync::<DescriptorPool>();
        assert_send_sync::<MessageDescriptor>();
    }

    #[test]
    fn test_field_lookup_by_index() {
        let desc = MessageDescriptor::new(
            "Test".into(),
            MessageKind::Message,
            vec![
                FieldDescriptor {
                    name: "b".into(),
                    index: 5,
                    shape: PropertyShape::Scalar(crate::schema::ScalarKind::Int32),
                    default: DefaultRule::Absent,
                    required: false,
                    oneof: None,
                },
                FieldDescriptor {
                    name: "a".into(),
                    index: 1,
                    shape: PropertyShape::Scalar(crate::schema::ScalarKind::Bool),
                    default: DefaultRule::Absent,
                    required: false,
                    oneof: None,
                },
            ],
            vec![10..=20],
            true,
        );

        assert_eq!(desc.field(1).map(|f| f.name.as_str()), Some("a"));
        assert_eq!(desc.field(5).map(|f| f.name.as_str()), Some("b"));
        assert!(desc.field(2).is_none());
        // Sorted ascending regardless of construction order
        assert_eq!(desc.fields()[0].index, 1);
    }

    #[test]
    fn test_reserved_ranges() {
        let desc = MessageDescriptor::new(
            "Test".into(),
            MessageKind::Message,
            vec![],
            vec![3..=3, 10..=19],
            false,
        );
        assert!(desc.is_reserved(3));
        assert!(desc.is_reserved(15));
        assert!(!desc.is_reserved(4));
    }

    #[test]
    fn test_enum_alias_first_wins() {
        let desc = EnumDescriptor::new(
            "E".into(),
            vec![("A".into(), 0), ("B".into(), 1), ("B_ALIAS".into(), 1)],
        );
        assert_eq!(desc.name_of(1), Some("B"));
        assert!(desc.contains(0));
        assert!(!desc.contains(7));
    }
}
