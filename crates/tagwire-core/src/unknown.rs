//! Unknown-field capture.
//!
//! A wire field whose index has no matching descriptor entry is not an
//! error: it is captured verbatim so that a later re-encode reproduces the
//! original bytes exactly. The captured form is kind-tagged rather than raw
//! bytes so the re-encoder knows how to frame each value without the codec
//! tracking wire kinds out of band.
//!
//! The sink contract is two operations: [`UnknownFieldSet::new`] and
//! [`UnknownFieldSet::insert`]. Everything else here is convenience.

use crate::wire::{tag_len, varint_len, WireType, WireWriter};
use bytes::Bytes;

/// One captured wire-native value, tagged with enough kind information to
/// re-encode it byte-identically
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownValue {
    /// A varint payload, bit pattern preserved
    Varint(u64),
    /// A 32-bit fixed-width payload
    Fixed32(u32),
    /// A 64-bit fixed-width payload
    Fixed64(u64),
    /// A length-delimited payload, bytes preserved uninterpreted
    LengthDelimited(Bytes),
    /// A group: its fields, themselves captured verbatim
    Group(Vec<(u32, UnknownValue)>),
}

impl UnknownValue {
    /// The wire type this value re-encodes with
    pub fn wire_type(&self) -> WireType {
        match self {
            UnknownValue::Varint(_) => WireType::Varint,
            UnknownValue::Fixed32(_) => WireType::Fixed32,
            UnknownValue::Fixed64(_) => WireType::Fixed64,
            UnknownValue::LengthDelimited(_) => WireType::Len,
            UnknownValue::Group(_) => WireType::StartGroup,
        }
    }
}

/// Ordered set of captured unknown fields.
///
/// Insertion order is the order the fields appeared on the wire, and the
/// re-encode walks in that order, so a decode→encode round trip of a message
/// consisting only of unknown fields is byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnknownFieldSet {
    entries: Vec<(u32, UnknownValue)>,
}

impl UnknownFieldSet {
    /// Creates an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures one field, preserving arrival order
    pub fn insert(&mut self, index: u32, value: UnknownValue) {
        self.entries.push((index, value));
    }

    /// Returns true if nothing was captured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of captured fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates captured fields in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &(u32, UnknownValue)> {
        self.entries.iter()
    }

    /// Re-emits every captured field, byte-identical to the source
    pub fn encode(&self, writer: &mut WireWriter<'_>) {
        for (index, value) in &self.entries {
            encode_unknown(writer, *index, value);
        }
    }

    /// Exact byte length [`Self::encode`] would produce
    pub fn encoded_len(&self) -> usize {
        self.entries
            .iter()
            .map(|(index, value)| unknown_len(*index, value))
            .sum()
    }
}

fn encode_unknown(writer: &mut WireWriter<'_>, index: u32, value: &UnknownValue) {
    writer.write_tag(index, value.wire_type());
    match value {
        UnknownValue::Varint(v) => writer.write_varint(*v),
        UnknownValue::Fixed32(v) => writer.write_fixed32(*v),
        UnknownValue::Fixed64(v) => writer.write_fixed64(*v),
        UnknownValue::LengthDelimited(bytes) => writer.write_len_delimited(bytes),
        UnknownValue::Group(fields) => {
            for (nested_index, nested) in fields {
                encode_unknown(writer, *nested_index, nested);
            }
            writer.write_group_end(index);
        }
    }
}

fn unknown_len(index: u32, value: &UnknownValue) -> usize {
    tag_len(index)
        + match value {
            UnknownValue::Varint(v) => varint_len(*v),
            UnknownValue::Fixed32(_) => 4,
            UnknownValue::Fixed64(_) => 8,
            UnknownValue::LengthDelimited(bytes) => varint_len(bytes.len() as u64) + bytes.len(),
            UnknownValue::Group(fields) => {
                fields
                    .iter()
                    .map(|(i, v)| unknown_len(*i, v))
                    .sum::<usize>()
                    + tag_len(index)
            }
        }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order() {
        let mut sink = UnknownFieldSet::new();
        sink.insert(5, UnknownValue::Varint(1));
        sink.insert(3, UnknownValue::Varint(2));
        sink.insert(5, UnknownValue::Varint(3));

        let order: Vec<u32> = sink.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, [5, 3, 5]);
    }

    #[test]
    fn test_encode_matches_encoded_len() {
        let mut sink = UnknownFieldSet::new();
        sink.insert(1, UnknownValue::Varint(300));
        sink.insert(2, UnknownValue::Fixed32(7));
        sink.insert(3, UnknownValue::Fixed64(9));
        sink.insert(4, UnknownValue::LengthDelimited(Bytes::from_static(b"hi")));
        sink.insert(
            6,
            UnknownValue::Group(vec![(1, UnknownValue::Varint(42))]),
        );

        let mut buf = Vec::new();
        sink.encode(&mut WireWriter::new(&mut buf));
        assert_eq!(buf.len(), sink.encoded_len());
    }

    #[test]
    fn test_group_encoding_frames_with_end_tag() {
        let mut sink = UnknownFieldSet::new();
        sink.insert(3, UnknownValue::Group(vec![(1, UnknownValue::Varint(1))]));

        let mut buf = Vec::new();
        sink.encode(&mut WireWriter::new(&mut buf));
        // tag(3, SGROUP) = 0x1B, tag(1, VARINT) = 0x08, value 1, tag(3, EGROUP) = 0x1C
        assert_eq!(buf, [0x1B, 0x08, 0x01, 0x1C]);
    }
}
