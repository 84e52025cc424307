//! The encoder.
//!
//! Walks a descriptor's fields in ascending index order and emits each
//! populated one. Absent optional fields produce no bytes, and so do fields
//! whose value matches their default rule, which keeps a decode followed by
//! an encode byte-identical. Absent required fields abort with
//! `MissingRequiredField` before anything else happens, because the size
//! pass runs up front for nested length prefixes.
//!
//! Oneof arms get no special handling: every populated arm is emitted, in
//! index order like any other field.

use crate::error::{Error, Result, ValidationError};
use crate::schema::convert::BuilderBehavior;
use crate::schema::descriptor::{DescriptorPool, MessageDescriptor, MessageId};
use crate::schema::shape::PropertyShape;
use crate::schema::ScalarKind;
use crate::value::{MessageValue, Value};
use crate::wire::{WireType, WireWriter};
use tracing::trace;

use super::size;
use super::{scalar_fixed32, scalar_fixed64, scalar_payload, scalar_varint};

/// Encodes a message value against its descriptor, appending to `buf`
pub fn encode(
    pool: &DescriptorPool,
    id: MessageId,
    value: &MessageValue,
    buf: &mut Vec<u8>,
) -> Result<()> {
    let desc = pool.message(id);
    trace!(message = %desc.name, "encoding message");
    let mut writer = WireWriter::new(buf);
    encode_fields(pool, desc, value, &mut writer)
}

fn encode_fields(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    value: &MessageValue,
    writer: &mut WireWriter<'_>,
) -> Result<()> {
    for field in desc.fields() {
        match value.get(field.index) {
            None | Some(Value::None) => {
                if field.required {
                    return Err(ValidationError::MissingRequiredField {
                        message: desc.name.clone(),
                        field: field.name.clone(),
                        index: field.index,
                    }
                    .into());
                }
            }
            Some(v) => {
                // Decode materializes defaults for absent fields; emitting
                // them back would add bytes the source never carried.
                if !field.required && field.default.materialize().as_ref() == Some(v) {
                    continue;
                }
                let ctx = format!("{}.{}", desc.name, field.name);
                encode_shape(pool, &ctx, field.index, &field.shape, v, writer)?;
            }
        }
    }

    // Captured unknown fields re-emit byte-identical to the source
    value.unknown.encode(writer);
    Ok(())
}

fn encode_shape(
    pool: &DescriptorPool,
    ctx: &str,
    index: u32,
    shape: &PropertyShape,
    value: &Value,
    writer: &mut WireWriter<'_>,
) -> Result<()> {
    match shape {
        PropertyShape::Scalar(kind) => encode_scalar(ctx, index, *kind, value, writer),

        PropertyShape::Enum(_) => match value {
            Value::Enum(n) | Value::I32(n) => {
                writer.write_tag(index, WireType::Varint);
                writer.write_varint((*n as i64) as u64);
                Ok(())
            }
            other => Err(shape_err(ctx, "enum", other)),
        },

        PropertyShape::Message(id) => {
            let Some(msg) = value.as_message() else {
                return Err(shape_err(ctx, "message", value));
            };
            let nested = pool.message(*id);
            let body = size::message_len(pool, nested, msg)?;
            writer.write_tag(index, WireType::Len);
            writer.write_varint(body as u64);
            encode_fields(pool, nested, msg, writer)
        }

        PropertyShape::Group(id) => {
            let Some(msg) = value.as_message() else {
                return Err(shape_err(ctx, "group", value));
            };
            writer.write_group_start(index);
            encode_fields(pool, pool.message(*id), msg, writer)?;
            writer.write_group_end(index);
            Ok(())
        }

        PropertyShape::Repeated { element, packed } => {
            let Value::List(items) = value else {
                return Err(shape_err(ctx, "repeated", value));
            };
            if *packed {
                // One length-delimited run, no per-element tags
                if items.is_empty() {
                    return Ok(());
                }
                let PropertyShape::Scalar(kind) = element.as_ref() else {
                    return Err(shape_err(ctx, "packed scalar", value));
                };
                let body = size::packed_body_len(ctx, element, items)?;
                writer.write_tag(index, WireType::Len);
                writer.write_varint(body as u64);
                for item in items {
                    encode_scalar_body(ctx, *kind, item, writer)?;
                }
            } else {
                for item in items {
                    encode_shape(pool, ctx, index, element, item, writer)?;
                }
            }
            Ok(())
        }

        PropertyShape::Map { key, value: value_shape } => {
            let Value::Map(entries) = value else {
                return Err(shape_err(ctx, "map", value));
            };
            // Each entry is an embedded message: key at 1, value at 2
            for (entry_key, entry_value) in entries {
                let key_value = entry_key.to_value();
                let body = size::shape_len(pool, ctx, 1, &PropertyShape::Scalar(*key), &key_value)?
                    + size::shape_len(pool, ctx, 2, value_shape, entry_value)?;
                writer.write_tag(index, WireType::Len);
                writer.write_varint(body as u64);
                encode_scalar(ctx, 1, *key, &key_value, writer)?;
                encode_shape(pool, ctx, 2, value_shape, entry_value, writer)?;
            }
            Ok(())
        }

        PropertyShape::Wrapped { inner, converter } => {
            let wire_value = match converter.apply_to_wire(value.clone()) {
                Ok(v) => v,
                Err(_) if converter.behavior() == BuilderBehavior::Nullable => return Ok(()),
                Err(e) => return Err(Error::Convert(e)),
            };
            if wire_value.is_none() {
                return Ok(());
            }
            encode_shape(pool, ctx, index, inner, &wire_value, writer)
        }
    }
}

fn encode_scalar(
    ctx: &str,
    index: u32,
    kind: ScalarKind,
    value: &Value,
    writer: &mut WireWriter<'_>,
) -> Result<()> {
    writer.write_tag(index, kind.wire_type());
    encode_scalar_body(ctx, kind, value, writer)
}

/// Emits a scalar payload with no tag (shared with packed runs)
fn encode_scalar_body(
    ctx: &str,
    kind: ScalarKind,
    value: &Value,
    writer: &mut WireWriter<'_>,
) -> Result<()> {
    match kind.wire_type() {
        WireType::Varint => writer.write_varint(scalar_varint(ctx, kind, value)?),
        WireType::Fixed32 => writer.write_fixed32(scalar_fixed32(ctx, kind, value)?),
        WireType::Fixed64 => writer.write_fixed64(scalar_fixed64(ctx, kind, value)?),
        WireType::Len => writer.write_len_delimited(scalar_payload(ctx, kind, value)?),
        WireType::StartGroup | WireType::EndGroup => {
            unreachable!("scalar kinds never use group framing")
        }
    }
    Ok(())
}

fn shape_err(ctx: &str, expected: &str, value: &Value) -> Error {
    ValidationError::shape_mismatch(
        ctx,
        format!("{} value for {expected} field", value.kind_name()),
    )
    .into()
}
