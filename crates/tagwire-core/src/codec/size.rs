//! Exact encoded-size computation.
//!
//! Mirrors the encoder byte for byte without producing output. The encoder
//! itself calls into this module for nested length prefixes, so the two
//! passes cannot drift apart.

use crate::error::{Error, Result, ValidationError};
use crate::schema::convert::BuilderBehavior;
use crate::schema::descriptor::{DescriptorPool, MessageDescriptor, MessageId};
use crate::schema::shape::PropertyShape;
use crate::schema::ScalarKind;
use crate::value::{MessageValue, Value};
use crate::wire::{tag_len, varint_len, WireType};

use super::{scalar_fixed32, scalar_fixed64, scalar_payload, scalar_varint};

/// Computes the exact number of bytes `encode` would produce for this value
pub fn encoded_len(pool: &DescriptorPool, id: MessageId, value: &MessageValue) -> Result<usize> {
    message_len(pool, pool.message(id), value)
}

/// Body length of a message (no tag, no length prefix)
pub(crate) fn message_len(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    value: &MessageValue,
) -> Result<usize> {
    let mut total = 0;

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
                // Mirrors the encoder: default-valued optional fields
                // produce no bytes.
                if !field.required && field.default.materialize().as_ref() == Some(v) {
                    continue;
                }
                let ctx = format!("{}.{}", desc.name, field.name);
                total += shape_len(pool, &ctx, field.index, &field.shape, v)?;
            }
        }
    }

    total += value.unknown.encoded_len();
    Ok(total)
}

/// Length of one field occurrence, tag included
pub(crate) fn shape_len(
    pool: &DescriptorPool,
    ctx: &str,
    index: u32,
    shape: &PropertyShape,
    value: &Value,
) -> Result<usize> {
    match shape {
        PropertyShape::Scalar(kind) => scalar_field_len(ctx, index, *kind, value),

        PropertyShape::Enum(_) => match value {
            Value::Enum(n) | Value::I32(n) => {
                Ok(tag_len(index) + varint_len((*n as i64) as u64))
            }
            other => Err(shape_err(ctx, "enum", other)),
        },

        PropertyShape::Message(id) => {
            let Some(msg) = value.as_message() else {
                return Err(shape_err(ctx, "message", value));
            };
            let body = message_len(pool, pool.message(*id), msg)?;
            Ok(tag_len(index) + varint_len(body as u64) + body)
        }

        PropertyShape::Group(id) => {
            let Some(msg) = value.as_message() else {
                return Err(shape_err(ctx, "group", value));
            };
            let body = message_len(pool, pool.message(*id), msg)?;
            // Start and end tags share the index, so their lengths match
            Ok(tag_len(index) * 2 + body)
        }

        PropertyShape::Repeated { element, packed } => {
            let Value::List(items) = value else {
                return Err(shape_err(ctx, "repeated", value));
            };
            if *packed {
                if items.is_empty() {
                    return Ok(0);
                }
                let body = packed_body_len(ctx, element, items)?;
                Ok(tag_len(index) + varint_len(body as u64) + body)
            } else {
                let mut total = 0;
                for item in items {
                    total += shape_len(pool, ctx, index, element, item)?;
                }
                Ok(total)
            }
        }

        PropertyShape::Map { key, value: value_shape } => {
            let Value::Map(entries) = value else {
                return Err(shape_err(ctx, "map", value));
            };
            let mut total = 0;
            for (entry_key, entry_value) in entries {
                let body = scalar_field_len(ctx, 1, *key, &entry_key.to_value())?
                    + shape_len(pool, ctx, 2, value_shape, entry_value)?;
                total += tag_len(index) + varint_len(body as u64) + body;
            }
            Ok(total)
        }

        PropertyShape::Wrapped { inner, converter } => {
            let wire_value = match converter.apply_to_wire(value.clone()) {
                Ok(v) => v,
                Err(_) if converter.behavior() == BuilderBehavior::Nullable => return Ok(0),
                Err(e) => return Err(Error::Convert(e)),
            };
            if wire_value.is_none() {
                return Ok(0);
            }
            shape_len(pool, ctx, index, inner, &wire_value)
        }
    }
}

/// Body length of one packed run (no tag, no length prefix)
pub(crate) fn packed_body_len(
    ctx: &str,
    element: &PropertyShape,
    items: &[Value],
) -> Result<usize> {
    let PropertyShape::Scalar(kind) = element else {
        return Err(shape_err(ctx, "packed scalar", &Value::List(items.to_vec())));
    };
    let mut total = 0;
    for item in items {
        total += scalar_body_len(ctx, *kind, item)?;
    }
    Ok(total)
}

fn scalar_field_len(ctx: &str, index: u32, kind: ScalarKind, value: &Value) -> Result<usize> {
    Ok(tag_len(index) + scalar_body_len(ctx, kind, value)?)
}

/// Length of one scalar payload without its tag
pub(crate) fn scalar_body_len(ctx: &str, kind: ScalarKind, value: &Value) -> Result<usize> {
    Ok(match kind.wire_type() {
        WireType::Varint => varint_len(scalar_varint(ctx, kind, value)?),
        WireType::Fixed32 => {
            scalar_fixed32(ctx, kind, value)?;
            4
        }
        WireType::Fixed64 => {
            scalar_fixed64(ctx, kind, value)?;
            8
        }
        WireType::Len => {
            let payload = scalar_payload(ctx, kind, value)?;
            varint_len(payload.len() as u64) + payload.len()
        }
        WireType::StartGroup | WireType::EndGroup => {
            unreachable!("scalar kinds never use group framing")
        }
    })
}

fn shape_err(ctx: &str, expected: &str, value: &Value) -> Error {
    ValidationError::shape_mismatch(
        ctx,
        format!("{} value for {expected} field", value.kind_name()),
    )
    .into()
}
