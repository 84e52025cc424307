//! The decoder.
//!
//! A single forward pass over the input. Each tag is dispatched against the
//! descriptor: known indexes decode by their resolved shape, unknown
//! indexes are captured into the message's sink (or skipped when the
//! message declares none). Any structural error aborts the whole call with
//! no partial value.
//!
//! Repeated numeric fields accept the packed and the individually-tagged
//! encoding intermixed, merged into one logical sequence. Non-repeated
//! fields seen more than once keep the last occurrence, which is also what
//! gives oneof arms their last-write-wins behavior. A known field arriving
//! with the wrong wire type is treated as unknown, not as an error.

use crate::error::{Error, Result, ValidationError, WireFormatError};
use crate::schema::convert::{BuilderBehavior, ConverterSpec};
use crate::schema::descriptor::{
    DescriptorPool, FieldDescriptor, MessageDescriptor, MessageId,
};
use crate::schema::shape::PropertyShape;
use crate::schema::ScalarKind;
use crate::unknown::UnknownValue;
use crate::value::{MapKey, MessageValue, Value};
use crate::wire::{zigzag_decode, WireReader, WireType};
use bytes::Bytes;
use tracing::trace;

/// Decodes one message value from the full input
pub fn decode(pool: &DescriptorPool, id: MessageId, data: &[u8]) -> Result<MessageValue> {
    let desc = pool.message(id);
    trace!(message = %desc.name, bytes = data.len(), "decoding message");
    let mut reader = WireReader::new(data);
    decode_fields(pool, desc, &mut reader, None)
}

/// Decodes fields until end of input, or until the end tag of the group
/// whose index is `group_index`
fn decode_fields(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    reader: &mut WireReader<'_>,
    group_index: Option<u32>,
) -> Result<MessageValue> {
    let mut msg = MessageValue::new();

    loop {
        let Some((index, wire)) = reader.read_tag()? else {
            if let Some(open) = group_index {
                return Err(WireFormatError::UnterminatedGroup { index: open }.into());
            }
            break;
        };

        if wire == WireType::EndGroup {
            match group_index {
                Some(open) if open == index => break,
                Some(open) => {
                    return Err(WireFormatError::UnmatchedGroupEnd {
                        expected: open,
                        found: index,
                    }
                    .into())
                }
                None => {
                    return Err(WireFormatError::UnmatchedGroupEnd {
                        expected: 0,
                        found: index,
                    }
                    .into())
                }
            }
        }

        match desc.field(index) {
            Some(field) => {
                let ctx = format!("{}.{}", desc.name, field.name);
                decode_field(pool, desc, &ctx, field, index, wire, reader, &mut msg)?;
            }
            None => capture_or_skip(desc, index, wire, reader, &mut msg)?,
        }
    }

    // Collection-wrapper converters run once every occurrence has been
    // merged in; absent fields then materialize their default rule
    for field in desc.fields() {
        finish_collection_field(field, &mut msg)?;
        if !msg.fields.contains_key(&field.index) {
            if let Some(default) = field.default.materialize() {
                msg.fields.insert(field.index, default);
            }
        }
    }

    Ok(msg)
}

/// Converter layers wrapped around a collection shape, outermost first,
/// together with the collection shape they enclose.
///
/// Collection occurrences accumulate across the whole message, so their
/// from-wire converters can only run once the field is fully assembled;
/// single-value wrappers convert inline in `decode_single` instead. A
/// wrapper chain that does not bottom out in a collection is returned
/// unpeeled.
fn collection_wrappers(shape: &PropertyShape) -> (Vec<&ConverterSpec>, &PropertyShape) {
    let mut wrappers = Vec::new();
    let mut current = shape;
    while let PropertyShape::Wrapped { inner, converter } = current {
        wrappers.push(converter);
        current = inner;
    }
    if matches!(
        current,
        PropertyShape::Repeated { .. } | PropertyShape::Map { .. }
    ) {
        (wrappers, current)
    } else {
        (Vec::new(), shape)
    }
}

/// Applies a field's collection-wrapper converters to the raw collection
/// gathered during the pass
fn finish_collection_field(field: &FieldDescriptor, msg: &mut MessageValue) -> Result<()> {
    let (wrappers, _) = collection_wrappers(&field.shape);
    if wrappers.is_empty() {
        return Ok(());
    }
    let Some(raw) = msg.fields.remove(&field.index) else {
        return Ok(());
    };

    // The encoder applies to-wire converters outermost first, so the
    // from-wire direction composes in reverse
    let mut value = raw;
    for converter in wrappers.iter().rev() {
        value = match converter.apply_from_wire(value) {
            Ok(v) => v,
            Err(_) if converter.behavior() == BuilderBehavior::Nullable => Value::None,
            Err(e) => return Err(Error::Convert(e)),
        };
    }
    if !value.is_none() {
        msg.fields.insert(field.index, value);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn decode_field(
    pool: &DescriptorPool,
    desc: &MessageDescriptor,
    ctx: &str,
    field: &FieldDescriptor,
    index: u32,
    wire: WireType,
    reader: &mut WireReader<'_>,
    msg: &mut MessageValue,
) -> Result<()> {
    // A converter wrapped around a collection accumulates raw occurrences
    // here; `finish_collection_field` converts the assembled value later
    let (_, effective) = collection_wrappers(&field.shape);
    match effective {
        PropertyShape::Repeated { element, .. } => {
            let elem_wire = element.natural_wire();
            if wire == elem_wire {
                let item = decode_single(pool, ctx, element, index, reader)?;
                repeated_slot(msg, index).push(item);
            } else if wire == WireType::Len && element.is_numeric_scalar() {
                // Packed run: concatenated values, no per-element tags
                let PropertyShape::Scalar(kind) = element.as_ref() else {
                    unreachable!("numeric scalar check guarantees a scalar element");
                };
                let payload = reader.read_len_delimited()?;
                let mut sub = WireReader::new(payload);
                let list = repeated_slot(msg, index);
                while !sub.is_at_end() {
                    list.push(decode_scalar(*kind, &mut sub)?);
                }
            } else {
                return mismatched_wire(desc.captures_unknown(), index, wire, reader, msg);
            }
            Ok(())
        }

        PropertyShape::Map { key, value: value_shape } => {
            if wire != WireType::Len {
                return mismatched_wire(desc.captures_unknown(), index, wire, reader, msg);
            }
            let payload = reader.read_len_delimited()?;
            let (entry_key, entry_value) = decode_map_entry(pool, ctx, *key, value_shape, payload)?;
            match msg
                .fields
                .entry(index)
                .or_insert_with(|| Value::Map(Default::default()))
            {
                Value::Map(entries) => {
                    // Duplicate keys keep the last entry read
                    entries.insert(entry_key, entry_value);
                }
                other => {
                    return Err(ValidationError::shape_mismatch(
                        ctx,
                        format!("map field already holds {}", other.kind_name()),
                    )
                    .into())
                }
            }
            Ok(())
        }

        shape => {
            if wire != shape.natural_wire() {
                return mismatched_wire(desc.captures_unknown(), index, wire, reader, msg);
            }
            let value = decode_single(pool, ctx, shape, index, reader)?;
            if value.is_none() {
                // A nullable converter substituted absence; apply the rule
                if let Some(default) = field.default.materialize() {
                    msg.fields.insert(index, default);
                }
            } else {
                // Last write wins for repeated occurrences and oneof arms
                msg.fields.insert(index, value);
            }
            Ok(())
        }
    }
}

/// A known field with the wrong wire type decodes as if unknown
fn mismatched_wire(
    captures: bool,
    index: u32,
    wire: WireType,
    reader: &mut WireReader<'_>,
    msg: &mut MessageValue,
) -> Result<()> {
    trace!(index, ?wire, "field arrived with unexpected wire type");
    if captures {
        let value = read_unknown(reader, index, wire)?;
        msg.unknown.insert(index, value);
    } else {
        reader.skip_value(index, wire)?;
    }
    Ok(())
}

fn capture_or_skip(
    desc: &MessageDescriptor,
    index: u32,
    wire: WireType,
    reader: &mut WireReader<'_>,
    msg: &mut MessageValue,
) -> Result<()> {
    if desc.captures_unknown() {
        trace!(message = %desc.name, index, ?wire, "capturing unknown field");
        let value = read_unknown(reader, index, wire)?;
        msg.unknown.insert(index, value);
    } else {
        trace!(message = %desc.name, index, ?wire, "skipping unknown field");
        reader.skip_value(index, wire)?;
    }
    Ok(())
}

/// Reads one wire value verbatim into its kind-tagged captured form
fn read_unknown(
    reader: &mut WireReader<'_>,
    index: u32,
    wire: WireType,
) -> Result<UnknownValue> {
    Ok(match wire {
        WireType::Varint => UnknownValue::Varint(reader.read_varint()?),
        WireType::Fixed32 => UnknownValue::Fixed32(reader.read_fixed32()?),
        WireType::Fixed64 => UnknownValue::Fixed64(reader.read_fixed64()?),
        WireType::Len => {
            UnknownValue::LengthDelimited(Bytes::copy_from_slice(reader.read_len_delimited()?))
        }
        WireType::StartGroup => {
            let mut fields = Vec::new();
            loop {
                let Some((nested_index, nested_wire)) = reader.read_tag()? else {
                    return Err(WireFormatError::UnterminatedGroup { index }.into());
                };
                if nested_wire == WireType::EndGroup {
                    if nested_index == index {
                        break;
                    }
                    return Err(WireFormatError::UnmatchedGroupEnd {
                        expected: index,
                        found: nested_index,
                    }
                    .into());
                }
                fields.push((nested_index, read_unknown(reader, nested_index, nested_wire)?));
            }
            UnknownValue::Group(fields)
        }
        WireType::EndGroup => {
            return Err(WireFormatError::UnmatchedGroupEnd {
                expected: 0,
                found: index,
            }
            .into())
        }
    })
}

/// Decodes one value of the given shape; the tag has already been consumed
fn decode_single(
    pool: &DescriptorPool,
    ctx: &str,
    shape: &PropertyShape,
    index: u32,
    reader: &mut WireReader<'_>,
) -> Result<Value> {
    match shape {
        PropertyShape::Scalar(kind) => decode_scalar(*kind, reader),

        PropertyShape::Enum(_) => {
            let raw = reader.read_varint()?;
            Ok(Value::Enum((raw as i64) as i32))
        }

        PropertyShape::Message(id) => {
            let payload = reader.read_len_delimited()?;
            let mut sub = WireReader::new(payload);
            let msg = decode_fields(pool, pool.message(*id), &mut sub, None)?;
            Ok(msg.into())
        }

        PropertyShape::Group(id) => {
            let msg = decode_fields(pool, pool.message(*id), reader, Some(index))?;
            Ok(msg.into())
        }

        PropertyShape::Wrapped { inner, converter } => {
            let raw = decode_single(pool, ctx, inner, index, reader)?;
            match converter.apply_from_wire(raw) {
                Ok(value) => Ok(value),
                Err(_) if converter.behavior() == BuilderBehavior::Nullable => Ok(Value::None),
                Err(e) => Err(Error::Convert(e)),
            }
        }

        PropertyShape::Repeated { .. } | PropertyShape::Map { .. } => Err(
            ValidationError::shape_mismatch(ctx, "collection nested inside a single value").into(),
        ),
    }
}

fn decode_scalar(kind: ScalarKind, reader: &mut WireReader<'_>) -> Result<Value> {
    Ok(match kind {
        ScalarKind::Int32 => Value::I32((reader.read_varint()? as i64) as i32),
        ScalarKind::Int64 => Value::I64(reader.read_varint()? as i64),
        ScalarKind::Uint32 => Value::U32(reader.read_varint()? as u32),
        ScalarKind::Uint64 => Value::U64(reader.read_varint()?),
        ScalarKind::Sint32 => Value::I32(zigzag_decode(reader.read_varint()?) as i32),
        ScalarKind::Sint64 => Value::I64(zigzag_decode(reader.read_varint()?)),
        ScalarKind::Bool => Value::Bool(reader.read_varint()? != 0),
        ScalarKind::Fixed32 => Value::U32(reader.read_fixed32()?),
        ScalarKind::Fixed64 => Value::U64(reader.read_fixed64()?),
        ScalarKind::Sfixed32 => Value::I32(reader.read_fixed32()? as i32),
        ScalarKind::Sfixed64 => Value::I64(reader.read_fixed64()? as i64),
        ScalarKind::Float => Value::F32(f32::from_bits(reader.read_fixed32()?)),
        ScalarKind::Double => Value::F64(f64::from_bits(reader.read_fixed64()?)),
        ScalarKind::String => {
            let offset = reader.position();
            let payload = reader.read_len_delimited()?;
            let text = std::str::from_utf8(payload)
                .map_err(|_| WireFormatError::InvalidUtf8 { offset })?;
            Value::String(text.to_string())
        }
        ScalarKind::Bytes => Value::Bytes(Bytes::copy_from_slice(reader.read_len_delimited()?)),
    })
}

fn decode_map_entry(
    pool: &DescriptorPool,
    ctx: &str,
    key_kind: ScalarKind,
    value_shape: &PropertyShape,
    payload: &[u8],
) -> Result<(MapKey, Value)> {
    let mut sub = WireReader::new(payload);
    let mut key = key_kind.zero();
    let mut value = default_for_shape(value_shape);

    loop {
        let Some((index, wire)) = sub.read_tag()? else {
            break;
        };
        match index {
            1 if wire == key_kind.wire_type() => {
                key = decode_scalar(key_kind, &mut sub)?;
            }
            2 if wire == value_shape.natural_wire() => {
                value = decode_single(pool, ctx, value_shape, 2, &mut sub)?;
            }
            _ => sub.skip_value(index, wire)?,
        }
    }

    let key = MapKey::from_value(key).expect("map key kinds always decode to key values");
    Ok((key, value))
}

/// The value a map entry materializes when the wire omits its field
fn default_for_shape(shape: &PropertyShape) -> Value {
    match shape {
        PropertyShape::Scalar(kind) => kind.zero(),
        PropertyShape::Enum(_) => Value::Enum(0),
        PropertyShape::Message(_) | PropertyShape::Group(_) => MessageValue::new().into(),
        PropertyShape::Repeated { .. } => Value::List(Vec::new()),
        PropertyShape::Map { .. } => Value::Map(Default::default()),
        PropertyShape::Wrapped { .. } => Value::None,
    }
}

fn repeated_slot(msg: &mut MessageValue, index: u32) -> &mut Vec<Value> {
    match msg
        .fields
        .entry(index)
        .or_insert_with(|| Value::List(Vec::new()))
    {
        Value::List(list) => list,
        other => {
            // A default rule cannot have run yet mid-decode, so the slot is
            // either a list from an earlier occurrence or freshly inserted.
            *other = Value::List(Vec::new());
            match other {
                Value::List(list) => list,
                _ => unreachable!(),
            }
        }
    }
}
