//! The runtime codec: encode, decode, and size against resolved descriptors.
//!
//! All three operations dispatch exhaustively over the resolved
//! [`PropertyShape`](crate::schema::shape::PropertyShape) of each field.
//! Nothing here re-derives strategy at call time: every decision about how
//! a field is framed was made once, by the resolver.
//!
//! Operations are synchronous, single-pass, and stateless aside from the
//! buffer they read or write. Two concurrent calls against independent
//! buffers never interfere.

mod decode;
mod encode;
mod size;

pub use decode::decode;
pub use encode::encode;
pub use size::encoded_len;

use crate::error::ValidationError;
use crate::schema::ScalarKind;
use crate::value::Value;
use crate::wire::zigzag_encode;

type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Maps a scalar value of a varint-wire kind to its varint bit pattern.
///
/// Negative `int32`/`int64` values sign-extend to the full 64-bit range,
/// matching the canonical protobuf encoding; `sint` kinds zigzag instead.
pub(crate) fn scalar_varint(ctx: &str, kind: ScalarKind, value: &Value) -> ValidationResult<u64> {
    match (kind, value) {
        (ScalarKind::Int32, Value::I32(n)) => Ok((*n as i64) as u64),
        (ScalarKind::Int64, Value::I64(n)) => Ok(*n as u64),
        (ScalarKind::Uint32, Value::U32(n)) => Ok(*n as u64),
        (ScalarKind::Uint64, Value::U64(n)) => Ok(*n),
        (ScalarKind::Sint32, Value::I32(n)) => Ok(zigzag_encode(*n as i64)),
        (ScalarKind::Sint64, Value::I64(n)) => Ok(zigzag_encode(*n)),
        (ScalarKind::Bool, Value::Bool(b)) => Ok(*b as u64),
        _ => Err(mismatch(ctx, kind, value)),
    }
}

/// Maps a scalar value of a fixed32-wire kind to its 4-byte bit pattern
pub(crate) fn scalar_fixed32(ctx: &str, kind: ScalarKind, value: &Value) -> ValidationResult<u32> {
    match (kind, value) {
        (ScalarKind::Fixed32, Value::U32(n)) => Ok(*n),
        (ScalarKind::Sfixed32, Value::I32(n)) => Ok(*n as u32),
        (ScalarKind::Float, Value::F32(f)) => Ok(f.to_bits()),
        _ => Err(mismatch(ctx, kind, value)),
    }
}

/// Maps a scalar value of a fixed64-wire kind to its 8-byte bit pattern
pub(crate) fn scalar_fixed64(ctx: &str, kind: ScalarKind, value: &Value) -> ValidationResult<u64> {
    match (kind, value) {
        (ScalarKind::Fixed64, Value::U64(n)) => Ok(*n),
        (ScalarKind::Sfixed64, Value::I64(n)) => Ok(*n as u64),
        (ScalarKind::Double, Value::F64(f)) => Ok(f.to_bits()),
        _ => Err(mismatch(ctx, kind, value)),
    }
}

/// Borrows the payload of a length-delimited scalar (string or bytes)
pub(crate) fn scalar_payload<'v>(
    ctx: &str,
    kind: ScalarKind,
    value: &'v Value,
) -> ValidationResult<&'v [u8]> {
    match (kind, value) {
        (ScalarKind::String, Value::String(s)) => Ok(s.as_bytes()),
        (ScalarKind::Bytes, Value::Bytes(b)) => Ok(b),
        _ => Err(mismatch(ctx, kind, value)),
    }
}

fn mismatch(ctx: &str, kind: ScalarKind, value: &Value) -> ValidationError {
    ValidationError::shape_mismatch(
        ctx,
        format!("{} value for {} field", value.kind_name(), kind.as_str()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_sign_extends() {
        // -1 as int32 occupies the full 10-byte varint range
        assert_eq!(
            scalar_varint("t", ScalarKind::Int32, &Value::I32(-1)).unwrap(),
            u64::MAX
        );
    }

    #[test]
    fn test_sint_zigzags() {
        assert_eq!(
            scalar_varint("t", ScalarKind::Sint32, &Value::I32(-2)).unwrap(),
            3
        );
        assert_eq!(
            scalar_varint("t", ScalarKind::Sint64, &Value::I64(0)).unwrap(),
            0
        );
    }

    #[test]
    fn test_variant_mismatch_rejected() {
        assert!(scalar_varint("t", ScalarKind::Int32, &Value::Bool(true)).is_err());
        assert!(scalar_fixed32("t", ScalarKind::Float, &Value::F64(1.0)).is_err());
        assert!(scalar_payload("t", ScalarKind::String, &Value::I32(1)).is_err());
    }
}
