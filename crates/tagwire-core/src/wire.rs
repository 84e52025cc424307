//! Low-level protobuf wire format primitives.
//!
//! This module implements the byte-level encoding rules shared by every
//! higher layer: varints, zigzag, fixed-width values, tags, length-delimited
//! framing, and group delimiters.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field index and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3: SGROUP (group start, deprecated but supported)
//! - 4: EGROUP (group end)
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! Varints are LEB128: 7 data bits per byte, high bit set on every byte but
//! the last, least-significant group first, at most 10 bytes for the 64-bit
//! range. Fixed32/64 are raw little-endian bytes. Length-delimited values are
//! a varint byte count followed by exactly that many bytes. Groups have no
//! length prefix; a matching end tag with the same field index closes them.

use crate::error::WireFormatError;

type Result<T> = std::result::Result<T, WireFormatError>;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    Fixed64 = 1,
    /// Length-delimited (strings, bytes, embedded messages, packed runs)
    Len = 2,
    /// Start of a group (legacy delimited aggregate)
    StartGroup = 3,
    /// End of a group
    EndGroup = 4,
    /// 32-bit fixed-width
    Fixed32 = 5,
}

impl WireType {
    /// Decodes a wire type from the low 3 bits of a tag.
    ///
    /// `offset` is only used to report the tag's position on failure.
    pub fn from_code(code: u8, offset: usize) -> Result<Self> {
        match code {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            _ => Err(WireFormatError::InvalidWireType { code, offset }),
        }
    }

    /// Returns the 3-bit wire-kind code
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Maximum valid protobuf field index (2^29 - 1)
pub const MAX_FIELD_INDEX: u32 = 536_870_911;

/// Maximum encoded length of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Maps a signed integer onto an unsigned one so that small magnitudes
/// (positive or negative) produce short varints.
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Exact inverse of [`zigzag_encode`]
#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Returns the encoded byte length of a varint without encoding it
#[inline]
pub fn varint_len(value: u64) -> usize {
    // Each byte carries 7 bits; value 0 still takes one byte.
    ((64 - (value | 1).leading_zeros() as usize) + 6) / 7
}

/// Returns the encoded byte length of a tag for the given field index
#[inline]
pub fn tag_len(index: u32) -> usize {
    varint_len((index as u64) << 3)
}

/// Composes a tag from a field index and wire type
#[inline]
pub fn make_tag(index: u32, wire: WireType) -> u64 {
    ((index as u64) << 3) | wire.code() as u64
}

/// Writes wire-format primitives into a byte buffer.
///
/// The writer appends to a caller-owned `Vec<u8>`; it never fails, because
/// the output is unbounded memory. Validation happens before encoding, at
/// schema-resolution and value-shape checks.
#[derive(Debug)]
pub struct WireWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> WireWriter<'a> {
    /// Creates a writer appending to the given buffer
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    /// Number of bytes written so far (including pre-existing content)
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if the underlying buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes a varint in LEB128 form
    pub fn write_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    /// Writes a field tag
    pub fn write_tag(&mut self, index: u32, wire: WireType) {
        self.write_varint(make_tag(index, wire));
    }

    /// Writes a 32-bit fixed-width value, little-endian
    pub fn write_fixed32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a 64-bit fixed-width value, little-endian
    pub fn write_fixed64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a length-delimited record: varint byte count, then the bytes
    pub fn write_len_delimited(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a group start tag
    pub fn write_group_start(&mut self, index: u32) {
        self.write_tag(index, WireType::StartGroup);
    }

    /// Writes a group end tag with the same index as the start
    pub fn write_group_end(&mut self, index: u32) {
        self.write_tag(index, WireType::EndGroup);
    }

    /// Appends raw bytes with no framing
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

/// Reads wire-format primitives from a byte slice.
///
/// The reader tracks a cursor into the input. Every failure is fatal for the
/// current decode call; the cursor position after an error is unspecified.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader over the given input
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current byte offset into the input
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes remaining to be read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true when the input is fully consumed
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads a varint.
    ///
    /// Fails with `MalformedVarint` if no terminating byte appears within 10
    /// bytes, or `TruncatedStream` if the input ends mid-varint.
    pub fn read_varint(&mut self) -> Result<u64> {
        let start = self.pos;
        let mut result: u64 = 0;
        let mut shift = 0;

        for i in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.data.get(start + i) else {
                return Err(WireFormatError::truncated(
                    start,
                    i + 1,
                    self.data.len() - start,
                ));
            };

            result |= ((byte & 0x7F) as u64) << shift;
            shift += 7;

            if byte & 0x80 == 0 {
                self.pos = start + i + 1;
                return Ok(result);
            }
        }

        Err(WireFormatError::malformed_varint(start))
    }

    /// Reads a 32-bit fixed-width value, little-endian
    pub fn read_fixed32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    /// Reads a 64-bit fixed-width value, little-endian
    pub fn read_fixed64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    /// Reads a field tag.
    ///
    /// Returns `None` when exactly zero bytes remain (clean end of stream).
    /// Fails with `InvalidWireType` on an unknown wire-kind code and
    /// `InvalidFieldIndex` on index 0 or above the protobuf maximum.
    pub fn read_tag(&mut self) -> Result<Option<(u32, WireType)>> {
        if self.is_at_end() {
            return Ok(None);
        }

        let offset = self.pos;
        let tag = self.read_varint()?;
        let wire = WireType::from_code((tag & 0x07) as u8, offset)?;
        let index = (tag >> 3) as u32;

        if index == 0 || index > MAX_FIELD_INDEX {
            return Err(WireFormatError::InvalidFieldIndex {
                index,
                max: MAX_FIELD_INDEX,
            });
        }

        Ok(Some((index, wire)))
    }

    /// Reads a length-delimited record and returns its payload bytes.
    ///
    /// Fails with `NegativeOrOversizedLength` when the declared length
    /// exceeds the remaining input.
    pub fn read_len_delimited(&mut self) -> Result<&'a [u8]> {
        let offset = self.pos;
        let length = self.read_varint()?;

        if length > self.remaining() as u64 {
            return Err(WireFormatError::NegativeOrOversizedLength {
                offset,
                length,
                remaining: self.remaining(),
            });
        }

        self.take(length as usize)
    }

    /// Skips one value of the given wire type.
    ///
    /// For `StartGroup` this skips nested fields until the matching end tag,
    /// failing with `UnmatchedGroupEnd`/`UnterminatedGroup` on malformed
    /// group framing. An `EndGroup` passed directly is a framing error at
    /// this level and is reported as unmatched.
    pub fn skip_value(&mut self, index: u32, wire: WireType) -> Result<()> {
        match wire {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.take(8)?;
            }
            WireType::Len => {
                self.read_len_delimited()?;
            }
            WireType::StartGroup => {
                self.skip_group(index)?;
            }
            WireType::EndGroup => {
                return Err(WireFormatError::UnmatchedGroupEnd {
                    expected: 0,
                    found: index,
                });
            }
            WireType::Fixed32 => {
                self.take(4)?;
            }
        }
        Ok(())
    }

    /// Skips fields until the end tag matching `index` is consumed
    fn skip_group(&mut self, index: u32) -> Result<()> {
        loop {
            let Some((field_index, wire)) = self.read_tag()? else {
                return Err(WireFormatError::UnterminatedGroup { index });
            };

            if wire == WireType::EndGroup {
                if field_index == index {
                    return Ok(());
                }
                return Err(WireFormatError::UnmatchedGroupEnd {
                    expected: index,
                    found: field_index,
                });
            }

            self.skip_value(field_index, wire)?;
        }
    }

    /// Consumes exactly `n` bytes, failing with `TruncatedStream` otherwise
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(WireFormatError::truncated(self.pos, n, self.remaining()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_varint(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        WireWriter::new(&mut buf).write_varint(value);
        buf
    }

    #[test]
    fn test_varint_single_byte() {
        assert_eq!(encode_varint(0), [0x00]);
        assert_eq!(encode_varint(8), [0x08]);
        assert_eq!(encode_varint(127), [0x7F]);
    }

    #[test]
    fn test_varint_multi_byte() {
        assert_eq!(encode_varint(128), [0x80, 0x01]);
        assert_eq!(encode_varint(300), [0xAC, 0x02]);
    }

    #[test]
    fn test_varint_max() {
        let buf = encode_varint(u64::MAX);
        assert_eq!(
            buf,
            [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
        );
        let mut reader = WireReader::new(&buf);
        assert_eq!(reader.read_varint().unwrap(), u64::MAX);
    }

    #[test]
    fn test_varint_roundtrip_boundaries() {
        for value in [0, 1, 127, 128, 300, (1u64 << 63) - 1, u64::MAX] {
            let buf = encode_varint(value);
            let mut reader = WireReader::new(&buf);
            assert_eq!(reader.read_varint().unwrap(), value);
            assert_eq!(reader.position(), buf.len());
            assert_eq!(varint_len(value), buf.len());
        }
    }

    #[test]
    fn test_varint_overlong_rejected() {
        // 11 bytes, every one with the continuation bit set
        let data = [0x80u8; 11];
        let mut reader = WireReader::new(&data);
        assert!(matches!(
            reader.read_varint(),
            Err(WireFormatError::MalformedVarint { offset: 0 })
        ));
    }

    #[test]
    fn test_varint_truncated() {
        let data = [0x80, 0x80];
        let mut reader = WireReader::new(&data);
        assert!(matches!(
            reader.read_varint(),
            Err(WireFormatError::TruncatedStream { .. })
        ));
    }

    #[test]
    fn test_zigzag_known_values() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(2), 4);
    }

    #[test]
    fn test_zigzag_roundtrip() {
        for value in [0, 1, -1, 2, -2, i64::MAX, i64::MIN, 123_456, -123_456] {
            assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }
    }

    #[test]
    fn test_wire_type_conversion() {
        assert_eq!(WireType::from_code(0, 0).unwrap(), WireType::Varint);
        assert_eq!(WireType::from_code(1, 0).unwrap(), WireType::Fixed64);
        assert_eq!(WireType::from_code(2, 0).unwrap(), WireType::Len);
        assert_eq!(WireType::from_code(3, 0).unwrap(), WireType::StartGroup);
        assert_eq!(WireType::from_code(4, 0).unwrap(), WireType::EndGroup);
        assert_eq!(WireType::from_code(5, 0).unwrap(), WireType::Fixed32);
        assert!(WireType::from_code(6, 0).is_err());
        assert!(WireType::from_code(7, 0).is_err());
    }

    #[test]
    fn test_tag_roundtrip() {
        let mut buf = Vec::new();
        WireWriter::new(&mut buf).write_tag(1, WireType::Len);
        assert_eq!(buf, [0x0A]);

        let mut reader = WireReader::new(&buf);
        assert_eq!(reader.read_tag().unwrap(), Some((1, WireType::Len)));
        assert_eq!(reader.read_tag().unwrap(), None);
    }

    #[test]
    fn test_tag_index_zero_rejected() {
        let data = [0x00];
        let mut reader = WireReader::new(&data);
        assert!(matches!(
            reader.read_tag(),
            Err(WireFormatError::InvalidFieldIndex { index: 0, .. })
        ));
    }

    #[test]
    fn test_fixed_width_roundtrip() {
        let mut buf = Vec::new();
        {
            let mut writer = WireWriter::new(&mut buf);
            writer.write_fixed32(0xDEAD_BEEF);
            writer.write_fixed64(0x0123_4567_89AB_CDEF);
        }
        assert_eq!(&buf[..4], [0xEF, 0xBE, 0xAD, 0xDE]);

        let mut reader = WireReader::new(&buf);
        assert_eq!(reader.read_fixed32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_fixed64().unwrap(), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn test_fixed_width_truncated() {
        let data = [0x01, 0x02];
        assert!(matches!(
            WireReader::new(&data).read_fixed32(),
            Err(WireFormatError::TruncatedStream { .. })
        ));
        assert!(matches!(
            WireReader::new(&data).read_fixed64(),
            Err(WireFormatError::TruncatedStream { .. })
        ));
    }

    #[test]
    fn test_len_delimited_roundtrip() {
        let mut buf = Vec::new();
        WireWriter::new(&mut buf).write_len_delimited(b"hello");
        assert_eq!(buf, [0x05, b'h', b'e', b'l', b'l', b'o']);

        let mut reader = WireReader::new(&buf);
        assert_eq!(reader.read_len_delimited().unwrap(), b"hello");
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_len_delimited_oversized() {
        // Declares 100 bytes, provides 3
        let data = [0x64, 0x01, 0x02, 0x03];
        let mut reader = WireReader::new(&data);
        assert!(matches!(
            reader.read_len_delimited(),
            Err(WireFormatError::NegativeOrOversizedLength { length: 100, .. })
        ));
    }

    #[test]
    fn test_skip_group() {
        let mut buf = Vec::new();
        {
            let mut writer = WireWriter::new(&mut buf);
            writer.write_group_start(3);
            writer.write_tag(1, WireType::Varint);
            writer.write_varint(42);
            writer.write_group_end(3);
        }

        let mut reader = WireReader::new(&buf);
        let (index, wire) = reader.read_tag().unwrap().unwrap();
        assert_eq!((index, wire), (3, WireType::StartGroup));
        reader.skip_value(index, wire).unwrap();
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_skip_group_mismatched_end() {
        let mut buf = Vec::new();
        {
            let mut writer = WireWriter::new(&mut buf);
            writer.write_group_start(3);
            writer.write_group_end(4);
        }

        let mut reader = WireReader::new(&buf);
        let (index, wire) = reader.read_tag().unwrap().unwrap();
        assert!(matches!(
            reader.skip_value(index, wire),
            Err(WireFormatError::UnmatchedGroupEnd {
                expected: 3,
                found: 4
            })
        ));
    }

    #[test]
    fn test_varint_len() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(300), 2);
        assert_eq!(varint_len(u64::MAX), 10);
    }
}
