//! LEB128-style variable-length integer encoding used by every on-disk header in this crate.
//!
//! Matches `writeVarUInt`/`readVarUInt`/`getLengthOfVarUInt` in the original source: 7 data
//! bits per byte, little-endian group order, continuation bit in the top of each byte.

use crate::error::{IndexError, Result};
use std::io::{Read, Write};

/// Number of bytes `write_varint` would emit for `value`, without writing anything.
pub fn varint_len(value: u64) -> usize {
    let mut value = value;
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Write `value` as a varint to `writer`, returning the number of bytes written.
pub fn write_varint<W: Write>(writer: &mut W, value: u64) -> Result<usize> {
    let mut value = value;
    let mut written = 0;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        writer.write_all(&[byte])?;
        written += 1;
        if value == 0 {
            break;
        }
    }
    Ok(written)
}

/// Read a varint from `reader`.
///
/// Fails with `CorruptedData` if the stream ends before a terminating byte (high bit clear)
/// is seen, or if more than 10 bytes are consumed (which would overflow a `u64`).
pub fn read_varint<R: Read>(reader: &mut R) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        if shift >= 70 {
            return Err(IndexError::CorruptedData(
                "varint is too long to fit in a u64".to_string(),
            ));
        }
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).map_err(|e| {
            IndexError::CorruptedData(format!("truncated varint: {e}"))
        })?;
        let byte = byte[0];
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_small_and_large_values() {
        for value in [0u64, 1, 127, 128, 300, 16384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            let written = write_varint(&mut buf, value).unwrap();
            assert_eq!(written, varint_len(value));
            assert_eq!(buf.len(), written);

            let mut cursor = &buf[..];
            let decoded = read_varint(&mut cursor).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn truncated_varint_is_corrupted_data() {
        let buf = [0x80u8]; // continuation bit set, but no more bytes
        let mut cursor = &buf[..];
        let err = read_varint(&mut cursor).unwrap_err();
        assert!(matches!(err, IndexError::CorruptedData(_)));
    }
}
