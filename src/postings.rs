//! Encoding and decoding of a single token's postings list.
//!
//! A postings list is a set of row-ids. [`PostingsBuilder`] accumulates row-ids during
//! ingestion; [`encode`](PostingsBuilder::encode) chooses one of three physical
//! representations by cardinality and serializes it; [`decode`] reverses the process.
//!
//! ```text
//! cardinality < ARRAY_THRESHOLD:                    array of varints
//! ARRAY_THRESHOLD <= cardinality < COMPRESS_THRESHOLD: raw roaring bitmap
//! cardinality >= COMPRESS_THRESHOLD:                  ZSTD(roaring bitmap)
//! ```

use crate::error::{IndexError, Result};
use crate::storage::CompressionCodec;
use crate::varint::{read_varint, write_varint};
use roaring::RoaringBitmap;
use std::io::{Read, Write};

/// Cardinality below which a postings list is stored as a plain array of row-ids.
pub const ARRAY_THRESHOLD: u64 = 16;

/// Cardinality at or above which a roaring-encoded postings list is ZSTD-compressed.
pub const COMPRESS_THRESHOLD: u64 = 8192;

const ARRAY_CONTAINER_MASK: u64 = 1;
const ROARING_COMPRESSED_MASK: u64 = 1;

/// Accumulates row-ids for one token within the current segment.
///
/// Insertion is idempotent (inserting the same row-id twice has no effect) and does not
/// require ascending order.
#[derive(Debug, Clone, Default)]
pub struct PostingsBuilder {
    rowids: RoaringBitmap,
}

impl PostingsBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row-id. Idempotent.
    pub fn add(&mut self, rowid: u32) {
        self.rowids.insert(rowid);
    }

    /// Test whether `rowid` has been added.
    pub fn contains(&self, rowid: u32) -> bool {
        self.rowids.contains(rowid)
    }

    /// Number of distinct row-ids accumulated so far.
    pub fn cardinality(&self) -> u64 {
        self.rowids.len()
    }

    /// `true` if no row-ids have been added.
    pub fn is_empty(&self) -> bool {
        self.rowids.is_empty()
    }

    /// Run-length-optimize, choose an encoding by cardinality, and write
    /// `header [+ compressed_size] + payload` to `writer`.
    ///
    /// Returns the exact number of bytes appended. Fails with [`IndexError::LogicalError`] if
    /// called on an empty builder: a cardinality-0 postings list must never be serialized,
    /// and callers are expected to skip empty postings lists entirely rather than rely on
    /// this check.
    pub fn encode<W: Write, C: CompressionCodec>(
        &mut self,
        writer: &mut W,
        codec: &C,
    ) -> Result<u64> {
        if self.is_empty() {
            return Err(IndexError::LogicalError(
                "cannot encode an empty postings list".to_string(),
            ));
        }

        self.rowids.run_optimize();
        let cardinality = self.rowids.len();

        if cardinality < ARRAY_THRESHOLD {
            return self.encode_array(writer, cardinality);
        }

        self.encode_roaring(writer, codec, cardinality)
    }

    fn encode_array<W: Write>(&self, writer: &mut W, cardinality: u64) -> Result<u64> {
        let header = (cardinality << 1) | ARRAY_CONTAINER_MASK;
        let mut written = write_varint(writer, header)? as u64;

        for value in self.rowids.iter() {
            written += write_varint(writer, value as u64)? as u64;
        }

        Ok(written)
    }

    fn encode_roaring<W: Write, C: CompressionCodec>(
        &self,
        writer: &mut W,
        codec: &C,
        cardinality: u64,
    ) -> Result<u64> {
        let uncompressed_size = self.rowids.serialized_size();
        let mut raw = Vec::with_capacity(uncompressed_size);
        self.rowids
            .serialize_into(&mut raw)
            .map_err(IndexError::from)?;

        let compress = cardinality >= COMPRESS_THRESHOLD;
        if !compress {
            let header = ((uncompressed_size as u64) << 2) | (0 << 1);
            let mut written = write_varint(writer, header)? as u64;
            writer.write_all(&raw)?;
            written += raw.len() as u64;
            return Ok(written);
        }

        let mut compressed = vec![0u8; codec.compressed_reserve_size(raw.len())];
        let compressed_size = codec.compress(&raw, &mut compressed)?;
        compressed.truncate(compressed_size);

        let header = ((uncompressed_size as u64) << 2) | (ROARING_COMPRESSED_MASK << 1);
        let mut written = write_varint(writer, header)? as u64;
        written += write_varint(writer, compressed_size as u64)? as u64;
        writer.write_all(&compressed)?;
        written += compressed.len() as u64;
        Ok(written)
    }
}

/// Read a varint header and dispatch to the array or roaring decode path.
///
/// Fails with [`IndexError::CorruptedData`] if the header mask bits are inconsistent, if
/// varint decoding runs past the buffer, or if the compression codec reports failure.
pub fn decode<R: Read, C: CompressionCodec>(reader: &mut R, codec: &C) -> Result<RoaringBitmap> {
    let header = read_varint(reader)?;

    if header & ARRAY_CONTAINER_MASK != 0 {
        decode_array(reader, header >> 1)
    } else {
        decode_roaring(reader, codec, header >> 1)
    }
}

fn decode_array<R: Read>(reader: &mut R, num_entries: u64) -> Result<RoaringBitmap> {
    let mut bitmap = RoaringBitmap::new();
    for _ in 0..num_entries {
        let value = read_varint(reader)?;
        let value: u32 = value.try_into().map_err(|_| {
            IndexError::CorruptedData(format!("row-id {value} does not fit in u32"))
        })?;
        bitmap.insert(value);
    }
    Ok(bitmap)
}

fn decode_roaring<R: Read, C: CompressionCodec>(
    reader: &mut R,
    codec: &C,
    header: u64,
) -> Result<RoaringBitmap> {
    let compressed = header & ROARING_COMPRESSED_MASK != 0;
    let uncompressed_size = (header >> 1) as usize;

    let raw = if compressed {
        let compressed_size = read_varint(reader)? as usize;
        let mut src = vec![0u8; compressed_size];
        reader
            .read_exact(&mut src)
            .map_err(|e| IndexError::CorruptedData(format!("truncated postings list: {e}")))?;

        let mut dst = vec![0u8; uncompressed_size];
        codec.decompress(&src, &mut dst)?;
        dst
    } else {
        let mut buf = vec![0u8; uncompressed_size];
        reader
            .read_exact(&mut buf)
            .map_err(|e| IndexError::CorruptedData(format!("truncated postings list: {e}")))?;
        buf
    };

    RoaringBitmap::deserialize_from(&raw[..])
        .map_err(|e| IndexError::CorruptedData(format!("invalid roaring bitmap: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NoopCodec;

    fn roundtrip(rowids: &[u32]) -> RoaringBitmap {
        let mut builder = PostingsBuilder::new();
        for &r in rowids {
            builder.add(r);
        }

        let codec = NoopCodec;
        let mut buf = Vec::new();
        builder.encode(&mut buf, &codec).unwrap();

        let mut cursor = &buf[..];
        decode(&mut cursor, &codec).unwrap()
    }

    #[test]
    fn array_encoding_below_threshold() {
        let rowids: Vec<u32> = (0..15).collect();
        let decoded = roundtrip(&rowids);
        assert_eq!(decoded.len(), 15);
        for r in rowids {
            assert!(decoded.contains(r));
        }
    }

    #[test]
    fn roaring_uncompressed_at_threshold() {
        let rowids: Vec<u32> = (0..16).collect();
        let mut builder = PostingsBuilder::new();
        for &r in &rowids {
            builder.add(r);
        }
        let codec = NoopCodec;
        let mut buf = Vec::new();
        builder.encode(&mut buf, &codec).unwrap();

        // Header's low bit must be 0 (roaring), not 1 (array).
        let mut header_reader = &buf[..];
        let header = read_varint(&mut header_reader).unwrap();
        assert_eq!(header & ARRAY_CONTAINER_MASK, 0);

        let mut cursor = &buf[..];
        let decoded = decode(&mut cursor, &codec).unwrap();
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn array_below_max_cardinality_has_low_bit_set() {
        let rowids: Vec<u32> = (0..15).collect();
        let mut builder = PostingsBuilder::new();
        for &r in &rowids {
            builder.add(r);
        }
        let codec = NoopCodec;
        let mut buf = Vec::new();
        builder.encode(&mut buf, &codec).unwrap();

        let mut header_reader = &buf[..];
        let header = read_varint(&mut header_reader).unwrap();
        assert_eq!(header & ARRAY_CONTAINER_MASK, 1);
        assert_eq!(header >> 1, 15);
    }

    #[test]
    fn compression_boundary_round_trips_both_sides() {
        use crate::storage::ZstdCodec;

        let below: Vec<u32> = (0..8191).collect();
        let at: Vec<u32> = (0..8192).collect();

        for rowids in [below, at] {
            let mut builder = PostingsBuilder::new();
            for &r in &rowids {
                builder.add(r);
            }
            let codec = ZstdCodec;
            let mut buf = Vec::new();
            builder.encode(&mut buf, &codec).unwrap();

            let mut cursor = &buf[..];
            let decoded = decode(&mut cursor, &codec).unwrap();
            assert_eq!(decoded.len() as usize, rowids.len());
        }
    }

    #[test]
    fn boundary_rowids_roundtrip() {
        let decoded = roundtrip(&[0, u32::MAX]);
        assert!(decoded.contains(0));
        assert!(decoded.contains(u32::MAX));
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn idempotent_insertion() {
        let mut builder = PostingsBuilder::new();
        builder.add(5);
        builder.add(5);
        builder.add(5);
        assert_eq!(builder.cardinality(), 1);
        assert!(builder.contains(5));
    }

    #[test]
    fn encoding_an_empty_builder_is_a_logical_error() {
        let mut builder = PostingsBuilder::new();
        let codec = NoopCodec;
        let mut buf = Vec::new();
        let err = builder.encode(&mut buf, &codec).unwrap_err();
        assert!(matches!(err, IndexError::LogicalError(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn out_of_order_insertion_preserves_ascending_iteration() {
        let mut builder = PostingsBuilder::new();
        for r in [9, 1, 5, 3] {
            builder.add(r);
        }
        let values: Vec<u32> = builder.rowids.iter().collect();
        assert_eq!(values, vec![1, 3, 5, 9]);
    }
}
