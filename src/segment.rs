//! On-disk segment metadata and the in-memory segment builder.
//!
//! A GIN index is append-only: data is grouped into segments, each segment holding the
//! postings for the tokens seen since the previous segment was flushed. [`Segment`] is the
//! fixed-size record written once per segment to the `.gin_seg` file. [`SegmentWriter`] is
//! the in-memory accumulator that turns token/row-id pairs into a segment's `.gin_post` and
//! `.gin_dict` bytes.

use crate::error::Result;
use crate::fst_dict::FstDictionaryBuilder;
use crate::postings::PostingsBuilder;
use crate::storage::CompressionCodec;
use crate::varint::write_varint;
use std::collections::BTreeMap;
use std::io::Write;

/// `segment_digestion_threshold_bytes` value meaning "never split, keep a single segment".
pub const UNLIMITED_SEGMENT_DIGESTION_THRESHOLD_BYTES: u64 = 0;

/// Size in bytes of one [`Segment`] record on disk.
pub const SEGMENT_RECORD_LEN: usize = 24;

/// Fixed-size metadata record for one segment, as stored in the `.gin_seg` file.
///
/// `postings_start_offset` and `dict_start_offset` are cumulative offsets into the shared
/// `.gin_post` / `.gin_dict` files: the record for segment N stores where segment N's own
/// data *begins*, not where it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Segment {
    pub segment_id: u32,
    pub next_row_id: u32,
    pub postings_start_offset: u64,
    pub dict_start_offset: u64,
}

impl Segment {
    /// The first segment of a brand-new store: segment id 1, nothing allocated yet.
    pub fn initial() -> Self {
        Self {
            segment_id: 1,
            next_row_id: 0,
            postings_start_offset: 0,
            dict_start_offset: 0,
        }
    }

    /// Serialize to the fixed-width on-disk representation (little-endian).
    pub fn to_bytes(self) -> [u8; SEGMENT_RECORD_LEN] {
        let mut out = [0u8; SEGMENT_RECORD_LEN];
        out[0..4].copy_from_slice(&self.segment_id.to_le_bytes());
        out[4..8].copy_from_slice(&self.next_row_id.to_le_bytes());
        out[8..16].copy_from_slice(&self.postings_start_offset.to_le_bytes());
        out[16..24].copy_from_slice(&self.dict_start_offset.to_le_bytes());
        out
    }

    /// Deserialize from a fixed-width on-disk record.
    pub fn from_bytes(bytes: [u8; SEGMENT_RECORD_LEN]) -> Self {
        Self {
            segment_id: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            next_row_id: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            postings_start_offset: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            dict_start_offset: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
        }
    }
}

/// Accumulates the current, not-yet-flushed segment and turns it into on-disk bytes.
///
/// Holds every token seen since the last flush, each with its own [`PostingsBuilder`], plus
/// the running [`Segment`] record that will be written as this segment's metadata.
pub struct SegmentWriter {
    current_segment: Segment,
    postings: BTreeMap<Vec<u8>, PostingsBuilder>,
    size_estimate: u64,
    digestion_threshold_bytes: u64,
}

impl SegmentWriter {
    /// Start accumulating a new store from scratch, or resume one whose previous segment
    /// ended at `segment`.
    pub fn new(segment: Segment, digestion_threshold_bytes: u64) -> Self {
        Self {
            current_segment: segment,
            postings: BTreeMap::new(),
            size_estimate: 0,
            digestion_threshold_bytes,
        }
    }

    /// Id of the most recently flushed segment, or the placeholder the writer was
    /// constructed with if nothing has been flushed yet. Not authoritative for deciding the
    /// next id to hand out — see `IndexStore::allocate_segment_ids`, the single counter every
    /// segment id (whether assigned to this writer's own flushes or to an external caller)
    /// is drawn from.
    pub fn current_segment_id(&self) -> u32 {
        self.current_segment.segment_id
    }

    /// `true` if no tokens have been added since the last flush.
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Reserve `num_ids` consecutive row-ids, returning the first one. Not synchronized: the
    /// caller is responsible for ensuring a single writer drives row-id allocation.
    pub fn allocate_row_ids(&mut self, num_ids: u32) -> u32 {
        let start = self.current_segment.next_row_id;
        self.current_segment.next_row_id += num_ids;
        start
    }

    /// Record that `token` occurs in `rowid`.
    pub fn add_token(&mut self, token: &[u8], rowid: u32) {
        self.postings
            .entry(token.to_vec())
            .or_default()
            .add(rowid);
        self.size_estimate += token.len() as u64 + 4;
    }

    /// `true` once enough data has accumulated that the current segment should be flushed
    /// before ingesting more. A threshold of
    /// [`UNLIMITED_SEGMENT_DIGESTION_THRESHOLD_BYTES`] disables splitting: the store is
    /// always a single segment.
    pub fn needs_flush(&self) -> bool {
        self.digestion_threshold_bytes != UNLIMITED_SEGMENT_DIGESTION_THRESHOLD_BYTES
            && self.size_estimate > self.digestion_threshold_bytes
    }

    /// Flush the accumulated tokens as one segment: write the metadata record, then the
    /// postings (sorted by token), then the FST dictionary mapping each token to its
    /// postings offset within this segment.
    ///
    /// `this_segment_id` is the id to stamp on the record being written *right now* — the
    /// caller is expected to have drawn it from the same counter it hands out to everyone
    /// else (`IndexStore::allocate_segment_ids`), immediately before calling `flush`, rather
    /// than precomputing it ahead of time. Returns the [`Segment`] record that was written.
    pub fn flush<W: Write, C: CompressionCodec>(
        &mut self,
        metadata_out: &mut W,
        dict_out: &mut W,
        postings_out: &mut W,
        codec: &C,
        this_segment_id: u32,
        fst_compress_threshold: usize,
    ) -> Result<Segment> {
        self.current_segment.segment_id = this_segment_id;
        let flushed = self.current_segment;
        metadata_out.write_all(&flushed.to_bytes())?;

        let mut fst_builder = FstDictionaryBuilder::new();
        let mut relative_offset: u64 = 0;

        for (token, mut builder) in std::mem::take(&mut self.postings) {
            fst_builder.insert(&token, relative_offset)?;
            let written = builder.encode(postings_out, codec)?;
            relative_offset += written;
            self.current_segment.postings_start_offset += written;
        }

        let fst_bytes = fst_builder.finish()?;
        let uncompressed_size = fst_bytes.len();
        let compress = uncompressed_size >= fst_compress_threshold;

        let header = ((uncompressed_size as u64) << 1) | (compress as u64);
        let mut dict_bytes_written = write_varint(dict_out, header)? as u64;

        if compress {
            let mut compressed = vec![0u8; codec.compressed_reserve_size(uncompressed_size)];
            let compressed_size = codec.compress(&fst_bytes, &mut compressed)?;
            compressed.truncate(compressed_size);

            dict_bytes_written += write_varint(dict_out, compressed_size as u64)? as u64;
            dict_out.write_all(&compressed)?;
            dict_bytes_written += compressed.len() as u64;
        } else {
            dict_out.write_all(&fst_bytes)?;
            dict_bytes_written += fst_bytes.len() as u64;
        }

        self.current_segment.dict_start_offset += dict_bytes_written;
        self.size_estimate = 0;

        Ok(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NoopCodec;

    #[test]
    fn segment_record_roundtrips_through_bytes() {
        let segment = Segment {
            segment_id: 7,
            next_row_id: 1000,
            postings_start_offset: 4096,
            dict_start_offset: 256,
        };
        let bytes = segment.to_bytes();
        assert_eq!(bytes.len(), SEGMENT_RECORD_LEN);
        assert_eq!(Segment::from_bytes(bytes), segment);
    }

    #[test]
    fn flush_writes_metadata_and_advances_segment_id() {
        let mut writer = SegmentWriter::new(Segment::initial(), UNLIMITED_SEGMENT_DIGESTION_THRESHOLD_BYTES);
        let rowid = writer.allocate_row_ids(3);
        assert_eq!(rowid, 0);

        writer.add_token(b"apple", 0);
        writer.add_token(b"banana", 1);
        writer.add_token(b"apple", 2);

        let codec = NoopCodec;
        let mut metadata = Vec::new();
        let mut dict = Vec::new();
        let mut postings = Vec::new();

        let flushed = writer
            .flush(&mut metadata, &mut dict, &mut postings, &codec, 1, 128)
            .unwrap();

        assert_eq!(flushed.segment_id, 1);
        assert_eq!(flushed.postings_start_offset, 0);
        assert_eq!(flushed.dict_start_offset, 0);
        assert_eq!(metadata.len(), SEGMENT_RECORD_LEN);
        assert!(!postings.is_empty());
        assert!(!dict.is_empty());

        assert_eq!(writer.current_segment_id(), 1);
        assert!(writer.is_empty());
    }

    #[test]
    fn needs_flush_respects_unlimited_threshold() {
        let mut writer = SegmentWriter::new(Segment::initial(), UNLIMITED_SEGMENT_DIGESTION_THRESHOLD_BYTES);
        for i in 0..10_000u32 {
            writer.add_token(format!("token-{i}").as_bytes(), i);
        }
        assert!(!writer.needs_flush());
    }

    #[test]
    fn needs_flush_trips_past_threshold() {
        let mut writer = SegmentWriter::new(Segment::initial(), 64);
        for i in 0..20u32 {
            writer.add_token(format!("token-{i}").as_bytes(), i);
        }
        assert!(writer.needs_flush());
    }

    #[test]
    fn flushing_multiple_segments_accumulates_cumulative_offsets() {
        let mut writer = SegmentWriter::new(Segment::initial(), UNLIMITED_SEGMENT_DIGESTION_THRESHOLD_BYTES);
        let codec = NoopCodec;
        let mut metadata = Vec::new();
        let mut dict = Vec::new();
        let mut postings = Vec::new();

        writer.add_token(b"alpha", 0);
        let first = writer
            .flush(&mut metadata, &mut dict, &mut postings, &codec, 1, 128)
            .unwrap();

        writer.add_token(b"beta", 1);
        let second = writer
            .flush(&mut metadata, &mut dict, &mut postings, &codec, 2, 128)
            .unwrap();

        assert_eq!(first.postings_start_offset, 0);
        assert!(second.postings_start_offset > 0);
        assert_eq!(second.segment_id, 2);
        assert_eq!(writer.current_segment_id(), 2);
    }
}
