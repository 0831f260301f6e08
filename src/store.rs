//! The write side of a GIN index: [`IndexStore`].
//!
//! An `IndexStore` owns segment-id allocation, row-id allocation, and the in-progress
//! [`SegmentWriter`]. It is the single entry point ingestion code uses to turn
//! `(token, row_id)` pairs into on-disk segments.

use crate::error::{IndexError, Result};
use crate::segment::{Segment, SegmentWriter, SEGMENT_RECORD_LEN};
use crate::storage::{file_names, suffix, CompressionCodec, DataPartStorage, WriteMode, WriteStream};
use crate::varint::{read_varint, write_varint};
use parking_lot::Mutex;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, warn};

/// On-disk format version written as the first byte of the `.gin_sid` sidecar file.
pub const FORMAT_VERSION: u8 = 1;

/// Default threshold, in bytes, above which an FST dictionary blob is ZSTD-compressed.
pub const FST_COMPRESS_THRESHOLD: usize = 128;

const METADATA_BUFFER_SIZE: usize = 4096;
const STREAM_BUFFER_SIZE: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreState {
    Fresh,
    Writing,
    Finalized,
    Cancelled,
}

struct WriteStreams<W> {
    metadata: W,
    dict: W,
    postings: W,
}

/// The write side of one GIN index within a part.
///
/// `open` constructs a handle capable only of [`allocate_segment_ids`](Self::allocate_segment_ids)
/// bookkeeping; `open_for_write` additionally prepares this store to ingest tokens.
pub struct IndexStore<S: DataPartStorage, C: CompressionCodec> {
    storage: S,
    codec: C,
    name: String,
    next_available_segment_id: Mutex<Option<u32>>,
    segment_writer: Option<SegmentWriter>,
    streams: Option<WriteStreams<S::Write>>,
    state: StoreState,
}

impl<S: DataPartStorage, C: CompressionCodec> IndexStore<S, C> {
    /// Construct a store handle with no write-side state. Performs no I/O.
    pub fn open(storage: S, codec: C, name: impl Into<String>) -> Self {
        Self {
            storage,
            codec,
            name: name.into(),
            next_available_segment_id: Mutex::new(None),
            segment_writer: None,
            streams: None,
            state: StoreState::Fresh,
        }
    }

    /// Construct a store ready to ingest tokens, resuming from any existing sidecar and
    /// segment data for `name` within `storage`. A `digestion_threshold_bytes` of `0`
    /// disables automatic segment splitting: the store emits a single segment.
    pub fn open_for_write(
        storage: S,
        codec: C,
        name: impl Into<String>,
        digestion_threshold_bytes: u64,
    ) -> Result<Self> {
        let name = name.into();
        let seed = peek_next_segment_id(&storage, &name)?;
        let num_segments = seed.saturating_sub(1);

        let next_row_id = if num_segments > 0 {
            read_last_segment_next_row_id(&storage, &name, num_segments)?
        } else {
            0
        };

        let postings_start_offset =
            current_file_len(&storage, &format!("{name}{}", suffix::POSTINGS))?;
        let dict_start_offset = current_file_len(&storage, &format!("{name}{}", suffix::DICTIONARY))?;

        let segment = Segment {
            segment_id: seed,
            next_row_id,
            postings_start_offset,
            dict_start_offset,
        };

        Ok(Self {
            storage,
            codec,
            name,
            next_available_segment_id: Mutex::new(None),
            segment_writer: Some(SegmentWriter::new(segment, digestion_threshold_bytes)),
            streams: None,
            state: StoreState::Writing,
        })
    }

    /// Allocate `n` consecutive segment ids, returning the first. Synchronized under an
    /// internal mutex; lazily seeds itself from the `.gin_sid` sidecar (or `1` if absent) on
    /// first use. This is the single counter every segment id comes from: `flush_current_segment`
    /// and `finalize` draw this store's own segment ids from it too, so an id handed out here
    /// is never also assigned to a segment this store flushes, and vice versa.
    pub fn allocate_segment_ids(&self, n: u32) -> Result<u32> {
        let mut guard = self.next_available_segment_id.lock();
        let current = match *guard {
            Some(v) => v,
            None => peek_next_segment_id(&self.storage, &self.name)?,
        };
        *guard = Some(current + n);
        Ok(current)
    }

    /// Reserve `n` consecutive row-ids in the current segment, returning the first. Not
    /// synchronized: callers must serialize ingestion per store.
    pub fn allocate_row_ids(&mut self, n: u32) -> Result<u32> {
        Ok(self.writer_mut()?.allocate_row_ids(n))
    }

    /// Record that `token` occurs in `rowid`, in the segment currently being accumulated.
    pub fn add_token(&mut self, token: &[u8], rowid: u32) -> Result<()> {
        self.writer_mut()?.add_token(token, rowid);
        Ok(())
    }

    /// Flush the current segment if it has grown past the digestion threshold.
    pub fn maybe_flush(&mut self) -> Result<()> {
        if self.writer_mut()?.needs_flush() {
            self.flush_current_segment()?;
        }
        Ok(())
    }

    /// Flush any remaining tokens as a final segment, persist the sidecar id-file, and sync
    /// every stream. Calling `finalize` a second time is a [`IndexError::LogicalError`].
    pub fn finalize(&mut self) -> Result<()> {
        match self.state {
            StoreState::Finalized | StoreState::Cancelled => {
                return Err(IndexError::LogicalError(
                    "store has already been finalized or cancelled".to_string(),
                ));
            }
            StoreState::Fresh => {
                return Err(IndexError::LogicalError(
                    "store was not opened for write".to_string(),
                ));
            }
            StoreState::Writing => {}
        }

        if let Err(e) = self.flush_current_segment() {
            warn!(index = %self.name, error = %e, "finalize: flush failed, cancelling store");
            self.state = StoreState::Cancelled;
            return Err(e);
        }

        // Read the shared counter rather than the SegmentWriter's own (now stale) bookkeeping,
        // so a concurrent bootstrap caller's `allocate_segment_ids` reservations are reflected
        // in the persisted value too.
        let next_id = match self.allocate_segment_ids(0) {
            Ok(v) => v,
            Err(e) => {
                warn!(index = %self.name, error = %e, "finalize: failed to read segment id counter, cancelling store");
                self.state = StoreState::Cancelled;
                return Err(e);
            }
        };
        if let Err(e) = self.write_sidecar(next_id) {
            warn!(index = %self.name, error = %e, "finalize: failed to write sidecar, cancelling store");
            self.state = StoreState::Cancelled;
            return Err(e);
        }

        if let Some(streams) = self.streams.as_mut() {
            streams.metadata.sync()?;
            streams.dict.sync()?;
            streams.postings.sync()?;
        }

        debug!(index = %self.name, next_available_segment_id = next_id, "finalized GIN index store");
        self.state = StoreState::Finalized;
        Ok(())
    }

    /// Best-effort abort. Propagates `cancel` to every open stream and marks the store
    /// cancelled. Never fails.
    pub fn cancel(&mut self) {
        debug!(index = %self.name, "cancelling GIN index store");
        if let Some(streams) = self.streams.as_mut() {
            streams.metadata.cancel();
            streams.dict.cancel();
            streams.postings.cancel();
        }
        self.state = StoreState::Cancelled;
    }

    fn writer_mut(&mut self) -> Result<&mut SegmentWriter> {
        match self.state {
            StoreState::Cancelled => {
                return Err(IndexError::IOError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "GIN index store was cancelled",
                )));
            }
            StoreState::Finalized => {
                return Err(IndexError::LogicalError(
                    "store has already been finalized".to_string(),
                ));
            }
            StoreState::Fresh | StoreState::Writing => {}
        }
        self.segment_writer
            .as_mut()
            .ok_or_else(|| IndexError::LogicalError("store was not opened for write".to_string()))
    }

    fn flush_current_segment(&mut self) -> Result<()> {
        if self.state != StoreState::Writing {
            return Err(IndexError::LogicalError(
                "store is not in the writing state".to_string(),
            ));
        }
        if self.segment_writer.as_ref().map(|w| w.is_empty()).unwrap_or(true) {
            return Ok(());
        }

        self.ensure_streams_open()?;

        // Draw the id for *this* flush from the same counter `allocate_segment_ids` serves
        // externally, right before it's needed, instead of precomputing it from the writer's
        // own stale bookkeeping.
        let this_segment_id = self.allocate_segment_ids(1)?;
        let streams = self.streams.as_mut().unwrap();
        let writer = self.segment_writer.as_mut().unwrap();
        writer.flush(
            &mut streams.metadata,
            &mut streams.dict,
            &mut streams.postings,
            &self.codec,
            this_segment_id,
            FST_COMPRESS_THRESHOLD,
        )?;
        Ok(())
    }

    fn ensure_streams_open(&mut self) -> Result<()> {
        if self.streams.is_some() {
            return Ok(());
        }
        let names = file_names(&self.name);
        let metadata = self.storage.write_file(&names[1], METADATA_BUFFER_SIZE, WriteMode::Append)?;
        let dict = self.storage.write_file(&names[2], STREAM_BUFFER_SIZE, WriteMode::Append)?;
        let postings = self.storage.write_file(&names[3], STREAM_BUFFER_SIZE, WriteMode::Append)?;
        self.streams = Some(WriteStreams { metadata, dict, postings });
        Ok(())
    }

    fn write_sidecar(&mut self, next_available_segment_id: u32) -> Result<()> {
        let names = file_names(&self.name);
        let mut w = self.storage.write_file(&names[0], 8, WriteMode::Truncate)?;
        w.write_all(&[FORMAT_VERSION])?;
        write_varint(&mut w, next_available_segment_id as u64)?;
        w.sync()?;
        Ok(())
    }
}

fn peek_next_segment_id<S: DataPartStorage>(storage: &S, name: &str) -> Result<u32> {
    let file = format!("{name}{}", suffix::SEGMENT_ID);
    if !storage.exists_file(&file) {
        return Ok(1);
    }

    let mut r = storage.read_file(&file)?;
    let mut version = [0u8; 1];
    r.read_exact(&mut version)
        .map_err(|e| IndexError::CorruptedData(format!("truncated segment id file: {e}")))?;
    if version[0] != FORMAT_VERSION {
        return Err(IndexError::CorruptedData(format!(
            "unsupported GIN index format version {}",
            version[0]
        )));
    }

    let next_id = read_varint(&mut r)?;
    u32::try_from(next_id)
        .map_err(|_| IndexError::CorruptedData("segment id out of range".to_string()))
}

fn current_file_len<S: DataPartStorage>(storage: &S, file: &str) -> Result<u64> {
    if !storage.exists_file(file) {
        return Ok(0);
    }
    let mut r = storage.read_file(file)?;
    r.seek(SeekFrom::End(0)).map_err(IndexError::from)
}

fn read_last_segment_next_row_id<S: DataPartStorage>(
    storage: &S,
    name: &str,
    num_segments: u32,
) -> Result<u32> {
    let file = format!("{name}{}", suffix::METADATA);
    let mut r = storage.read_file(&file)?;
    let offset = (num_segments as u64 - 1) * SEGMENT_RECORD_LEN as u64;
    r.seek(SeekFrom::Start(offset)).map_err(IndexError::from)?;

    let mut buf = [0u8; SEGMENT_RECORD_LEN];
    r.read_exact(&mut buf)
        .map_err(|e| IndexError::CorruptedData(format!("truncated segment metadata: {e}")))?;
    Ok(Segment::from_bytes(buf).next_row_id)
}
