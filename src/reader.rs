//! The read side of a GIN index: [`IndexReader`].
//!
//! Loading a reader reads every segment's metadata record up front, then lazily (but
//! eagerly from the caller's point of view — [`IndexReader::load`] drives it for all
//! segments) materializes each segment's FST dictionary. After that, a reader is immutable:
//! concurrent lookups from many threads only ever read shared state, serializing solely on
//! the postings stream itself.

use crate::error::{IndexError, Result};
use crate::fst_dict::FstDictionary;
use crate::postings;
use crate::segment::{Segment, SEGMENT_RECORD_LEN};
use crate::storage::{suffix, CompressionCodec, DataPartStorage};
use crate::varint::read_varint;
use parking_lot::Mutex;
use roaring::RoaringBitmap;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

struct SegmentDictionary {
    postings_start_offset: u64,
    fst: FstDictionary,
}

/// A loaded, read-only view over one GIN index.
pub struct IndexReader<S: DataPartStorage, C: CompressionCodec> {
    codec: C,
    segments: HashMap<u32, SegmentDictionary>,
    postings_stream: Option<Mutex<S::Read>>,
}

impl<S: DataPartStorage, C: CompressionCodec> IndexReader<S, C> {
    /// Load every segment's metadata and FST dictionary for `name` within `storage`.
    ///
    /// Fails with [`IndexError::CorruptedData`] if the sidecar id-file is present but
    /// unparseable, carries an unsupported version, or any of the three data files are
    /// truncated relative to what the metadata promises.
    pub fn load(storage: S, codec: C, name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        let num_segments = read_num_segments(&storage, name)?;

        let mut segments = HashMap::with_capacity(num_segments as usize);
        if num_segments > 0 {
            let metadata_file = format!("{name}{}", suffix::METADATA);
            let mut metadata_stream = storage.read_file(&metadata_file)?;

            let mut dict_stream = storage.read_file(&format!("{name}{}", suffix::DICTIONARY))?;

            for _ in 0..num_segments {
                let mut buf = [0u8; SEGMENT_RECORD_LEN];
                metadata_stream.read_exact(&mut buf).map_err(|e| {
                    IndexError::CorruptedData(format!("truncated segment metadata: {e}"))
                })?;
                let segment = Segment::from_bytes(buf);

                let fst = load_dictionary(&mut dict_stream, segment.dict_start_offset)?;
                segments.insert(
                    segment.segment_id,
                    SegmentDictionary {
                        postings_start_offset: segment.postings_start_offset,
                        fst,
                    },
                );
            }
        }

        let postings_stream = if num_segments > 0 {
            Some(Mutex::new(
                storage.read_file(&format!("{name}{}", suffix::POSTINGS))?,
            ))
        } else {
            None
        };

        Ok(Self {
            codec,
            segments,
            postings_stream,
        })
    }

    /// Number of segments this reader knows about.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Look up `term`, returning the postings list for every segment that contains it.
    /// Segments that don't contain `term` contribute nothing; a term absent everywhere
    /// yields an empty map, which is not an error.
    pub fn lookup(&self, term: &[u8]) -> Result<HashMap<u32, RoaringBitmap>> {
        let mut result = HashMap::new();

        let Some(postings_stream) = &self.postings_stream else {
            return Ok(result);
        };

        for (&segment_id, dict) in &self.segments {
            let Some(offset) = dict.fst.get(term) else {
                continue;
            };

            let mut stream = postings_stream.lock();
            stream
                .seek(SeekFrom::Start(dict.postings_start_offset + offset))
                .map_err(IndexError::from)?;
            let postings = postings::decode(&mut *stream, &self.codec)?;
            result.insert(segment_id, postings);
        }

        Ok(result)
    }

    /// Look up several terms at once. Duplicate terms in `terms` share one lookup.
    pub fn lookup_many(
        &self,
        terms: impl IntoIterator<Item = impl AsRef<[u8]>>,
    ) -> Result<HashMap<Vec<u8>, HashMap<u32, RoaringBitmap>>> {
        let mut cache = HashMap::new();
        for term in terms {
            let term = term.as_ref().to_vec();
            if cache.contains_key(&term) {
                continue;
            }
            let hits = self.lookup(&term)?;
            cache.insert(term, hits);
        }
        Ok(cache)
    }
}

fn read_num_segments<S: DataPartStorage>(storage: &S, name: &str) -> Result<u32> {
    let file = format!("{name}{}", suffix::SEGMENT_ID);
    if !storage.exists_file(&file) {
        return Ok(0);
    }

    let mut r = storage.read_file(&file)?;
    let mut version = [0u8; 1];
    r.read_exact(&mut version)
        .map_err(|e| IndexError::CorruptedData(format!("truncated segment id file: {e}")))?;
    if version[0] != crate::store::FORMAT_VERSION {
        return Err(IndexError::CorruptedData(format!(
            "unsupported GIN index format version {}",
            version[0]
        )));
    }

    let next_available = read_varint(&mut r)?;
    Ok(next_available.saturating_sub(1) as u32)
}

fn load_dictionary<R: Read + Seek>(stream: &mut R, dict_start_offset: u64) -> Result<FstDictionary> {
    stream
        .seek(SeekFrom::Start(dict_start_offset))
        .map_err(IndexError::from)?;

    let header = read_varint(stream)?;
    let uncompressed_size = (header >> 1) as usize;
    let compressed = header & 1 != 0;

    let bytes = if compressed {
        let compressed_size = read_varint(stream)? as usize;
        let mut src = vec![0u8; compressed_size];
        stream
            .read_exact(&mut src)
            .map_err(|e| IndexError::CorruptedData(format!("truncated FST dictionary: {e}")))?;

        let codec = crate::storage::ZstdCodec;
        let mut dst = vec![0u8; uncompressed_size];
        codec.decompress(&src, &mut dst)?;
        dst
    } else {
        let mut buf = vec![0u8; uncompressed_size];
        stream
            .read_exact(&mut buf)
            .map_err(|e| IndexError::CorruptedData(format!("truncated FST dictionary: {e}")))?;
        buf
    };

    FstDictionary::open(bytes)
}
