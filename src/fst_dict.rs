//! Per-segment token dictionary: a finite state transducer mapping each distinct token to
//! the byte offset of its postings list within the `.gin_post` file.
//!
//! Keys must be inserted in strictly ascending lexicographic order, matching the
//! construction contract of `fst::MapBuilder`. [`SegmentWriter`](crate::segment::SegmentWriter)
//! sorts a segment's tokens before building the dictionary, so this is an internal
//! invariant rather than something callers juggle directly.

use crate::error::{IndexError, Result};
use fst::{Map, MapBuilder};

/// Builds one segment's FST dictionary.
///
/// Keys are tokens as raw bytes, values are byte offsets into the segment's postings blob.
pub struct FstDictionaryBuilder {
    builder: MapBuilder<Vec<u8>>,
    last_key: Option<Vec<u8>>,
}

impl FstDictionaryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            builder: MapBuilder::memory(),
            last_key: None,
        }
    }

    /// Insert the next token. `token` must sort strictly after every previously inserted
    /// token, or this returns [`IndexError::LogicalError`].
    pub fn insert(&mut self, token: &[u8], offset: u64) -> Result<()> {
        if let Some(last) = &self.last_key {
            if token <= last.as_slice() {
                return Err(IndexError::LogicalError(format!(
                    "FST dictionary keys must be strictly ascending, got {token:?} after {last:?}"
                )));
            }
        }

        self.builder
            .insert(token, offset)
            .map_err(|e| IndexError::LogicalError(format!("FST insert failed: {e}")))?;
        self.last_key = Some(token.to_vec());
        Ok(())
    }

    /// Number of entries inserted so far.
    pub fn len(&self) -> usize {
        self.builder.len()
    }

    /// `true` if no tokens have been inserted.
    pub fn is_empty(&self) -> bool {
        self.builder.len() == 0
    }

    /// Finish construction, returning the serialized FST bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        self.builder
            .into_inner()
            .map_err(|e| IndexError::LogicalError(format!("FST finalize failed: {e}")))
    }
}

impl Default for FstDictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A read-only, loaded FST dictionary for one segment.
pub struct FstDictionary {
    map: Map<Vec<u8>>,
}

impl FstDictionary {
    /// Wrap previously-serialized FST bytes. Fails with [`IndexError::CorruptedData`] if
    /// `bytes` is not a valid FST.
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let map = Map::new(bytes)
            .map_err(|e| IndexError::CorruptedData(format!("invalid FST dictionary: {e}")))?;
        Ok(Self { map })
    }

    /// Look up the postings offset for an exact token.
    pub fn get(&self, token: &[u8]) -> Option<u64> {
        self.map.get(token)
    }

    /// Number of tokens in this dictionary.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// `true` if this dictionary holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_looks_up_ascending_tokens() {
        let mut builder = FstDictionaryBuilder::new();
        builder.insert(b"apple", 10).unwrap();
        builder.insert(b"banana", 42).unwrap();
        builder.insert(b"cherry", 100).unwrap();
        assert_eq!(builder.len(), 3);

        let bytes = builder.finish().unwrap();
        let dict = FstDictionary::open(bytes).unwrap();

        assert_eq!(dict.get(b"apple"), Some(10));
        assert_eq!(dict.get(b"banana"), Some(42));
        assert_eq!(dict.get(b"cherry"), Some(100));
        assert_eq!(dict.get(b"date"), None);
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn out_of_order_insertion_is_rejected() {
        let mut builder = FstDictionaryBuilder::new();
        builder.insert(b"banana", 1).unwrap();
        let err = builder.insert(b"apple", 2).unwrap_err();
        assert!(matches!(err, IndexError::LogicalError(_)));
    }

    #[test]
    fn duplicate_insertion_is_rejected() {
        let mut builder = FstDictionaryBuilder::new();
        builder.insert(b"apple", 1).unwrap();
        let err = builder.insert(b"apple", 2).unwrap_err();
        assert!(matches!(err, IndexError::LogicalError(_)));
    }

    #[test]
    fn empty_dictionary_roundtrips() {
        let builder = FstDictionaryBuilder::new();
        assert!(builder.is_empty());
        let bytes = builder.finish().unwrap();
        let dict = FstDictionary::open(bytes).unwrap();
        assert!(dict.is_empty());
        assert_eq!(dict.get(b"anything"), None);
    }

    #[test]
    fn corrupted_fst_bytes_are_rejected() {
        let err = FstDictionary::open(vec![1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, IndexError::CorruptedData(_)));
    }
}
