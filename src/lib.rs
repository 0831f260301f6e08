//! A segmented inverted text index: tokens to row-id postings, backed by an FST dictionary
//! and roaring-bitmap postings lists.
//!
//! An index lives as four files per name within a storage part (see [`storage`] for the
//! suffixes). Ingestion goes through [`store::IndexStore`]; reads go through
//! [`reader::IndexReader`], usually obtained via the process-wide [`registry`].

pub mod error;
pub mod fst_dict;
pub mod postings;
pub mod reader;
pub mod registry;
pub mod segment;
pub mod store;
pub mod storage;
pub mod varint;

pub use error::{IndexError, Result};
pub use fst_dict::{FstDictionary, FstDictionaryBuilder};
pub use postings::PostingsBuilder;
pub use reader::IndexReader;
pub use registry::StoreRegistry;
pub use segment::{Segment, SegmentWriter};
pub use storage::{CompressionCodec, DataPartStorage, LocalFsStorage, NoopCodec, WriteMode, ZstdCodec};
pub use store::IndexStore;
