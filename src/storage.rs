//! Storage and compression seams the core depends on.
//!
//! The core never touches a filesystem or a compression library directly; it goes through
//! [`DataPartStorage`] and [`CompressionCodec`]. This mirrors how the ClickHouse original
//! this crate is descended from separates `IDataPartStorage` (local disk, object storage)
//! from `ICompressionCodec` (ZSTD, LZ4, ...).

use crate::error::{IndexError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// How a write stream should be opened relative to any existing file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Append to the end of an existing file, creating it if absent.
    Append,
    /// Discard any existing contents and start from an empty file.
    Truncate,
}

/// A readable, seekable stream over one named file in a part.
pub trait ReadStream: Read + Seek {}
impl<T: Read + Seek> ReadStream for T {}

/// A writable, append-only stream over one named file in a part.
///
/// `sync` must durably flush written bytes. `cancel` is a best-effort abort that must never
/// panic or return an error — callers rely on it during `IndexStore::cancel`.
pub trait WriteStream: Write {
    /// Flush and durably persist everything written so far.
    fn sync(&mut self) -> Result<()>;

    /// Abandon this stream. Best-effort; never fails.
    fn cancel(&mut self);
}

/// Storage abstraction for the files that make up one GIN index.
///
/// Implementations back onto a single "part" — a directory-like unit of storage that owns
/// the four `.gin_*` files for each index name written into it.
pub trait DataPartStorage {
    /// Concrete readable stream type.
    type Read: ReadStream;
    /// Concrete writable stream type.
    type Write: WriteStream;

    /// Does a file with this name already exist in the part?
    fn exists_file(&self, name: &str) -> bool;

    /// Open a file for sequential, seekable reading.
    fn read_file(&self, name: &str) -> Result<Self::Read>;

    /// Open a file for writing with the given buffering hint and write mode.
    fn write_file(&self, name: &str, buffer_size: usize, mode: WriteMode) -> Result<Self::Write>;
}

/// Compression codec abstraction used for postings lists and FST dictionary blobs.
pub trait CompressionCodec {
    /// Upper bound on the compressed size of an `n`-byte input; used to size scratch buffers.
    fn compressed_reserve_size(&self, n: usize) -> usize;

    /// Compress `src` into `dst`, returning the number of bytes written.
    ///
    /// `dst` must be at least [`compressed_reserve_size`](Self::compressed_reserve_size) long.
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize>;

    /// Decompress `src` into `dst`. `dst` must be exactly the known uncompressed size.
    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Local filesystem backend
// ---------------------------------------------------------------------------

/// A [`DataPartStorage`] backed by a directory on the local filesystem.
///
/// Each named file lives directly under `root`. This is the backend used by tests and by
/// any caller that does not need an object-storage part.
#[derive(Debug, Clone)]
pub struct LocalFsStorage {
    root: PathBuf,
}

impl LocalFsStorage {
    /// Open (without creating) a local directory as a part.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl DataPartStorage for LocalFsStorage {
    type Read = LocalReadStream;
    type Write = LocalWriteStream;

    fn exists_file(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    fn read_file(&self, name: &str) -> Result<Self::Read> {
        let file = File::open(self.path_for(name))?;
        Ok(LocalReadStream {
            inner: BufReader::new(file),
        })
    }

    fn write_file(&self, name: &str, buffer_size: usize, mode: WriteMode) -> Result<Self::Write> {
        let mut options = OpenOptions::new();
        options.write(true).create(true);
        match mode {
            WriteMode::Append => {
                options.append(true);
            }
            WriteMode::Truncate => {
                options.truncate(true);
            }
        }
        let file = options.open(self.path_for(name))?;
        Ok(LocalWriteStream {
            inner: BufWriter::with_capacity(buffer_size.max(1), file),
            cancelled: false,
        })
    }
}

/// Local-filesystem read stream: a buffered, seekable file handle.
pub struct LocalReadStream {
    inner: BufReader<File>,
}

impl Read for LocalReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for LocalReadStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Local-filesystem write stream: a buffered, append- or truncate-opened file handle.
pub struct LocalWriteStream {
    inner: BufWriter<File>,
    cancelled: bool,
}

impl Write for LocalWriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.cancelled {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "write stream was cancelled",
            ));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl WriteStream for LocalWriteStream {
    fn sync(&mut self) -> Result<()> {
        self.inner.flush()?;
        self.inner.get_ref().sync_all()?;
        Ok(())
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}

// ---------------------------------------------------------------------------
// ZSTD codec
// ---------------------------------------------------------------------------

/// ZSTD-backed [`CompressionCodec`] at a fixed compression level.
///
/// Mirrors `GinIndexCompressionFactory::zstdCodec()` in the original source: a single
/// process-wide codec choice (ZSTD, level 1), not a negotiable setting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCodec;

/// Compression level used throughout the GIN index, matching the original source.
pub const ZSTD_LEVEL: i32 = 1;

impl CompressionCodec for ZstdCodec {
    fn compressed_reserve_size(&self, n: usize) -> usize {
        zstd::zstd_safe::compress_bound(n)
    }

    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        zstd::bulk::compress_to_buffer(src, dst, ZSTD_LEVEL).map_err(IndexError::from)
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<()> {
        let written = zstd::bulk::decompress_to_buffer(src, dst)
            .map_err(|e| IndexError::CorruptedData(format!("zstd decompression failed: {e}")))?;
        if written != dst.len() {
            return Err(IndexError::CorruptedData(format!(
                "zstd decompressed {written} bytes, expected {}",
                dst.len()
            )));
        }
        Ok(())
    }
}

/// A pass-through [`CompressionCodec`] that never compresses.
///
/// Useful in tests that want to exercise the header/offset bookkeeping without linking the
/// real ZSTD code paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCodec;

impl CompressionCodec for NoopCodec {
    fn compressed_reserve_size(&self, n: usize) -> usize {
        n
    }

    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        dst[..src.len()].copy_from_slice(src);
        Ok(src.len())
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<()> {
        if src.len() != dst.len() {
            return Err(IndexError::CorruptedData(
                "noop codec size mismatch".to_string(),
            ));
        }
        dst.copy_from_slice(src);
        Ok(())
    }
}

/// Returns `true` if `name` is one of the four files that make up a GIN index.
pub fn is_gin_file(name: &str) -> bool {
    name.ends_with(".gin_dict")
        || name.ends_with(".gin_post")
        || name.ends_with(".gin_seg")
        || name.ends_with(".gin_sid")
}

/// Suffixes appended to an index name to produce the four on-disk file names.
pub mod suffix {
    pub const SEGMENT_ID: &str = ".gin_sid";
    pub const METADATA: &str = ".gin_seg";
    pub const DICTIONARY: &str = ".gin_dict";
    pub const POSTINGS: &str = ".gin_post";
}

/// The four file names that make up one GIN index, derived from its base name.
pub fn file_names(index_name: &str) -> [String; 4] {
    [
        format!("{index_name}{}", suffix::SEGMENT_ID),
        format!("{index_name}{}", suffix::METADATA),
        format!("{index_name}{}", suffix::DICTIONARY),
        format!("{index_name}{}", suffix::POSTINGS),
    ]
}

/// Relative path of a part, used as half of the [`crate::registry::StoreRegistry`] cache key.
pub fn part_relative_path(root: &Path) -> String {
    root.to_string_lossy().into_owned()
}
