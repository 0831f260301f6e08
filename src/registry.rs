//! Process-wide cache of loaded [`IndexReader`]s, mirroring `GinIndexStoreFactory` in the
//! original source: one reader per `(index name, part)` pair, shared across every caller
//! that asks for it.

use crate::error::Result;
use crate::reader::IndexReader;
use crate::storage::{suffix, CompressionCodec, DataPartStorage, LocalFsStorage, ZstdCodec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

fn registry_key(name: &str, part_relative_path: &str) -> String {
    format!("{name}:{part_relative_path}")
}

/// Mutex-protected cache of loaded readers, keyed by `"{name}:{part_relative_path}"`.
pub struct StoreRegistry<S: DataPartStorage, C: CompressionCodec> {
    codec: C,
    readers: Mutex<HashMap<String, Arc<IndexReader<S, C>>>>,
}

impl<S: DataPartStorage, C: CompressionCodec + Clone> StoreRegistry<S, C> {
    /// Create an empty registry using `codec` for every reader it loads.
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            readers: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached reader for `name` within the part at `part_relative_path`, loading
    /// it on first access. Returns `Ok(None)` if no GIN index named `name` was ever written
    /// into this part (the sidecar id-file is absent) — this is not an error.
    pub fn get(
        &self,
        name: &str,
        storage: S,
        part_relative_path: &str,
    ) -> Result<Option<Arc<IndexReader<S, C>>>> {
        let key = registry_key(name, part_relative_path);

        if let Some(existing) = self.readers.lock().get(&key) {
            return Ok(Some(existing.clone()));
        }

        if !storage.exists_file(&format!("{name}{}", suffix::SEGMENT_ID)) {
            return Ok(None);
        }

        let loaded = Arc::new(IndexReader::load(storage, self.codec.clone(), name)?);

        let mut guard = self.readers.lock();
        let winner = guard.entry(key).or_insert_with(|| loaded.clone());
        Ok(Some(winner.clone()))
    }

    /// Evict every cached reader whose key contains `part_relative_path` as a substring.
    /// Called when a part is dropped or mutated out from under its readers.
    pub fn remove(&self, part_relative_path: &str) {
        self.readers
            .lock()
            .retain(|key, _| !key.contains(part_relative_path));
    }

    /// Number of readers currently cached. Exposed for tests.
    pub fn len(&self) -> usize {
        self.readers.lock().len()
    }

    /// `true` if no readers are cached.
    pub fn is_empty(&self) -> bool {
        self.readers.lock().is_empty()
    }
}

/// The process-wide registry for the local-filesystem backend, analogous to
/// `GinIndexStoreFactory::instance()` in the original source.
pub fn global() -> &'static StoreRegistry<LocalFsStorage, ZstdCodec> {
    static INSTANCE: OnceLock<StoreRegistry<LocalFsStorage, ZstdCodec>> = OnceLock::new();
    INSTANCE.get_or_init(|| StoreRegistry::new(ZstdCodec))
}
