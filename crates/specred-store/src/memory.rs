use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use specred_types::CalibProduct;

use crate::codec::{decode_master, encode_master};
use crate::error::{StoreError, StoreResult};
use crate::key::MasterKey;
use crate::traits::MasterStore;

/// In-memory, HashMap-based master store.
///
/// Intended for tests and embedding. Masters are held in their framed,
/// encoded form so that loads exercise the same decoding path as the
/// directory backend.
pub struct InMemoryMasterStore {
    masters: RwLock<HashMap<MasterKey, Vec<u8>>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl InMemoryMasterStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            masters: RwLock::new(HashMap::new()),
            loads: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of masters currently stored.
    pub fn len(&self) -> usize {
        self.masters.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.masters.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of stored keys.
    pub fn keys(&self) -> Vec<MasterKey> {
        let map = self.masters.read().expect("lock poisoned");
        let mut keys: Vec<MasterKey> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Insert pre-framed bytes under `key` without validation.
    ///
    /// Used to import masters produced elsewhere; malformed bytes surface
    /// as corruption on the next load.
    pub fn insert_raw(&self, key: MasterKey, bytes: Vec<u8>) {
        self.masters.write().expect("lock poisoned").insert(key, bytes);
    }

    /// Number of `load` calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Number of `save` calls served so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryMasterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterStore for InMemoryMasterStore {
    fn load(&self, key: &MasterKey) -> StoreResult<Option<CalibProduct>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let map = self
            .masters
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        match map.get(key) {
            Some(bytes) => decode_master(key, bytes).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, key: &MasterKey, product: &CalibProduct) -> StoreResult<()> {
        let bytes = encode_master(product)?;
        let mut map = self
            .masters
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        map.insert(key.clone(), bytes);
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn exists(&self, key: &MasterKey) -> StoreResult<bool> {
        let map = self
            .masters
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(map.contains_key(key))
    }

    fn describe(&self) -> String {
        "in-memory".into()
    }
}

impl std::fmt::Debug for InMemoryMasterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMasterStore")
            .field("master_count", &self.len())
            .finish()
    }
}
