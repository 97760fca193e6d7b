//! Directory-backed master store: one framed file per master.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use specred_types::CalibProduct;

use crate::codec::{decode_master, encode_master};
use crate::error::{StoreError, StoreResult};
use crate::key::MasterKey;
use crate::traits::MasterStore;

/// Master store rooted at a directory, e.g. `MF_shane_kast_blue/`.
///
/// Each master lives in `<root>/<MasterName>.bin`. Saves write a temp file
/// in the same directory, fsync it, and rename it over the target.
#[derive(Debug, Clone)]
pub struct DirectoryMasterStore {
    root: PathBuf,
}

impl DirectoryMasterStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a master for `key` is stored at.
    pub fn path_for(&self, key: &MasterKey) -> PathBuf {
        self.root.join(key.file_name())
    }
}

impl MasterStore for DirectoryMasterStore {
    fn load(&self, key: &MasterKey) -> StoreResult<Option<CalibProduct>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let product = decode_master(key, &bytes)?;
        debug!(master = %key, path = %path.display(), "loaded master");
        Ok(Some(product))
    }

    fn save(&self, key: &MasterKey, product: &CalibProduct) -> StoreResult<()> {
        let bytes = encode_master(product)?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;

        let path = self.path_for(key);
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(master = %key, path = %path.display(), bytes = bytes.len(), "saved master");
        Ok(())
    }

    fn exists(&self, key: &MasterKey) -> StoreResult<bool> {
        Ok(self.path_for(key).is_file())
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}
