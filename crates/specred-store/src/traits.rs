use specred_types::CalibProduct;

use crate::error::StoreResult;
use crate::key::MasterKey;

/// Durable storage for master calibration products.
///
/// All implementations must satisfy these invariants:
/// - `load` returns `Ok(None)` when no master exists for the key.
/// - A master that exists but cannot be decoded is `Err(StoreError::Corrupt)`,
///   never `Ok(None)`.
/// - `save` replaces any previous master for the same key atomically.
pub trait MasterStore: Send + Sync {
    /// Load the master for `key`, if one has been saved.
    fn load(&self, key: &MasterKey) -> StoreResult<Option<CalibProduct>>;

    /// Persist `product` under `key`.
    fn save(&self, key: &MasterKey, product: &CalibProduct) -> StoreResult<()>;

    /// Check whether a master exists for `key` without decoding it.
    fn exists(&self, key: &MasterKey) -> StoreResult<bool>;

    /// Human-readable backend description for log lines.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}
