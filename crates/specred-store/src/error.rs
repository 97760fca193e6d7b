use crate::key::MasterKey;

/// Errors from master store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The persisted master exists but is unreadable or malformed.
    #[error("corrupt master {key}: {reason}")]
    Corrupt { key: MasterKey, reason: String },

    /// Serialization failure while encoding a product.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend state is unusable (e.g. a poisoned lock).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns `true` for malformed-artifact errors.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
