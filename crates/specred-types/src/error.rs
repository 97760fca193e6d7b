use thiserror::Error;

use crate::kind::ProductKind;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid detector number: {0} (detectors are numbered from 1)")]
    InvalidDetector(u8),

    #[error("invalid sci_ID {0:#x}: a science exposure carries exactly one bit")]
    InvalidSciId(u32),

    #[error("unknown product kind: {0}")]
    UnknownKind(String),

    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    #[error("product kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: ProductKind,
        actual: ProductKind,
    },
}
