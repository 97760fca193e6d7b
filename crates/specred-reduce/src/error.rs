//! Error types for the reduction driver.

use std::path::PathBuf;

use specred_calib::{CalibError, StepError};
use specred_store::StoreError;
use specred_types::{DetectorId, TypeError};

/// Errors loading or validating a [`ReductionConfig`](crate::ReductionConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A raw frame could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot load {filename}: {reason}")]
pub struct LoadError {
    pub filename: String,
    pub reason: String,
}

/// Failures of the output writer, reader, or sensitivity function.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("spectra file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("sensitivity function: {0}")]
    SensFunc(String),
}

/// Errors from the reduction driver.
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Calibration resolution failed; see [`CalibError`] for the taxonomy.
    #[error(transparent)]
    Calib(#[from] CalibError),

    /// Science-frame reduction failed after calibration succeeded.
    #[error("reduction of {exposure} on detector {detector} failed: {source}")]
    Science {
        exposure: String,
        detector: DetectorId,
        #[source]
        source: StepError,
    },

    /// Output could not be persisted; fatal to that exposure only.
    #[error("failed to write output for {exposure}: {source}")]
    WriteFailure {
        exposure: String,
        #[source]
        source: OutputError,
    },

    #[error("flux calibration of {target} failed: {source}")]
    Flux {
        target: String,
        #[source]
        source: OutputError,
    },

    /// The observation table is inconsistent.
    #[error("invalid observation table: {0}")]
    Table(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReduceError {
    /// Returns `true` for programming-contract violations, which abort the
    /// run instead of being recorded against one exposure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Calib(e) if e.is_contract_violation())
    }
}

/// Result alias for reduction operations.
pub type ReduceResult<T> = Result<T, ReduceError>;
