//! Calibration error taxonomy.

use specred_dag::DagError;
use specred_types::{DetectorId, FrameType, ProductKind, SetupId, TypeError};

/// Failure reported by a calibration step or science-frame reduction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// The step ran but could not produce a usable result.
    #[error("{0}")]
    Failed(String),
}

/// Errors produced while resolving calibration products.
#[derive(Debug, thiserror::Error)]
pub enum CalibError {
    /// A raw frame required by a step is absent for this exposure/detector.
    #[error("missing {role} frame for exposure {exposure} on detector {detector}")]
    MissingInput {
        role: FrameType,
        exposure: String,
        detector: DetectorId,
    },

    /// A persisted master exists but is malformed.
    #[error("corrupt {kind} master for setup {setup}: {reason}")]
    CorruptMaster {
        setup: SetupId,
        kind: ProductKind,
        reason: String,
    },

    /// An earlier corrupt master disqualified this setup for the run.
    #[error("setup {setup} abandoned after corrupt {kind} master")]
    SetupPoisoned { setup: SetupId, kind: ProductKind },

    /// Force mode requested a master the store does not hold.
    #[error("no {kind} master for setup {setup} and masters are forced")]
    MissingMaster { setup: SetupId, kind: ProductKind },

    /// A bundle was requested before every product it carries was resolved.
    #[error("calibration for setup {setup} incomplete: missing {missing:?}")]
    IncompleteBundle {
        setup: SetupId,
        missing: Vec<ProductKind>,
    },

    /// A step produced no usable product.
    #[error("{kind} step failed for setup {setup}: {source}")]
    Step {
        setup: SetupId,
        kind: ProductKind,
        #[source]
        source: StepError,
    },

    /// Dependency graph contract violation.
    #[error(transparent)]
    Dependency(#[from] DagError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl CalibError {
    /// Returns `true` for programming-contract violations that must abort
    /// the run rather than a single exposure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::Dependency(DagError::DependencyOrder { .. })
                | Self::Dependency(DagError::UndeclaredDependency { .. })
        )
    }

    /// Returns `true` if the error disqualifies the whole setup.
    pub fn is_setup_fatal(&self) -> bool {
        matches!(self, Self::CorruptMaster { .. } | Self::SetupPoisoned { .. })
    }
}

/// Result alias for calibration operations.
pub type CalibResult<T> = Result<T, CalibError>;
