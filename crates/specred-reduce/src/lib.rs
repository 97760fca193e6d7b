//! Reduction driver for specred.
//!
//! Turns an [`ObservationTable`] of raw frames into extracted, optionally
//! flux-calibrated spectra. Calibration products are resolved per setup and
//! detector through a [`CalibrationCache`](specred_calib::CalibrationCache);
//! the numerical work is delegated to the collaborator traits in
//! [`collab`], [`specred_calib::CalibrationSteps`] and [`flux`].
//!
//! # Run Phases
//!
//! 1. **Extract and write.** [`Orchestrator::run`] walks science exposures in
//!    table order. For each selected detector the [`DetectorDriver`] resolves
//!    the calibration chain and extracts the frame; the [`StandardManager`]
//!    then co-reduces the assigned standard with the same bundle. The
//!    exposure's spectra are written and its state released.
//! 2. **Flux.** After every science exposure is written, the
//!    [`FluxStage`] builds one sensitivity function and rewrites each file.
//!
//! # Failure Policy
//!
//! - Missing inputs, step failures and write failures are recorded against
//!   the exposure in the [`RunReport`]; the run continues.
//! - A corrupt master disqualifies its setup for the rest of the run.
//! - Dependency-order violations abort the run.

pub mod collab;
pub mod config;
pub mod driver;
pub mod error;
pub mod exposure;
pub mod flux;
pub mod orchestrator;
pub mod output;
pub mod report;
pub mod standard;
pub mod table;

#[cfg(test)]
pub(crate) mod testkit;

pub use collab::{Extraction, FrameLoader, ScienceReducer};
pub use config::{FluxConfig, MastersConfig, OutputConfig, ReductionConfig};
pub use driver::{DetectorDriver, DetectorResult};
pub use error::{ConfigError, LoadError, OutputError, ReduceError, ReduceResult};
pub use exposure::{DetectorState, Exposure, ReducedImages};
pub use flux::{FluxStage, SensFunc, SensFuncBuilder};
pub use orchestrator::{Collaborators, Orchestrator};
pub use output::{JsonSpectraWriter, Spec1dMeta, SpectraWriter};
pub use report::{ExposureFailure, FailureStage, RunReport, RunStatus};
pub use standard::StandardManager;
pub use table::{FrameRow, ObservationTable};
