//! Per-run calibration cache for specred.
//!
//! Calibration products (bias, arc, bad-pixel mask, slit trace, tilt, flat,
//! wavelength solution) are expensive and shared by every exposure taken
//! with the same setup. The [`CalibrationCache`] memoizes them per setup for
//! one run, falls back to persisted masters when asked to, and hands
//! consumers an immutable [`CalibrationBundle`].
//!
//! # Design Rules
//!
//! 1. A `(setup, kind)` product is computed at most once per run; every
//!    consumer observes the same allocation.
//! 2. A step only sees the products its kind declares in the dependency
//!    graph, and only once they are resolved.
//! 3. A corrupt master disqualifies its setup for the rest of the run.
//!    Other store failures degrade to recomputation.
//! 4. The numerical steps live behind [`CalibrationSteps`]; the cache never
//!    looks inside a product.

pub mod bundle;
pub mod cache;
pub mod error;
pub mod policy;
pub mod record;
pub mod steps;

pub use bundle::CalibrationBundle;
pub use cache::{CacheStats, CalibrationCache, Upstream};
pub use error::{CalibError, CalibResult, StepError};
pub use policy::{MasterMode, MasterPolicy};
pub use record::CalibRecord;
pub use steps::{CalibrationSteps, StepContext};
