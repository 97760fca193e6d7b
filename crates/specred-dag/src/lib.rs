//! Calibration dependency DAG for specred.
//!
//! Declares which product kinds each calibration step consumes, validates
//! that the declaration is acyclic and closed, and answers readiness
//! queries ("may `tilt` be computed given what is already resolved?").

pub mod error;
pub mod graph;

pub use error::{DagError, DagResult};
pub use graph::DependencyGraph;
