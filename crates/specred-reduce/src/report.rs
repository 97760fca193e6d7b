use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use specred_calib::CacheStats;
use specred_types::DetectorId;

use crate::error::ReduceError;

/// Final status of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every exposure reduced and written.
    Success,
    /// Calibration completed but at least one exposure failed.
    Partial,
}

impl RunStatus {
    /// Process exit code: 0 for success, 1 otherwise.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Partial => 1,
        }
    }
}

/// Where in the run a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Reduce,
    Standard,
    Write,
    Flux,
}

/// One failed exposure, named so it is never dropped silently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureFailure {
    /// Basename of the exposure (or standard) that failed.
    pub exposure: String,
    pub detector: Option<DetectorId>,
    pub stage: FailureStage,
    pub error: String,
}

/// Outcome of [`Orchestrator::run`](crate::Orchestrator::run).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub failures: Vec<ExposureFailure>,
    /// Science spectra files, in table order.
    pub written: Vec<PathBuf>,
    pub standards_written: Vec<PathBuf>,
    /// Files rewritten by the flux stage.
    pub fluxed: Vec<PathBuf>,
    /// Standard the sensitivity function came from.
    pub flux_standard: Option<String>,
    pub cache: CacheStats,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            status: RunStatus::Success,
            failures: Vec::new(),
            written: Vec::new(),
            standards_written: Vec::new(),
            fluxed: Vec::new(),
            flux_standard: None,
            cache: CacheStats::default(),
            elapsed: Duration::ZERO,
        }
    }

    /// Record and log a failure.
    pub fn record(
        &mut self,
        exposure: &str,
        detector: Option<DetectorId>,
        stage: FailureStage,
        error: &ReduceError,
    ) {
        warn!(
            exposure,
            det = detector.map(|d| d.get()),
            ?stage,
            %error,
            "exposure failed"
        );
        self.failures.push(ExposureFailure {
            exposure: exposure.to_string(),
            detector,
            stage,
            error: error.to_string(),
        });
    }

    /// Failures recorded for `exposure`.
    pub fn failures_for<'a>(
        &'a self,
        exposure: &'a str,
    ) -> impl Iterator<Item = &'a ExposureFailure> + 'a {
        self.failures.iter().filter(move |f| f.exposure == exposure)
    }

    pub(crate) fn finish(mut self, cache: CacheStats) -> Self {
        self.cache = cache;
        self.status = if self.failures.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };
        self
    }
}
