use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use specred_calib::{CalibrationCache, CalibrationSteps};
use specred_types::DetectorId;

use crate::collab::{FrameLoader, ScienceReducer};
use crate::config::ReductionConfig;
use crate::driver::DetectorDriver;
use crate::error::{ReduceError, ReduceResult};
use crate::exposure::Exposure;
use crate::flux::{FluxStage, SensFuncBuilder};
use crate::output::{Spec1dMeta, SpectraWriter};
use crate::report::{FailureStage, RunReport};
use crate::standard::StandardManager;
use crate::table::ObservationTable;

/// The external components a run calls out to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub loader: &'a dyn FrameLoader,
    pub steps: &'a dyn CalibrationSteps,
    pub science: &'a dyn ScienceReducer,
    pub writer: &'a dyn SpectraWriter,
    pub sensfunc: &'a dyn SensFuncBuilder,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Reduces every science exposure of a table, then fluxes the results.
///
/// A run has two phases separated by a barrier:
///
/// 1. For each science exposure in table order: reduce every selected
///    detector, co-reduce its standard star, write its spectra, and release
///    it.
/// 2. Once every science exposure is written: write the standards, then
///    flux every written file from one standard.
///
/// Per-exposure failures are recorded in the [`RunReport`] and the run
/// moves on. Contract violations abort the run with `Err`.
pub struct Orchestrator<'a> {
    config: &'a ReductionConfig,
    table: &'a ObservationTable,
    collab: Collaborators<'a>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a ReductionConfig,
        table: &'a ObservationTable,
        collab: Collaborators<'a>,
    ) -> Self {
        Self {
            config,
            table,
            collab,
        }
    }

    pub fn config(&self) -> &ReductionConfig {
        self.config
    }

    /// Run the reduction against `cache`.
    ///
    /// The cache is owned by the caller so one run's calibrations can be
    /// inspected afterwards; nothing else survives between runs.
    pub fn run(&self, cache: &mut CalibrationCache) -> ReduceResult<RunReport> {
        self.config.validate()?;
        let start = Instant::now();
        let run_id = Uuid::now_v7();
        let mut report = RunReport::new(run_id);
        let driver = DetectorDriver::new(
            self.table,
            self.collab.loader,
            self.collab.steps,
            self.collab.science,
        );
        let mut standards = StandardManager::from_table(self.table, self.config.ndet)?;
        info!(
            %run_id,
            frames = self.table.len(),
            standards = standards.len(),
            mode = %cache.policy().mode,
            "starting reduction run"
        );

        // Phase 1: extract and write.
        for row in self.table.science_rows() {
            let mut exposure = match Exposure::science(self.table, row, self.config.ndet) {
                Ok(exposure) => exposure,
                Err(e) => {
                    let name = self
                        .table
                        .row(row)
                        .map(|frame| frame.basename().to_string())
                        .unwrap_or_else(|| row.to_string());
                    warn!(exposure = %name, error = %e, "invalid science row; skipping");
                    report.record(&name, None, FailureStage::Reduce, &e);
                    continue;
                }
            };
            let completed =
                self.reduce_exposure(&driver, cache, &mut standards, &mut exposure, &mut report)?;
            if !completed {
                continue;
            }
            if !exposure.any_extracted() {
                debug!(exposure = %exposure.basename, "no detector reduced; nothing to write");
                continue;
            }
            if let Some(path) = self.write_exposure(&exposure, run_id, &mut report) {
                report.written.push(path);
            }
            // `exposure` is released here; only the file remains.
        }

        // Phase 2: standards, then flux.
        for standard in standards.iter().filter(|s| s.any_extracted()) {
            if let Some(path) = self.write_exposure(standard, run_id, &mut report) {
                report.standards_written.push(path);
            }
        }
        FluxStage::new(&self.config.flux, self.collab.writer, self.collab.sensfunc)
            .apply(&standards, &mut report);

        report.elapsed = start.elapsed();
        let report = report.finish(cache.stats().clone());
        info!(
            %run_id,
            status = ?report.status,
            written = report.written.len(),
            failures = report.failures.len(),
            computes = report.cache.total_computes(),
            "reduction run finished"
        );
        Ok(report)
    }

    /// Reduce every selected detector of `exposure`, co-reducing its
    /// standard after each one.
    ///
    /// Returns `false` if a detector failed, which abandons the exposure.
    fn reduce_exposure(
        &self,
        driver: &DetectorDriver<'_>,
        cache: &mut CalibrationCache,
        standards: &mut StandardManager,
        exposure: &mut Exposure,
        report: &mut RunReport,
    ) -> ReduceResult<bool> {
        info!(exposure = %exposure.basename, target = %exposure.target, "reducing exposure");
        for det in DetectorId::all(self.config.ndet) {
            if !self.config.is_selected(det) {
                warn!(exposure = %exposure.basename, det = %det.dnum(), "skipping detector");
                continue;
            }

            match driver.reduce(cache, exposure, det) {
                Ok(result) => debug!(det = %det.dnum(), nobj = result.nobj, "detector done"),
                Err(e) if e.is_contract_violation() => return Err(e),
                Err(e) => {
                    report.record(&exposure.basename, Some(det), FailureStage::Reduce, &e);
                    return Ok(false);
                }
            }

            let Some(calib) = exposure.detector(det).and_then(|s| s.calib.clone()) else {
                continue;
            };
            if let Err(e) = standards.ensure_standard_reduced(driver, exposure, det, &calib) {
                if e.is_contract_violation() {
                    return Err(e);
                }
                let name = standards
                    .assignment(exposure.sci_id)
                    .and_then(|row| standards.get(row))
                    .map_or_else(|| exposure.basename.clone(), |s| s.basename.clone());
                report.record(&name, Some(det), FailureStage::Standard, &e);
            }
        }
        Ok(true)
    }

    /// Write spectra and 2D images; a failure is recorded against the
    /// exposure.
    fn write_exposure(
        &self,
        exposure: &Exposure,
        run_id: Uuid,
        report: &mut RunReport,
    ) -> Option<PathBuf> {
        let writer = self.collab.writer;
        let meta = Spec1dMeta::for_exposure(exposure, run_id);
        let written = writer
            .write_spectra(&exposure.basename, &exposure.specobjs(), &meta)
            .and_then(|path| {
                writer.write_images(&exposure.basename, &exposure.images())?;
                Ok(path)
            });
        match written {
            Ok(path) => {
                info!(exposure = %exposure.basename, path = %path.display(), "wrote spectra");
                Some(path)
            }
            Err(source) => {
                let error = ReduceError::WriteFailure {
                    exposure: exposure.basename.clone(),
                    source,
                };
                report.record(&exposure.basename, None, FailureStage::Write, &error);
                None
            }
        }
    }
}
