//! Deferred flux calibration.
//!
//! Runs after every science exposure has been written. A standard may be
//! reduced after the science frames it calibrates, so fluxing re-reads each
//! written file, applies the sensitivity function, and rewrites it in place.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use specred_types::SpecObj;

use crate::config::FluxConfig;
use crate::error::{OutputError, ReduceError};
use crate::output::SpectraWriter;
use crate::report::{FailureStage, RunReport};
use crate::standard::StandardManager;

/// Spectral response derived from one standard star.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensFunc {
    /// Target name of the standard.
    pub std_name: String,
    /// Wavelength grid, in Angstrom.
    pub wave: Vec<f64>,
    /// Flux per count on `wave`.
    pub response: Vec<f64>,
}

/// Builds and applies sensitivity functions.
pub trait SensFuncBuilder {
    /// Fit a sensitivity function to the extracted spectra of a standard.
    fn build(&self, std_name: &str, spectra: &[SpecObj]) -> Result<SensFunc, OutputError>;

    /// Load a previously fitted sensitivity function from a JSON file.
    fn load_archival(&self, path: &Path) -> Result<SensFunc, OutputError> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            OutputError::SensFunc(format!("cannot parse {}: {e}", path.display()))
        })
    }

    /// Fill `flux` and `flux_ivar` of every spectrum.
    fn apply(&self, sensfunc: &SensFunc, spectra: &mut [SpecObj]) -> Result<(), OutputError>;
}

/// The second pass of a run: calibrate and rewrite written spectra.
pub struct FluxStage<'a> {
    config: &'a FluxConfig,
    writer: &'a dyn SpectraWriter,
    builder: &'a dyn SensFuncBuilder,
}

impl<'a> FluxStage<'a> {
    pub fn new(
        config: &'a FluxConfig,
        writer: &'a dyn SpectraWriter,
        builder: &'a dyn SensFuncBuilder,
    ) -> Self {
        Self {
            config,
            writer,
            builder,
        }
    }

    /// Flux every file in `report.written`.
    ///
    /// Does nothing unless fluxing is enabled and at least one standard was
    /// reduced. The sensitivity function comes from the archival file when
    /// configured, else from the first standard of the run. Failures are
    /// recorded per file; the stage continues with the next one.
    pub fn apply(&self, standards: &StandardManager, report: &mut RunReport) {
        if !self.config.enabled {
            debug!("flux calibration disabled");
            return;
        }
        if !standards.any_reduced() {
            info!("no standard star reduced; skipping flux calibration");
            return;
        }

        let sensfunc = match self.sensitivity(standards) {
            Ok(sensfunc) => sensfunc,
            Err((target, source)) => {
                let error = ReduceError::Flux {
                    target: target.clone(),
                    source,
                };
                report.record(&target, None, FailureStage::Flux, &error);
                return;
            }
        };
        info!(
            standard = %sensfunc.std_name,
            files = report.written.len(),
            "applying sensitivity function"
        );
        report.flux_standard = Some(sensfunc.std_name.clone());

        for path in report.written.clone() {
            match self.flux_file(&path, &sensfunc) {
                Ok(()) => report.fluxed.push(path),
                Err(source) => {
                    let target = file_label(&path);
                    let error = ReduceError::Flux {
                        target: target.clone(),
                        source,
                    };
                    report.record(&target, None, FailureStage::Flux, &error);
                }
            }
        }
    }

    /// Archival file if configured, otherwise built from the first standard.
    fn sensitivity(&self, standards: &StandardManager) -> Result<SensFunc, (String, OutputError)> {
        if let Some(path) = &self.config.archival_sensfunc {
            debug!(path = %path.display(), "loading archival sensitivity function");
            return self
                .builder
                .load_archival(path)
                .map_err(|e| (file_label(path), e));
        }

        let Some(standard) = standards.first() else {
            return Err((
                String::from("standard"),
                OutputError::SensFunc("no standard star in run".into()),
            ));
        };
        if standards.len() > 1 {
            info!(
                standard = %standard.basename,
                available = standards.len(),
                "using the first standard for the sensitivity function"
            );
        }
        self.builder
            .build(&standard.target, &standard.specobjs())
            .map_err(|e| (standard.basename.clone(), e))
    }

    fn flux_file(&self, path: &Path, sensfunc: &SensFunc) -> Result<(), OutputError> {
        let (mut spectra, mut meta) = self.writer.read_spectra(path)?;
        self.builder.apply(sensfunc, &mut spectra)?;
        meta.fluxed = true;
        meta.flux_standard = Some(sensfunc.std_name.clone());
        self.writer.write_spectra(&meta.basename, &spectra, &meta)?;
        info!(exposure = %meta.basename, nobj = spectra.len(), "fluxed");
        Ok(())
    }
}

fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
