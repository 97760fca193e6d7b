//! Per-detector reduction: resolve the calibration chain, then extract.

use tracing::{info, warn};

use specred_calib::{
    CalibError, CalibResult, CalibrationBundle, CalibrationCache, CalibrationSteps, StepContext,
    StepError, Upstream,
};
use specred_types::{
    BiasFrame, CalibProduct, DetectorId, Frame, FrameType, ProductKind, RowIndex, SetupId,
};

use crate::collab::{FrameLoader, ScienceReducer};
use crate::error::{ReduceError, ReduceResult};
use crate::exposure::Exposure;
use crate::table::ObservationTable;

/// Summary of one `(exposure, detector)` reduction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectorResult {
    pub setup: SetupId,
    pub detector: DetectorId,
    /// Objects extracted on this detector.
    pub nobj: usize,
}

/// Drives one exposure/detector pair through calibration and extraction.
pub struct DetectorDriver<'a> {
    table: &'a ObservationTable,
    loader: &'a dyn FrameLoader,
    steps: &'a dyn CalibrationSteps,
    science: &'a dyn ScienceReducer,
}

impl<'a> DetectorDriver<'a> {
    pub fn new(
        table: &'a ObservationTable,
        loader: &'a dyn FrameLoader,
        steps: &'a dyn CalibrationSteps,
        science: &'a dyn ScienceReducer,
    ) -> Self {
        Self {
            table,
            loader,
            steps,
            science,
        }
    }

    /// Resolve every calibration product for the exposure's setup on `det`,
    /// then reduce its science frame.
    pub fn reduce(
        &self,
        cache: &mut CalibrationCache,
        exposure: &mut Exposure,
        det: DetectorId,
    ) -> ReduceResult<DetectorResult> {
        let setup = SetupId::derive(&exposure.config, det);
        info!(exposure = %exposure.basename, %setup, det = %det.dnum(), "reducing detector");

        let bundle = self.resolve_calibrations(cache, exposure, det, &setup)?;
        let nobj = self.extract(exposure, det, bundle)?;
        Ok(DetectorResult {
            setup,
            detector: det,
            nobj,
        })
    }

    /// Walk the dependency graph in order, resolving each kind through the
    /// cache.
    pub fn resolve_calibrations(
        &self,
        cache: &mut CalibrationCache,
        exposure: &Exposure,
        det: DetectorId,
        setup: &SetupId,
    ) -> CalibResult<CalibrationBundle> {
        let ctx = StepContext {
            setup,
            detector: det,
            exposure: &exposure.basename,
        };
        for kind in cache.graph().topological_order() {
            cache.get_or_compute(setup, kind, |up| self.compute(&ctx, exposure, up))?;
        }
        cache.bundle(setup)
    }

    /// Load the exposure's own raw frame and extract it with `bundle`.
    ///
    /// Shared by science exposures and the standards co-reduced with them.
    pub fn extract(
        &self,
        exposure: &mut Exposure,
        det: DetectorId,
        bundle: CalibrationBundle,
    ) -> ReduceResult<usize> {
        let standard = exposure.role == FrameType::Standard;
        let frame = self.load_required(
            exposure,
            det,
            exposure.role,
            &[exposure.row],
            Some(bundle.bias()),
        )?;

        let setup = bundle.setup().clone();
        let ctx = StepContext {
            setup: &setup,
            detector: det,
            exposure: &exposure.basename,
        };
        let extraction = self
            .science
            .reduce(&ctx, &frame, &bundle, standard)
            .map_err(|source| ReduceError::Science {
                exposure: exposure.basename.clone(),
                detector: det,
                source,
            })?;

        let nobj = extraction.specobjs.len();
        let basename = exposure.basename.clone();
        let state = exposure.detector_mut(det).ok_or_else(|| {
            ReduceError::Table(format!("detector {det} outside the mosaic of {basename}"))
        })?;
        state.calib = Some(bundle);
        state.specobjs = extraction.specobjs;
        state.images = Some(extraction.images);
        state.extracted = true;
        info!(exposure = %basename, det = %det.dnum(), nobj, standard, "extracted");
        Ok(nobj)
    }

    fn compute(
        &self,
        ctx: &StepContext<'_>,
        exposure: &Exposure,
        up: &Upstream<'_>,
    ) -> CalibResult<CalibProduct> {
        let kind = up.kind();
        let det = ctx.detector;
        let step_failed = |source: StepError| CalibError::Step {
            setup: ctx.setup.clone(),
            kind,
            source,
        };

        let product = match kind {
            ProductKind::Bias => {
                let rows = self.rows(exposure, FrameType::Bias);
                let raw = if rows.is_empty() {
                    None
                } else {
                    Some(self.load_required(exposure, det, FrameType::Bias, &rows, None)?)
                };
                self.steps.bias(ctx, raw.as_ref()).map(CalibProduct::from)
            }
            ProductKind::Arc => {
                let rows = self.rows(exposure, FrameType::Arc);
                let raw = self.load_required(
                    exposure,
                    det,
                    FrameType::Arc,
                    &rows,
                    Some(up.bias()?.as_ref()),
                )?;
                self.steps.arc(ctx, &raw).map(CalibProduct::from)
            }
            ProductKind::Bpm => self
                .steps
                .bad_pixel_mask(ctx, up.bias()?, up.arc()?)
                .map(CalibProduct::from),
            ProductKind::Trace => {
                let rows = self.rows(exposure, FrameType::Trace);
                let raw = self.load_required(
                    exposure,
                    det,
                    FrameType::Trace,
                    &rows,
                    Some(up.bias()?.as_ref()),
                )?;
                self.steps.trace(ctx, &raw, up.bpm()?).map(CalibProduct::from)
            }
            ProductKind::Tilt => self
                .steps
                .tilt(ctx, up.arc()?, up.trace()?)
                .map(CalibProduct::from),
            ProductKind::Flat => {
                let rows = self.rows(exposure, FrameType::PixelFlat);
                let raw = if rows.is_empty() {
                    None
                } else {
                    Some(self.load_required(
                        exposure,
                        det,
                        FrameType::PixelFlat,
                        &rows,
                        Some(up.bias()?.as_ref()),
                    )?)
                };
                self.steps
                    .flat(ctx, raw.as_ref(), up.trace()?, up.tilt()?)
                    .map(CalibProduct::from)
            }
            ProductKind::Wave => self
                .steps
                .wave(ctx, up.arc()?, up.trace()?, up.tilt()?)
                .map(CalibProduct::from),
        };
        product.map_err(step_failed)
    }

    fn rows(&self, exposure: &Exposure, frame_type: FrameType) -> Vec<RowIndex> {
        self.table.rows_for(frame_type, exposure.sci_id)
    }

    /// Load frames that must exist; absence or a loader failure is a
    /// missing input for this exposure.
    fn load_required(
        &self,
        exposure: &Exposure,
        det: DetectorId,
        role: FrameType,
        rows: &[RowIndex],
        bias: Option<&BiasFrame>,
    ) -> CalibResult<Frame> {
        let missing = || CalibError::MissingInput {
            role,
            exposure: exposure.basename.clone(),
            detector: det,
        };
        if rows.is_empty() {
            return Err(missing());
        }
        self.loader
            .load_frames(self.table, rows, det, role, bias)
            .map_err(|e| {
                warn!(
                    exposure = %exposure.basename,
                    det = %det.dnum(),
                    %role,
                    error = %e,
                    "frame load failed"
                );
                missing()
            })
    }
}
