use specred_types::{
    ArcImage, BadPixelMask, BiasFrame, DetectorId, FlatField, Frame, SetupId, SlitTrace,
    TiltSolution, WaveSolution,
};

use crate::error::StepError;

/// Identity of the exposure/detector a step runs on behalf of.
#[derive(Clone, Copy, Debug)]
pub struct StepContext<'a> {
    pub setup: &'a SetupId,
    pub detector: DetectorId,
    /// Base filename of the science exposure that triggered the step.
    pub exposure: &'a str,
}

/// The numerical calibration steps, one per product kind.
///
/// Each method is a pure function of its stacked raw frames and its
/// declared upstream products. Raw frames arrive already bias-subtracted
/// where the step's kind depends on bias.
pub trait CalibrationSteps {
    /// Build the bias product. `raw` is the stacked bias frames, if the
    /// table holds any.
    fn bias(&self, ctx: &StepContext<'_>, raw: Option<&Frame>) -> Result<BiasFrame, StepError>;

    fn arc(&self, ctx: &StepContext<'_>, raw: &Frame) -> Result<ArcImage, StepError>;

    fn bad_pixel_mask(
        &self,
        ctx: &StepContext<'_>,
        bias: &BiasFrame,
        arc: &ArcImage,
    ) -> Result<BadPixelMask, StepError>;

    fn trace(
        &self,
        ctx: &StepContext<'_>,
        raw: &Frame,
        bpm: &BadPixelMask,
    ) -> Result<SlitTrace, StepError>;

    fn tilt(
        &self,
        ctx: &StepContext<'_>,
        arc: &ArcImage,
        trace: &SlitTrace,
    ) -> Result<TiltSolution, StepError>;

    /// Build the flat field. `raw` is the stacked pixel flats, if any; the
    /// trace frames double as pixel flats otherwise.
    fn flat(
        &self,
        ctx: &StepContext<'_>,
        raw: Option<&Frame>,
        trace: &SlitTrace,
        tilt: &TiltSolution,
    ) -> Result<FlatField, StepError>;

    fn wave(
        &self,
        ctx: &StepContext<'_>,
        arc: &ArcImage,
        trace: &SlitTrace,
        tilt: &TiltSolution,
    ) -> Result<WaveSolution, StepError>;
}
