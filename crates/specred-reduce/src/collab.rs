//! Numerical collaborators invoked by the driver.
//!
//! Raw-frame I/O and science-frame extraction are black boxes; the driver
//! only decides when to call them and what to hand over.

use specred_calib::{CalibrationBundle, StepContext, StepError};
use specred_types::{BiasFrame, DetectorId, Frame, FrameType, RowIndex, SpecObj};

use crate::error::LoadError;
use crate::exposure::ReducedImages;
use crate::table::ObservationTable;

/// Loads and stacks raw frames for one detector.
pub trait FrameLoader {
    /// Stack `rows` of `frame_type` on `detector`, subtracting `bias` when
    /// given.
    fn load_frames(
        &self,
        table: &ObservationTable,
        rows: &[RowIndex],
        detector: DetectorId,
        frame_type: FrameType,
        bias: Option<&BiasFrame>,
    ) -> Result<Frame, LoadError>;
}

/// Result of reducing one science or standard frame on one detector.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub specobjs: Vec<SpecObj>,
    pub images: ReducedImages,
}

/// Sky subtraction and object extraction for one frame.
pub trait ScienceReducer {
    /// Reduce `frame` with `calib`. `standard` is set when the frame is a
    /// standard star, which is extracted as a single bright object.
    fn reduce(
        &self,
        ctx: &StepContext<'_>,
        frame: &Frame,
        calib: &CalibrationBundle,
        standard: bool,
    ) -> Result<Extraction, StepError>;
}
