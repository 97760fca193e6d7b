//! Exposures and their per-detector state.

use serde::{Deserialize, Serialize};

use specred_calib::CalibrationBundle;
use specred_types::{DetectorId, Frame, FrameType, RowIndex, SciId, SpecObj};

use crate::error::{ReduceError, ReduceResult};
use crate::table::{FrameRow, ObservationTable};

/// Auxiliary 2D products of a science-frame reduction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReducedImages {
    /// Processed science image.
    pub sciimg: Frame,
    pub skymodel: Frame,
    /// Inverse variance of `sciimg`.
    pub ivar: Frame,
}

/// What one detector of an exposure has accumulated so far.
///
/// `calib` is set once, by the detector driver or (for standards) from the
/// science exposure's bundle. Later steps only read it.
#[derive(Clone, Debug, Default)]
pub struct DetectorState {
    pub calib: Option<CalibrationBundle>,
    pub specobjs: Vec<SpecObj>,
    pub images: Option<ReducedImages>,
    pub extracted: bool,
}

/// One science or standard-star integration.
#[derive(Clone, Debug)]
pub struct Exposure {
    pub row: RowIndex,
    /// Science exposure this one belongs to. For a standard, the first
    /// science exposure it was assigned to.
    pub sci_id: SciId,
    pub basename: String,
    pub target: String,
    /// Configuration group of the row.
    pub config: String,
    /// `Science` or `Standard`.
    pub role: FrameType,
    detectors: Vec<DetectorState>,
}

impl Exposure {
    /// Science exposure for a science row.
    pub fn science(table: &ObservationTable, row: RowIndex, ndet: u8) -> ReduceResult<Self> {
        let frame = table
            .row(row)
            .ok_or_else(|| ReduceError::Table(format!("{row} does not exist")))?;
        if !frame.is(FrameType::Science) {
            return Err(ReduceError::Table(format!(
                "{row} ({}) is not a science frame",
                frame.filename
            )));
        }
        let sci_id = SciId::new(frame.sci_id)?;
        Ok(Self::from_row(frame, row, sci_id, FrameType::Science, ndet))
    }

    /// Standard-star exposure for `row`, first assigned to `sci_id`.
    pub fn standard(
        table: &ObservationTable,
        row: RowIndex,
        sci_id: SciId,
        ndet: u8,
    ) -> ReduceResult<Self> {
        let frame = table
            .row(row)
            .ok_or_else(|| ReduceError::Table(format!("{row} does not exist")))?;
        if !frame.is(FrameType::Standard) {
            return Err(ReduceError::Table(format!(
                "{row} ({}) is not a standard frame",
                frame.filename
            )));
        }
        Ok(Self::from_row(frame, row, sci_id, FrameType::Standard, ndet))
    }

    fn from_row(frame: &FrameRow, row: RowIndex, sci_id: SciId, role: FrameType, ndet: u8) -> Self {
        Self {
            row,
            sci_id,
            basename: frame.basename().to_string(),
            target: frame.target.clone(),
            config: frame.setup.clone(),
            role,
            detectors: vec![DetectorState::default(); usize::from(ndet)],
        }
    }

    pub fn detector(&self, det: DetectorId) -> Option<&DetectorState> {
        self.detectors.get(det.slot())
    }

    pub fn detector_mut(&mut self, det: DetectorId) -> Option<&mut DetectorState> {
        self.detectors.get_mut(det.slot())
    }

    pub fn is_extracted(&self, det: DetectorId) -> bool {
        self.detector(det).is_some_and(|d| d.extracted)
    }

    /// Returns `true` if any detector has been extracted.
    pub fn any_extracted(&self) -> bool {
        self.detectors.iter().any(|d| d.extracted)
    }

    /// Extracted objects of every detector, in detector order.
    pub fn specobjs(&self) -> Vec<SpecObj> {
        self.detectors
            .iter()
            .flat_map(|d| d.specobjs.iter().cloned())
            .collect()
    }

    /// 2D products per extracted detector.
    pub fn images(&self) -> Vec<(DetectorId, &ReducedImages)> {
        DetectorId::all(self.detectors.len() as u8)
            .zip(&self.detectors)
            .filter_map(|(det, state)| state.images.as_ref().map(|img| (det, img)))
            .collect()
    }
}
