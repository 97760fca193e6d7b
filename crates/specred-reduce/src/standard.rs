//! Standard-star co-reduction.
//!
//! A standard is reduced on a detector the first time a science exposure it
//! serves finishes that detector, using the science exposure's calibration
//! bundle as is. The standard never resolves calibrations of its own, so it
//! cannot diverge from the science frames it will flux.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use specred_calib::CalibrationBundle;
use specred_types::{DetectorId, FrameType, RowIndex, SciId};

use crate::driver::DetectorDriver;
use crate::error::ReduceResult;
use crate::exposure::Exposure;
use crate::table::ObservationTable;

/// Standard-star exposures of a run and the science exposures they serve.
#[derive(Debug, Default)]
pub struct StandardManager {
    /// Science exposure -> standard row.
    assignments: BTreeMap<SciId, RowIndex>,
    /// Standards keyed by row, in first-assignment order.
    standards: IndexMap<RowIndex, Exposure>,
    /// `(standard, detector)` pairs whose reduction failed; never retried.
    failed: BTreeSet<(RowIndex, DetectorId)>,
}

impl StandardManager {
    /// Assign standards to every science exposure, in table order.
    ///
    /// When several standards serve one science exposure the first row wins.
    /// A standard serving several science exposures is created once.
    pub fn from_table(table: &ObservationTable, ndet: u8) -> ReduceResult<Self> {
        let mut manager = Self::default();
        for sci_row in table.science_rows() {
            let Some(frame) = table.row(sci_row) else {
                continue;
            };
            let sci_id = match SciId::new(frame.sci_id) {
                Ok(sci_id) => sci_id,
                Err(e) => {
                    warn!(
                        science = %frame.filename,
                        error = %e,
                        "invalid science row; no standard assigned"
                    );
                    continue;
                }
            };
            let candidates = table.rows_for(FrameType::Standard, sci_id);
            let Some(&std_row) = candidates.first() else {
                continue;
            };
            if candidates.len() > 1 {
                warn!(
                    science = %frame.filename,
                    standards = candidates.len(),
                    "several standards qualify; only the first is reduced"
                );
            }
            manager.assignments.insert(sci_id, std_row);
            if !manager.standards.contains_key(&std_row) {
                let standard = Exposure::standard(table, std_row, sci_id, ndet)?;
                debug!(standard = %standard.basename, science = %frame.filename, "assigned standard");
                manager.standards.insert(std_row, standard);
            }
        }
        Ok(manager)
    }

    pub fn len(&self) -> usize {
        self.standards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.standards.is_empty()
    }

    /// Standard row assigned to `sci`, if any.
    pub fn assignment(&self, sci: SciId) -> Option<RowIndex> {
        self.assignments.get(&sci).copied()
    }

    pub fn get(&self, row: RowIndex) -> Option<&Exposure> {
        self.standards.get(&row)
    }

    /// First standard in assignment order.
    pub fn first(&self) -> Option<&Exposure> {
        self.standards.values().next()
    }

    /// All standards in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = &Exposure> {
        self.standards.values()
    }

    /// Returns `true` if any standard was extracted on any detector.
    pub fn any_reduced(&self) -> bool {
        self.standards.values().any(Exposure::any_extracted)
    }

    /// Reduce the standard assigned to `science` on `det`, unless it already
    /// has been (or has failed there).
    ///
    /// `calib` must be the bundle the science exposure was reduced with on
    /// `det`. Returns `true` if the standard was reduced by this call.
    pub fn ensure_standard_reduced(
        &mut self,
        driver: &DetectorDriver<'_>,
        science: &Exposure,
        det: DetectorId,
        calib: &CalibrationBundle,
    ) -> ReduceResult<bool> {
        let Some(row) = self.assignment(science.sci_id) else {
            return Ok(false);
        };
        if self.failed.contains(&(row, det)) {
            return Ok(false);
        }
        let Some(standard) = self.standards.get_mut(&row) else {
            return Ok(false);
        };
        if standard.is_extracted(det) {
            debug!(standard = %standard.basename, det = %det.dnum(), "standard already reduced");
            return Ok(false);
        }

        info!(
            standard = %standard.basename,
            science = %science.basename,
            det = %det.dnum(),
            "co-reducing standard"
        );
        match driver.extract(standard, det, calib.clone()) {
            Ok(_) => Ok(true),
            Err(e) => {
                self.failed.insert((row, det));
                Err(e)
            }
        }
    }
}
