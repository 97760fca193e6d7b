//! The observation table: one row per raw frame.

use serde::{Deserialize, Serialize};

use specred_types::{FrameType, RowIndex, SciId};

/// One raw frame and the roles it plays.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRow {
    pub filename: String,
    pub frame_types: Vec<FrameType>,
    /// Bitmask of the science exposures this frame serves. A science row
    /// carries exactly its own bit.
    pub sci_id: u32,
    pub target: String,
    /// Configuration group, e.g. `A`.
    pub setup: String,
    /// Binning as written by the instrument, e.g. `1,1`.
    pub binning: String,
}

impl FrameRow {
    pub fn is(&self, frame_type: FrameType) -> bool {
        self.frame_types.contains(&frame_type)
    }

    /// Filename without directory or extension.
    pub fn basename(&self) -> &str {
        let name = self
            .filename
            .rsplit('/')
            .next()
            .unwrap_or(self.filename.as_str());
        match name.find('.') {
            Some(dot) if dot > 0 => &name[..dot],
            _ => name,
        }
    }
}

/// Read-only table of every frame in the run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationTable {
    rows: Vec<FrameRow>,
}

impl ObservationTable {
    pub fn new(rows: Vec<FrameRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[FrameRow] {
        &self.rows
    }

    pub fn row(&self, index: RowIndex) -> Option<&FrameRow> {
        self.rows.get(index.0)
    }

    /// Science rows in table order.
    pub fn science_rows(&self) -> impl Iterator<Item = RowIndex> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.is(FrameType::Science))
            .map(|(i, _)| RowIndex(i))
    }

    /// Rows of `frame_type` serving science exposure `sci`, in table order.
    pub fn rows_for(&self, frame_type: FrameType, sci: SciId) -> Vec<RowIndex> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.is(frame_type) && sci.is_served_by(row.sci_id))
            .map(|(i, _)| RowIndex(i))
            .collect()
    }
}
