use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of one instrument configuration on one detector.
///
/// Two exposures with the same `SetupId` share every calibration product.
/// The canonical rendering is `{config}_{det:02}`, e.g. `A_01`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SetupId(String);

impl SetupId {
    /// Derive the setup for a configuration group on a detector.
    pub fn derive(config: &str, det: DetectorId) -> Self {
        Self(format!("{config}_{:02}", det.get()))
    }

    /// Wrap an already-rendered setup string.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SetupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SetupId({})", self.0)
    }
}

impl fmt::Display for SetupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Detector number within the mosaic. Detectors are indexed from 1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DetectorId(u8);

impl DetectorId {
    pub fn new(det: u8) -> Result<Self, TypeError> {
        if det == 0 {
            return Err(TypeError::InvalidDetector(det));
        }
        Ok(Self(det))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based slot index into per-detector arrays.
    pub fn slot(&self) -> usize {
        usize::from(self.0 - 1)
    }

    /// Name used in file extensions and log lines, e.g. `det01`.
    pub fn dnum(&self) -> String {
        format!("det{:02}", self.0)
    }

    /// All detectors of a mosaic with `ndet` detectors, in order.
    pub fn all(ndet: u8) -> impl Iterator<Item = DetectorId> {
        (1..=ndet).map(DetectorId)
    }
}

impl TryFrom<u8> for DetectorId {
    type Error = TypeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DetectorId> for u8 {
    fn from(det: DetectorId) -> Self {
        det.0
    }
}

impl fmt::Debug for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DetectorId({})", self.0)
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Science-exposure identifier.
///
/// Each science exposure owns exactly one bit (1, 2, 4, 8, ...). Calibration
/// and standard rows carry a mask of every science exposure they serve, so
/// association is a bitwise test.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SciId(u32);

impl SciId {
    pub fn new(bit: u32) -> Result<Self, TypeError> {
        if bit.count_ones() != 1 {
            return Err(TypeError::InvalidSciId(bit));
        }
        Ok(Self(bit))
    }

    pub fn bit(&self) -> u32 {
        self.0
    }

    /// Returns `true` if a row with the given sci_ID mask serves this exposure.
    pub fn is_served_by(&self, mask: u32) -> bool {
        mask & self.0 != 0
    }
}

impl fmt::Debug for SciId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SciId({})", self.0)
    }
}

impl fmt::Display for SciId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a frame in the observation table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowIndex(pub usize);

impl fmt::Display for RowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.0)
    }
}
