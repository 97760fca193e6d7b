use serde::{Deserialize, Serialize};

use crate::ids::DetectorId;

/// One extracted 1D object spectrum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecObj {
    /// Object name, e.g. `O0512-S0301-D01`.
    pub name: String,
    pub detector: DetectorId,
    /// Slit the object was found in (0-based).
    pub slit: usize,
    /// Spatial position of the trace centre, in pixels.
    pub spat_pixpos: f64,
    /// Wavelength per extracted pixel, in Angstrom.
    pub wave: Vec<f64>,
    /// Extracted counts.
    pub counts: Vec<f64>,
    /// Inverse variance of `counts`.
    pub counts_ivar: Vec<f64>,
    /// Flux-calibrated spectrum, set by the flux stage.
    pub flux: Option<Vec<f64>>,
    pub flux_ivar: Option<Vec<f64>>,
}

impl SpecObj {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn is_fluxed(&self) -> bool {
        self.flux.is_some()
    }
}
