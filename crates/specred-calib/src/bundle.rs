//! Immutable calibration bundle shared by science and standard reductions.

use std::sync::Arc;

use specred_types::{
    BadPixelMask, BiasFrame, FlatField, ProductKind, SetupId, SlitTrace, TiltSolution,
    WaveSolution,
};

use crate::error::{CalibError, CalibResult};
use crate::record::CalibRecord;

/// Every calibration product a science-frame reduction consumes, for one
/// setup.
///
/// Products are shared, not copied: two bundles built from the same record
/// point at the same allocations, so a standard star reduced with a science
/// frame's bundle sees exactly the science frame's calibration.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationBundle {
    setup: SetupId,
    bias: Arc<BiasFrame>,
    bpm: Arc<BadPixelMask>,
    trace: Arc<SlitTrace>,
    tilt: Arc<TiltSolution>,
    flat: Arc<FlatField>,
    wave: Arc<WaveSolution>,
    /// One entry per traced slit; `true` excludes the slit from extraction.
    slit_mask: Vec<bool>,
}

impl CalibrationBundle {
    /// Kinds a bundle carries.
    pub const KINDS: [ProductKind; 6] = [
        ProductKind::Bias,
        ProductKind::Bpm,
        ProductKind::Trace,
        ProductKind::Tilt,
        ProductKind::Flat,
        ProductKind::Wave,
    ];

    /// Assemble a bundle from a fully resolved record.
    pub fn from_record(setup: SetupId, record: &CalibRecord) -> CalibResult<Self> {
        let missing: Vec<ProductKind> = Self::KINDS
            .into_iter()
            .filter(|kind| !record.contains(*kind))
            .collect();
        if !missing.is_empty() {
            return Err(CalibError::IncompleteBundle { setup, missing });
        }

        let fetch = |kind| {
            record.get(kind).ok_or_else(|| CalibError::IncompleteBundle {
                setup: setup.clone(),
                missing: vec![kind],
            })
        };
        let bias = Arc::clone(fetch(ProductKind::Bias)?.as_bias()?);
        let bpm = Arc::clone(fetch(ProductKind::Bpm)?.as_bpm()?);
        let trace = Arc::clone(fetch(ProductKind::Trace)?.as_trace()?);
        let tilt = Arc::clone(fetch(ProductKind::Tilt)?.as_tilt()?);
        let flat = Arc::clone(fetch(ProductKind::Flat)?.as_flat()?);
        let wave = Arc::clone(fetch(ProductKind::Wave)?.as_wave()?);
        let slit_mask = vec![false; trace.nslits()];

        Ok(Self {
            setup,
            bias,
            bpm,
            trace,
            tilt,
            flat,
            wave,
            slit_mask,
        })
    }

    pub fn setup(&self) -> &SetupId {
        &self.setup
    }

    pub fn bias(&self) -> &BiasFrame {
        &self.bias
    }

    pub fn bpm(&self) -> &BadPixelMask {
        &self.bpm
    }

    pub fn trace(&self) -> &SlitTrace {
        &self.trace
    }

    pub fn tilt(&self) -> &TiltSolution {
        &self.tilt
    }

    pub fn flat(&self) -> &FlatField {
        &self.flat
    }

    pub fn wave(&self) -> &WaveSolution {
        &self.wave
    }

    pub fn slit_mask(&self) -> &[bool] {
        &self.slit_mask
    }

    pub fn nslits(&self) -> usize {
        self.slit_mask.len()
    }

    /// Returns `true` if both bundles reference the same product
    /// allocations, not merely equal values.
    pub fn shares_products_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bias, &other.bias)
            && Arc::ptr_eq(&self.bpm, &other.bpm)
            && Arc::ptr_eq(&self.trace, &other.trace)
            && Arc::ptr_eq(&self.tilt, &other.tilt)
            && Arc::ptr_eq(&self.flat, &other.flat)
            && Arc::ptr_eq(&self.wave, &other.wave)
    }
}
