//! Calibration product values.
//!
//! Each product kind has a dedicated value type; [`CalibProduct`] is the sum
//! type the cache and the master store traffic in. The numerical contents are
//! produced by external step functions and are opaque to the driver, which
//! only moves them around.

use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::frame::Frame;
use crate::kind::ProductKind;

// ---------------------------------------------------------------------------
// Per-kind values
// ---------------------------------------------------------------------------

/// Bias handling for a setup: a master image, or a directive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BiasFrame {
    /// Stacked master bias image.
    Image(Frame),
    /// Subtract the overscan region instead of an image.
    Overscan,
    /// No bias subtraction.
    None,
}

impl BiasFrame {
    pub fn image(&self) -> Option<&Frame> {
        match self {
            Self::Image(img) => Some(img),
            _ => None,
        }
    }
}

/// Stacked, bias-subtracted arc image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArcImage {
    pub image: Frame,
}

impl ArcImage {
    pub fn shape(&self) -> (usize, usize) {
        self.image.dim()
    }
}

/// Bad-pixel mask; non-zero marks a bad pixel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BadPixelMask {
    pub mask: Array2<u8>,
}

impl BadPixelMask {
    pub fn count_bad(&self) -> usize {
        self.mask.iter().filter(|&&v| v != 0).count()
    }
}

/// Slit edge traces. Column `i` of each edge array describes slit `i`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlitTrace {
    /// Left edge position per spectral row.
    pub lcen: Array2<f64>,
    /// Right edge position per spectral row.
    pub rcen: Array2<f64>,
    /// Integer slit centre per spectral row.
    pub pixcen: Array2<i64>,
    /// Slit width in pixels.
    pub pixwid: Vec<i64>,
    /// Pixel-level slit membership image (0 = off-slit, n = slit n).
    pub slitpix: Array2<i64>,
}

impl SlitTrace {
    pub fn nslits(&self) -> usize {
        self.lcen.ncols()
    }
}

/// Spectral tilt solution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TiltSolution {
    pub tilts: Array2<f64>,
    /// Saturated pixels found while fitting arc lines.
    pub satmask: Array2<u8>,
}

/// Pixel-flat normalization and slit illumination profiles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlatField {
    pub pixelflat_norm: Array2<f64>,
    pub slit_profiles: Array2<f64>,
}

/// Wavelength calibration: 1D per-slit solution and the derived 2D map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaveSolution {
    /// Polynomial coefficients per slit, lowest order first.
    pub coefficients: Vec<Vec<f64>>,
    /// RMS of the fit per slit, in pixels.
    pub rms: Vec<f64>,
    /// Wavelength at every detector pixel, in Angstrom.
    pub wave_map: Array2<f64>,
}

// ---------------------------------------------------------------------------
// CalibProduct
// ---------------------------------------------------------------------------

/// A calibration product of any kind.
///
/// Payloads sit behind `Arc`, so cloning a product shares the underlying
/// arrays. Every consumer of a cached product observes the same allocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CalibProduct {
    Bias(Arc<BiasFrame>),
    Arc(Arc<ArcImage>),
    Bpm(Arc<BadPixelMask>),
    Trace(Arc<SlitTrace>),
    Tilt(Arc<TiltSolution>),
    Flat(Arc<FlatField>),
    Wave(Arc<WaveSolution>),
}

macro_rules! typed_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("Borrow as [`", stringify!($ty), "`], or fail with a kind mismatch.")]
        pub fn $name(&self) -> Result<&Arc<$ty>, TypeError> {
            match self {
                Self::$variant(inner) => Ok(inner),
                other => Err(TypeError::KindMismatch {
                    expected: ProductKind::$variant,
                    actual: other.kind(),
                }),
            }
        }
    };
}

impl CalibProduct {
    pub fn kind(&self) -> ProductKind {
        match self {
            Self::Bias(_) => ProductKind::Bias,
            Self::Arc(_) => ProductKind::Arc,
            Self::Bpm(_) => ProductKind::Bpm,
            Self::Trace(_) => ProductKind::Trace,
            Self::Tilt(_) => ProductKind::Tilt,
            Self::Flat(_) => ProductKind::Flat,
            Self::Wave(_) => ProductKind::Wave,
        }
    }

    /// Returns `true` if both products share the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bias(a), Self::Bias(b)) => Arc::ptr_eq(a, b),
            (Self::Arc(a), Self::Arc(b)) => Arc::ptr_eq(a, b),
            (Self::Bpm(a), Self::Bpm(b)) => Arc::ptr_eq(a, b),
            (Self::Trace(a), Self::Trace(b)) => Arc::ptr_eq(a, b),
            (Self::Tilt(a), Self::Tilt(b)) => Arc::ptr_eq(a, b),
            (Self::Flat(a), Self::Flat(b)) => Arc::ptr_eq(a, b),
            (Self::Wave(a), Self::Wave(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    typed_accessor!(as_bias, Bias, BiasFrame);
    typed_accessor!(as_arc, Arc, ArcImage);
    typed_accessor!(as_bpm, Bpm, BadPixelMask);
    typed_accessor!(as_trace, Trace, SlitTrace);
    typed_accessor!(as_tilt, Tilt, TiltSolution);
    typed_accessor!(as_flat, Flat, FlatField);
    typed_accessor!(as_wave, Wave, WaveSolution);
}

macro_rules! product_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for CalibProduct {
            fn from(value: $ty) -> Self {
                Self::$variant(Arc::new(value))
            }
        }
    };
}

product_from!(BiasFrame, Bias);
product_from!(ArcImage, Arc);
product_from!(BadPixelMask, Bpm);
product_from!(SlitTrace, Trace);
product_from!(TiltSolution, Tilt);
product_from!(FlatField, Flat);
product_from!(WaveSolution, Wave);
