use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The kind of a calibration product.
///
/// Ordering follows the canonical resolution order, so a `BTreeMap` keyed by
/// `ProductKind` iterates upstream products first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    /// Master bias image or overscan directive.
    Bias,
    /// Stacked, bias-subtracted arc-lamp image.
    Arc,
    /// Bad-pixel mask.
    Bpm,
    /// Slit edge traces.
    Trace,
    /// Spectral tilt solution.
    Tilt,
    /// Pixel-flat normalization and slit profiles.
    Flat,
    /// Wavelength solution and wavelength map.
    Wave,
}

impl ProductKind {
    /// Every kind, in canonical resolution order.
    pub const ALL: [ProductKind; 7] = [
        Self::Bias,
        Self::Arc,
        Self::Bpm,
        Self::Trace,
        Self::Tilt,
        Self::Flat,
        Self::Wave,
    ];

    /// Lower-case tag used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bias => "bias",
            Self::Arc => "arc",
            Self::Bpm => "bpm",
            Self::Trace => "trace",
            Self::Tilt => "tilt",
            Self::Flat => "flat",
            Self::Wave => "wave",
        }
    }

    /// Capitalised tag used in master file names (`MasterTrace_A_01`).
    pub fn master_tag(&self) -> &'static str {
        match self {
            Self::Bias => "Bias",
            Self::Arc => "Arc",
            Self::Bpm => "BadPix",
            Self::Trace => "Trace",
            Self::Tilt => "Tilts",
            Self::Flat => "Flat",
            Self::Wave => "Wave",
        }
    }

    /// Stable one-byte tag for on-disk headers.
    pub fn tag_byte(&self) -> u8 {
        match self {
            Self::Bias => 1,
            Self::Arc => 2,
            Self::Bpm => 3,
            Self::Trace => 4,
            Self::Tilt => 5,
            Self::Flat => 6,
            Self::Wave => 7,
        }
    }

    pub fn from_tag_byte(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag_byte() == tag)
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TypeError::UnknownKind(s.to_string()))
    }
}
