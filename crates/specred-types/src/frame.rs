use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A raw or processed detector image, row-major `(spectral, spatial)`.
pub type Frame = Array2<f32>;

/// Role of a raw frame in the observation table.
///
/// A single row may carry several roles (e.g. a twilight frame used both as
/// trace source and pixel flat).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Science,
    Standard,
    Bias,
    Arc,
    Trace,
    PixelFlat,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Science => "science",
            Self::Standard => "standard",
            Self::Bias => "bias",
            Self::Arc => "arc",
            Self::Trace => "trace",
            Self::PixelFlat => "pixelflat",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "science" => Ok(Self::Science),
            "standard" => Ok(Self::Standard),
            "bias" => Ok(Self::Bias),
            "arc" => Ok(Self::Arc),
            "trace" => Ok(Self::Trace),
            "pixelflat" => Ok(Self::PixelFlat),
            other => Err(TypeError::UnknownFrameType(other.to_string())),
        }
    }
}
