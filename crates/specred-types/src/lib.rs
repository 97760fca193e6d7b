//! Foundation types for specred, a multi-detector spectrograph reduction
//! driver.
//!
//! This crate provides the identifiers, enumerations, and calibration
//! product values shared by every other specred crate.
//!
//! # Key Types
//!
//! - [`SetupId`] -- Instrument configuration on one detector; the unit of calibration sharing
//! - [`DetectorId`] -- 1-based detector number within the mosaic
//! - [`SciId`] -- Science-exposure bit identifier used to associate table rows
//! - [`RowIndex`] -- Position of a frame in the observation table
//! - [`ProductKind`] -- bias, arc, bpm, trace, tilt, flat, wave
//! - [`FrameType`] -- Role of a raw frame in the observation table
//! - [`CalibProduct`] -- A computed calibration product of any kind
//! - [`SpecObj`] -- One extracted 1D spectrum

pub mod error;
pub mod frame;
pub mod ids;
pub mod kind;
pub mod product;
pub mod spectrum;

pub use error::TypeError;
pub use frame::{Frame, FrameType};
pub use ids::{DetectorId, RowIndex, SciId, SetupId};
pub use kind::ProductKind;
pub use product::{
    ArcImage, BadPixelMask, BiasFrame, CalibProduct, FlatField, SlitTrace, TiltSolution,
    WaveSolution,
};
pub use spectrum::SpecObj;
