//! Master calibration product storage for specred.
//!
//! A master is a calibration product persisted under its `(kind, setup)`
//! key so that later runs can load it instead of recomputing. The store
//! never interprets product contents beyond the framing needed to detect
//! corruption.
//!
//! # Storage Backends
//!
//! All backends implement the [`MasterStore`] trait:
//!
//! - [`InMemoryMasterStore`] -- `HashMap`-based store for tests and embedding
//! - [`DirectoryMasterStore`] -- one framed file per master in a directory
//!
//! # Design Rules
//!
//! 1. `load` distinguishes absence (`Ok(None)`) from corruption (`Err(Corrupt)`).
//! 2. Every persisted master is framed with magic, version, kind tag, length
//!    and CRC32; any mismatch is corruption, never a silent miss.
//! 3. Directory writes go to a temp file first and are renamed into place,
//!    so readers never observe a half-written master.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod codec;
pub mod directory;
pub mod error;
pub mod key;
pub mod memory;
pub mod traits;

pub use codec::{decode_master, encode_master, HEADER_SIZE};
pub use directory::DirectoryMasterStore;
pub use error::{StoreError, StoreResult};
pub use key::MasterKey;
pub use memory::InMemoryMasterStore;
pub use traits::MasterStore;
