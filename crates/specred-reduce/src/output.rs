//! Spectra output: `spec1d_{basename}` and `spec2d_{basename}` files.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

use specred_types::{DetectorId, FrameType, RowIndex, SciId, SpecObj};

use crate::error::OutputError;
use crate::exposure::{Exposure, ReducedImages};

/// Header of a written spectra file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spec1dMeta {
    pub basename: String,
    pub target: String,
    /// `Science` or `Standard`.
    pub role: FrameType,
    pub sci_id: SciId,
    pub row: RowIndex,
    pub run_id: Uuid,
    pub written_at: DateTime<Utc>,
    /// Set by the flux stage.
    pub fluxed: bool,
    /// Target name of the standard the sensitivity function came from.
    pub flux_standard: Option<String>,
}

impl Spec1dMeta {
    pub fn for_exposure(exposure: &Exposure, run_id: Uuid) -> Self {
        Self {
            basename: exposure.basename.clone(),
            target: exposure.target.clone(),
            role: exposure.role,
            sci_id: exposure.sci_id,
            row: exposure.row,
            run_id,
            written_at: Utc::now(),
            fluxed: false,
            flux_standard: None,
        }
    }
}

/// Persists extracted spectra and reads them back.
pub trait SpectraWriter {
    /// Write (or overwrite) the spectra of `basename`, returning the path.
    fn write_spectra(
        &self,
        basename: &str,
        spectra: &[SpecObj],
        meta: &Spec1dMeta,
    ) -> Result<PathBuf, OutputError>;

    fn read_spectra(&self, path: &Path) -> Result<(Vec<SpecObj>, Spec1dMeta), OutputError>;

    /// Write the 2D products of `basename`. Nothing is written when
    /// `images` is empty.
    fn write_images(
        &self,
        basename: &str,
        images: &[(DetectorId, &ReducedImages)],
    ) -> Result<Option<PathBuf>, OutputError>;
}

#[derive(Serialize, Deserialize)]
struct Spec1dFile {
    meta: Spec1dMeta,
    specobjs: Vec<SpecObj>,
}

#[derive(Serialize)]
struct Spec2dEntry<'a> {
    detector: DetectorId,
    #[serde(flatten)]
    images: &'a ReducedImages,
}

/// JSON files in one output directory.
///
/// Files are written to a temp file in the same directory and renamed into
/// place, so the flux stage's rewrite never leaves a truncated file.
#[derive(Debug, Clone)]
pub struct JsonSpectraWriter {
    dir: PathBuf,
}

impl JsonSpectraWriter {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, OutputError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn spec1d_path(&self, basename: &str) -> PathBuf {
        self.dir.join(format!("spec1d_{basename}.json"))
    }

    pub fn spec2d_path(&self, basename: &str) -> PathBuf {
        self.dir.join(format!("spec2d_{basename}.json"))
    }

    fn persist(&self, path: &Path, bytes: &[u8]) -> Result<(), OutputError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| OutputError::Io(e.error))?;
        Ok(())
    }
}

impl SpectraWriter for JsonSpectraWriter {
    fn write_spectra(
        &self,
        basename: &str,
        spectra: &[SpecObj],
        meta: &Spec1dMeta,
    ) -> Result<PathBuf, OutputError> {
        let file = Spec1dFile {
            meta: meta.clone(),
            specobjs: spectra.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| OutputError::Serialization(e.to_string()))?;
        let path = self.spec1d_path(basename);
        self.persist(&path, &bytes)?;
        debug!(path = %path.display(), nobj = spectra.len(), "wrote spec1d");
        Ok(path)
    }

    fn read_spectra(&self, path: &Path) -> Result<(Vec<SpecObj>, Spec1dMeta), OutputError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OutputError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let file: Spec1dFile = serde_json::from_slice(&bytes)
            .map_err(|e| OutputError::Serialization(e.to_string()))?;
        Ok((file.specobjs, file.meta))
    }

    fn write_images(
        &self,
        basename: &str,
        images: &[(DetectorId, &ReducedImages)],
    ) -> Result<Option<PathBuf>, OutputError> {
        if images.is_empty() {
            return Ok(None);
        }
        let entries: Vec<Spec2dEntry<'_>> = images
            .iter()
            .map(|(detector, images)| Spec2dEntry {
                detector: *detector,
                images,
            })
            .collect();
        let bytes =
            serde_json::to_vec(&entries).map_err(|e| OutputError::Serialization(e.to_string()))?;
        let path = self.spec2d_path(basename);
        self.persist(&path, &bytes)?;
        debug!(path = %path.display(), detectors = images.len(), "wrote spec2d");
        Ok(Some(path))
    }
}
