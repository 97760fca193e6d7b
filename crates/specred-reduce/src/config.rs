use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use specred_calib::{CalibrationCache, MasterMode, MasterPolicy};
use specred_store::DirectoryMasterStore;
use specred_types::DetectorId;

use crate::error::{ConfigError, OutputError, ReduceResult};
use crate::output::JsonSpectraWriter;

/// Run configuration for one reduction.
///
/// ```toml
/// ndet = 2
/// detnum = [2]
///
/// [masters]
/// mode = "reuse"
/// save = true
/// directory = "MF_kast_blue"
///
/// [flux]
/// enabled = true
///
/// [output]
/// science_dir = "Science"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReductionConfig {
    /// Number of detectors in the mosaic, numbered from 1.
    pub ndet: u8,
    /// Only reduce these detectors, when set.
    pub detnum: Option<Vec<u8>>,
    pub masters: MastersConfig,
    pub flux: FluxConfig,
    pub output: OutputConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MastersConfig {
    pub mode: MasterMode,
    /// Persist computed products as masters.
    pub save: bool,
    pub directory: PathBuf,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FluxConfig {
    pub enabled: bool,
    /// Load the sensitivity function from this file instead of building it.
    pub archival_sensfunc: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub science_dir: PathBuf,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            ndet: 1,
            detnum: None,
            masters: MastersConfig::default(),
            flux: FluxConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for MastersConfig {
    fn default() -> Self {
        Self {
            mode: MasterMode::Rebuild,
            save: true,
            directory: PathBuf::from("MF"),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            science_dir: PathBuf::from("Science"),
        }
    }
}

impl ReductionConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ndet == 0 {
            return Err(ConfigError::Invalid("ndet must be at least 1".into()));
        }
        if let Some(detnum) = &self.detnum {
            if let Some(bad) = detnum.iter().find(|d| **d == 0 || **d > self.ndet) {
                return Err(ConfigError::Invalid(format!(
                    "detnum entry {bad} outside 1..={}",
                    self.ndet
                )));
            }
        }
        Ok(())
    }

    /// Returns `true` if `det` should be reduced.
    pub fn is_selected(&self, det: DetectorId) -> bool {
        match &self.detnum {
            Some(detnum) => detnum.contains(&det.get()),
            None => true,
        }
    }

    pub fn master_policy(&self) -> MasterPolicy {
        MasterPolicy::new(self.masters.mode, self.masters.save)
    }

    /// Build the run's calibration cache, backed by the master directory
    /// whenever masters are read or saved.
    pub fn build_cache(&self) -> ReduceResult<CalibrationCache> {
        let policy = self.master_policy();
        let cache = CalibrationCache::new(policy)?;
        if policy.mode.reads_store() || policy.save {
            let store = DirectoryMasterStore::open(&self.masters.directory)?;
            return Ok(cache.with_store(Arc::new(store)));
        }
        Ok(cache)
    }

    /// Writer for the configured science output directory, created if
    /// absent.
    pub fn spectra_writer(&self) -> Result<JsonSpectraWriter, OutputError> {
        JsonSpectraWriter::open(&self.output.science_dir)
    }
}
