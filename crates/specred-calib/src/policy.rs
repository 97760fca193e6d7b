use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the cache treats persisted masters on a miss.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasterMode {
    /// Never read the store; compute every product.
    #[default]
    Rebuild,
    /// Load a master when one exists, otherwise compute.
    Reuse,
    /// Every product must come from the store.
    Force,
}

impl MasterMode {
    pub fn reads_store(&self) -> bool {
        matches!(self, Self::Reuse | Self::Force)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rebuild => "rebuild",
            Self::Reuse => "reuse",
            Self::Force => "force",
        }
    }
}

impl fmt::Display for MasterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MasterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rebuild" => Ok(Self::Rebuild),
            "reuse" => Ok(Self::Reuse),
            "force" => Ok(Self::Force),
            other => Err(format!("unknown master mode: {other}")),
        }
    }
}

/// Master read/write policy for one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterPolicy {
    pub mode: MasterMode,
    /// Persist freshly computed products.
    pub save: bool,
}

impl MasterPolicy {
    pub fn new(mode: MasterMode, save: bool) -> Self {
        Self { mode, save }
    }
}
