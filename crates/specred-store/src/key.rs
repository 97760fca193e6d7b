use std::fmt;

use serde::{Deserialize, Serialize};
use specred_types::{ProductKind, SetupId};

/// Key of a persisted master: one product kind for one setup.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MasterKey {
    pub kind: ProductKind,
    pub setup: SetupId,
}

impl MasterKey {
    pub fn new(kind: ProductKind, setup: SetupId) -> Self {
        Self { kind, setup }
    }

    /// Canonical master name, e.g. `MasterTrace_A_01`.
    pub fn master_name(&self) -> String {
        format!("Master{}_{}", self.kind.master_tag(), self.setup)
    }

    /// File name used by directory-backed stores.
    pub fn file_name(&self) -> String {
        format!("{}.bin", self.master_name())
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey({})", self.master_name())
    }
}

impl fmt::Display for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.master_name())
    }
}
