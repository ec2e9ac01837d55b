use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The CP2K executable installed on a computer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub label: String,
    pub computer: String,
    pub executable: PathBuf,
    /// Launch through `mpirun` with the requested process count.
    #[serde(default)]
    pub withmpi: bool,
    #[serde(default = "default_mpirun")]
    pub mpirun: String,
}

fn default_mpirun() -> String {
    "mpirun".to_string()
}

impl Code {
    pub fn new(label: &str, computer: &str, executable: impl Into<PathBuf>) -> Self {
        Self {
            label: label.to_string(),
            computer: computer.to_string(),
            executable: executable.into(),
            withmpi: false,
            mpirun: default_mpirun(),
        }
    }

    pub fn reference(&self) -> CodeRef {
        CodeRef {
            label: self.label.clone(),
            computer: self.computer.clone(),
        }
    }
}

/// A `label@computer` reference to a code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeRef {
    pub label: String,
    pub computer: String,
}

impl Display for CodeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.label, self.computer)
    }
}
