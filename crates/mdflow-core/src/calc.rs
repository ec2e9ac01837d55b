//! What a calculation receives and what comes back from it.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::code::Code;
use crate::store::StoredParameters;
use crate::structure::Structure;
use crate::tree::ParamTree;

/// Machines and MPI processes requested from the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub num_machines: u32,
    pub num_mpiprocs_per_machine: u32,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            num_machines: 4,
            num_mpiprocs_per_machine: 12,
        }
    }
}

impl Resources {
    /// Total number of MPI processes; fails when the product overflows.
    pub fn total_mpiprocs(&self) -> Result<u32> {
        self.num_machines
            .checked_mul(self.num_mpiprocs_per_machine)
            .ok_or_else(|| {
                anyhow!(
                    "{} machines x {} processes per machine is too many MPI processes",
                    self.num_machines,
                    self.num_mpiprocs_per_machine
                )
            })
    }
}

/// Scheduler options for a calculation (default: 4 x 12 processes, 3 hours).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcOptions {
    pub resources: Resources,
    pub max_wallclock_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Extra lines copied verbatim into the job script header.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_scheduler_commands: Vec<String>,
}

impl Default for CalcOptions {
    fn default() -> Self {
        Self {
            resources: Resources::default(),
            max_wallclock_seconds: 3 * 60 * 60,
            queue_name: None,
            account: None,
            custom_scheduler_commands: Vec::new(),
        }
    }
}

/// Working directory of an earlier calculation, used for restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    pub computer: String,
    pub path: PathBuf,
}

/// Everything an engine needs to run one CP2K calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationInputs {
    pub code: Code,
    pub structure: Structure,
    pub parameters: StoredParameters,
    pub options: CalcOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_folder: Option<RemoteFolder>,
}

/// Result reported by an engine once a calculation has finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationOutputs {
    pub job_id: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub output_parameters: ParamTree,
}

impl CalculationOutputs {
    /// True when the engine reported a zero exit code or no code at all.
    pub fn succeeded(&self) -> bool {
        self.exit_code.map_or(true, |code| code == 0)
    }
}
