//! Constants used across the mdflow workspace.

/// The filename for mdflow's project configuration.
pub const CONFIG_FILE: &str = "mdflow.toml";

/// CP2K input file written into every calculation directory.
pub const INPUT_FILE: &str = "aiida.inp";

/// CP2K main output file.
pub const OUTPUT_FILE: &str = "aiida.out";

/// Coordinates referenced from `FORCE_EVAL/SUBSYS/TOPOLOGY`.
pub const COORDS_FILE: &str = "aiida.coords.xyz";

/// Full calculation inputs as JSON, next to the CP2K input.
pub const INPUTS_FILE: &str = "inputs.json";

/// Batch script written by `prepare`.
pub const JOB_SCRIPT_FILE: &str = "job.sh";

/// Default root of the content-addressed parameter store.
pub const DEFAULT_STORE_DIR: &str = ".mdflow/store";

/// Default root for local calculation directories.
pub const DEFAULT_WORK_DIR: &str = "calculations";

/// Name under which the builtin local engine is registered.
pub const LOCAL_ENGINE: &str = "local";
