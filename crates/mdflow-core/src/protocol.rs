//! Default CP2K parameters for an NVT molecular-dynamics run.
//!
//! The final parameter set is built in three layers, each applied with
//! [`deep_merge`](crate::tree::deep_merge): the MOTION defaults, the fixed
//! overrides that make the run an MD job with DFT printing silenced, and
//! finally the user's overrides.

use tracing::debug;

use crate::tree::{merge_layers, ParamTree};

fn section_off() -> ParamTree {
    ParamTree::new().with("_", "OFF")
}

fn each_md(interval: i64) -> ParamTree {
    ParamTree::new().with("MD", interval)
}

/// The `MOTION` section for a CSVR-thermostatted NVT trajectory.
pub fn md_nvt_motion() -> ParamTree {
    let thermostat = ParamTree::new()
        .with("REGION", "GLOBAL")
        .with("TYPE", "CSVR")
        .with("CSVR", ParamTree::new().with("TIMECON", 0.1));

    let md = ParamTree::new()
        .with("ENSEMBLE", "NVT")
        .with("STEPS", 50_i64)
        .with("TIMESTEP", "[fs] 0.5")
        .with("TEMPERATURE", "[K] 300")
        .with("DISPLACEMENT_TOL", "[angstrom] 1.0")
        .with("THERMOSTAT", thermostat)
        .with("PRINT", ParamTree::new().with("ENERGY", section_off()));

    let print = ParamTree::new()
        .with(
            "TRAJECTORY",
            ParamTree::new()
                .with("FORMAT", "DCD_ALIGNED_CELL")
                .with("EACH", each_md(1)),
        )
        .with(
            "RESTART",
            ParamTree::new()
                .with("BACKUP_COPIES", 0_i64)
                .with("EACH", each_md(1)),
        )
        .with("RESTART_HISTORY", ParamTree::new().with("EACH", each_md(100)))
        .with("CELL", section_off())
        .with("VELOCITIES", section_off())
        .with("FORCES", section_off())
        .with("STRESS", section_off());

    ParamTree::new().with(
        "MOTION",
        ParamTree::new().with("MD", md).with("PRINT", print),
    )
}

/// Layers applied on top of the motion defaults, in order.
pub fn hardcoded_overrides() -> Vec<ParamTree> {
    let mut layers = vec![ParamTree::new().with("GLOBAL", ParamTree::new().with("RUN_TYPE", "MD"))];

    for printout in ["MO_CUBES", "MULLIKEN", "LOWDIN", "HIRSHFELD"] {
        let dft_print = ParamTree::new().with(printout, section_off());
        layers.push(ParamTree::new().with(
            "FORCE_EVAL",
            ParamTree::new().with("DFT", ParamTree::new().with("PRINT", dft_print)),
        ));
    }

    layers
}

/// Builds the full parameter tree for a run: defaults, then the fixed
/// overrides, then `user`. Every call starts from a fresh tree.
pub fn build_parameters(user: &ParamTree) -> ParamTree {
    debug!("applying {} user parameter override(s)", user.len());
    let mut layers = vec![md_nvt_motion()];
    layers.extend(hardcoded_overrides());
    layers.push(user.clone());
    merge_layers(layers)
}
