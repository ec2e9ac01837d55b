//! Core logic for mdflow, a CP2K NVT molecular-dynamics workflow step.
//!
//! This crate defines the parameter tree and its deep merge, the MD-NVT
//! defaults, CP2K input rendering, structures, the engine contract with its
//! builtin engines, and the workflow step that ties them together.

pub mod calc;
pub mod code;
pub mod command;
pub mod config;
pub mod constants;
pub mod engine;
pub mod input;
pub mod protocol;
pub mod store;
pub mod structure;
pub mod tree;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use calc::{CalcOptions, CalculationInputs, CalculationOutputs, RemoteFolder, Resources};
pub use code::{Code, CodeRef};
pub use command::{CommandRef, PrimaryCommand};
pub use config::{EngineSource, MdflowConfig};
pub use engine::{Engine, EngineRegistry, JobHandle};
pub use input::{render_input, Cp2kInput, RenderError};
pub use store::{ParameterStore, StoredParameters};
pub use structure::Structure;
pub use tree::{deep_merge, merge_layers, ParamTree, ParamValue, Scalar};
pub use workflow::{MdNvtWorkflow, WorkflowInputs, WorkflowOutcome};
