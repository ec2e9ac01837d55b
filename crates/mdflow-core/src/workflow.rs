//! The NVT molecular-dynamics workflow step.
//!
//! One pass of: setup, validate, prepare, submit, wait, inspect, return.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::calc::{CalcOptions, CalculationInputs, CalculationOutputs, RemoteFolder};
use crate::code::Code;
use crate::engine::{Engine, JobHandle};
use crate::protocol::build_parameters;
use crate::store::ParameterStore;
use crate::structure::Structure;
use crate::tree::ParamTree;

/// Inputs of the workflow step.
#[derive(Debug, Clone)]
pub struct WorkflowInputs {
    pub code: Code,
    pub structure: Structure,
    /// User overrides, merged last.
    pub parameters: ParamTree,
    pub options: CalcOptions,
    pub parent_folder: Option<RemoteFolder>,
}

impl WorkflowInputs {
    /// Inputs with no parameter overrides and the default options.
    pub fn new(code: Code, structure: Structure) -> Self {
        Self {
            code,
            structure,
            parameters: ParamTree::new(),
            options: CalcOptions::default(),
            parent_folder: None,
        }
    }
}

/// What a finished run hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub job_id: String,
    pub parameters_digest: String,
    pub outputs: CalculationOutputs,
}

#[derive(Debug, Default)]
struct StepContext {
    structure: Option<Structure>,
    parameters: ParamTree,
    finished: bool,
}

#[derive(Debug)]
pub struct MdNvtWorkflow {
    inputs: WorkflowInputs,
    ctx: StepContext,
}

impl MdNvtWorkflow {
    pub fn new(inputs: WorkflowInputs) -> Self {
        Self {
            inputs,
            ctx: StepContext::default(),
        }
    }

    /// Runs the step to completion against `engine`.
    #[instrument(skip_all, fields(code = %self.inputs.code.reference(), engine = engine.name()))]
    pub fn run(mut self, engine: &dyn Engine, store: &ParameterStore) -> Result<WorkflowOutcome> {
        self.setup();
        self.validate_inputs()?;
        let calc = self.prepare_calculation(store)?;
        let digest = calc.parameters.digest.clone();

        let handle = self.run_calculation(engine, &calc)?;
        let job_id = handle.id().to_string();
        let outputs = handle
            .wait()
            .with_context(|| format!("calculation {job_id} did not complete"))?;

        self.inspect_calculation(&outputs);
        self.return_results(digest, outputs)
    }

    /// Merges defaults, fixed overrides and the user's parameters.
    pub fn setup(&mut self) {
        self.ctx.structure = Some(self.inputs.structure.clone());
        self.ctx.parameters = build_parameters(&self.inputs.parameters);
        self.ctx.finished = false;
    }

    /// Parameters are free-form; nothing is checked here.
    pub fn validate_inputs(&self) -> Result<()> {
        Ok(())
    }

    /// Persists the merged parameters and assembles the calculation inputs.
    pub fn prepare_calculation(&self, store: &ParameterStore) -> Result<CalculationInputs> {
        let structure = self
            .ctx
            .structure
            .clone()
            .ok_or_else(|| anyhow!("prepare_calculation called before setup"))?;
        let parameters = store.store(&self.ctx.parameters)?;
        debug!("using parameters {}", parameters.digest);

        Ok(CalculationInputs {
            code: self.inputs.code.clone(),
            structure,
            parameters,
            options: self.inputs.options.clone(),
            parent_folder: self.inputs.parent_folder.clone(),
        })
    }

    fn run_calculation(
        &self,
        engine: &dyn Engine,
        calc: &CalculationInputs,
    ) -> Result<Box<dyn JobHandle>> {
        let handle = engine.submit(calc)?;
        info!("job {} | running cp2k MD NVT", handle.id());
        Ok(handle)
    }

    fn inspect_calculation(&mut self, outputs: &CalculationOutputs) {
        if !outputs.succeeded() {
            warn!(
                "job {} exited with code {:?}",
                outputs.job_id, outputs.exit_code
            );
        }
        self.ctx.finished = true;
    }

    fn return_results(self, digest: String, outputs: CalculationOutputs) -> Result<WorkflowOutcome> {
        debug_assert!(self.ctx.finished);
        Ok(WorkflowOutcome {
            job_id: outputs.job_id.clone(),
            parameters_digest: digest,
            outputs,
        })
    }

    /// The merged parameters, available after [`setup`](Self::setup).
    pub fn parameters(&self) -> &ParamTree {
        &self.ctx.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::water;
    use crate::tree::ParamValue;
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Debug, Default)]
    struct RecordingEngine {
        submitted: RefCell<Vec<CalculationInputs>>,
        exit_code: Option<i32>,
    }

    #[derive(Debug)]
    struct DoneJob {
        id: String,
        exit_code: Option<i32>,
    }

    impl JobHandle for DoneJob {
        fn id(&self) -> &str {
            &self.id
        }

        fn wait(self: Box<Self>) -> Result<CalculationOutputs> {
            Ok(CalculationOutputs {
                job_id: self.id,
                exit_code: self.exit_code,
                workdir: None,
                output_parameters: ParamTree::new(),
            })
        }
    }

    impl Engine for RecordingEngine {
        fn name(&self) -> &str {
            "recording"
        }

        fn submit(&self, inputs: &CalculationInputs) -> Result<Box<dyn JobHandle>> {
            let mut submitted = self.submitted.borrow_mut();
            submitted.push(inputs.clone());
            Ok(Box::new(DoneJob {
                id: format!("job-{}", submitted.len()),
                exit_code: self.exit_code,
            }))
        }
    }

    fn inputs() -> WorkflowInputs {
        WorkflowInputs::new(Code::new("cp2k", "localhost", "cp2k.psmp"), water())
    }

    #[test]
    fn submits_exactly_one_calculation() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParameterStore::open(dir.path()).unwrap();
        let engine = RecordingEngine::default();

        let outcome = MdNvtWorkflow::new(inputs()).run(&engine, &store).unwrap();

        let submitted = engine.submitted.borrow();
        assert_eq!(submitted.len(), 1);
        assert_eq!(outcome.job_id, "job-1");
        assert_eq!(outcome.parameters_digest, submitted[0].parameters.digest);
        assert_eq!(submitted[0].options, CalcOptions::default());
        assert_eq!(submitted[0].structure, water());
    }

    #[test]
    fn submitted_parameters_are_merged_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParameterStore::open(dir.path()).unwrap();
        let engine = RecordingEngine::default();

        let mut wf_inputs = inputs();
        wf_inputs.parameters =
            serde_json::from_value(json!({"MOTION": {"MD": {"STEPS": 200}}})).unwrap();
        let outcome = MdNvtWorkflow::new(wf_inputs).run(&engine, &store).unwrap();

        let submitted = engine.submitted.borrow();
        let tree = &submitted[0].parameters.tree;
        assert_eq!(
            tree.get_path(&["MOTION", "MD", "STEPS"]),
            Some(&ParamValue::from(200_i64))
        );
        assert_eq!(
            tree.get_path(&["GLOBAL", "RUN_TYPE"]),
            Some(&ParamValue::from("MD"))
        );

        let stored = store.load(&outcome.parameters_digest).unwrap();
        assert_eq!(&stored.tree, tree);
    }

    #[test]
    fn forwards_options_and_parent_folder() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParameterStore::open(dir.path()).unwrap();
        let engine = RecordingEngine::default();

        let mut wf_inputs = inputs();
        wf_inputs.options.resources.num_machines = 1;
        wf_inputs.parent_folder = Some(RemoteFolder {
            computer: "daint".to_string(),
            path: "/scratch/run-1".into(),
        });
        MdNvtWorkflow::new(wf_inputs).run(&engine, &store).unwrap();

        let submitted = engine.submitted.borrow();
        let calc = &submitted[0];
        assert_eq!(calc.options.resources.num_machines, 1);
        assert_eq!(
            calc.parent_folder.as_ref().map(|p| p.computer.as_str()),
            Some("daint")
        );
    }

    #[test]
    fn failed_calculation_still_finishes_the_step() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParameterStore::open(dir.path()).unwrap();
        let engine = RecordingEngine {
            exit_code: Some(1),
            ..Default::default()
        };

        let outcome = MdNvtWorkflow::new(inputs()).run(&engine, &store).unwrap();
        assert_eq!(outcome.outputs.exit_code, Some(1));
    }

    #[test]
    fn prepare_requires_setup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParameterStore::open(dir.path()).unwrap();
        let wf = MdNvtWorkflow::new(inputs());
        assert!(wf.prepare_calculation(&store).is_err());
    }
}
