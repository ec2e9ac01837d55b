use std::fs;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, instrument};

use mdflow_core::constants::{JOB_SCRIPT_FILE, LOCAL_ENGINE};
use mdflow_core::engine::local::LocalEngine;
use mdflow_core::protocol::build_parameters;
use mdflow_core::{
    Cp2kInput, EngineRegistry, MdNvtWorkflow, MdflowConfig, ParamTree, ParamValue,
    ParameterStore, WorkflowInputs, WorkflowOutcome,
};
use mdflow_sched::{check_job_script, render_job_script, JobScriptRequest};

/// Parses repeated `--set SECTION.KEY=VALUE` flags into an override tree.
pub fn parse_overrides(sets: &[String]) -> Result<ParamTree> {
    let mut tree = ParamTree::new();
    for expr in sets {
        let (path, value) = expr
            .split_once('=')
            .ok_or_else(|| anyhow!("override '{}' must look like PATH=VALUE", expr))?;

        let keys: Vec<&str> = path.split('.').map(str::trim).collect();
        if keys.iter().any(|k| k.is_empty()) {
            bail!("override '{}' has an empty key in its path", expr);
        }
        tree.set_path(&keys, ParamValue::parse_literal(value));
    }
    Ok(tree)
}

fn load_inputs(cfg: &MdflowConfig, overrides: &ParamTree) -> Result<WorkflowInputs> {
    cfg.workflow_inputs(overrides)
        .with_context(|| format!("unable to assemble inputs for '{}'", cfg.workflow.name))
}

/// Renders one view of the calculation without submitting anything.
#[instrument(skip(cfg, overrides))]
pub fn render(cfg: &MdflowConfig, selector: &str, overrides: &ParamTree) -> Result<String> {
    match selector {
        "input" => {
            let inputs = load_inputs(cfg, overrides)?;
            let params = build_parameters(&inputs.parameters);
            Cp2kInput::new(params)
                .with_structure(&inputs.structure)
                .render()
                .context("failed to render CP2K input")
        }
        "params" => {
            let mut user = cfg.parameters.clone();
            user.merge(overrides);
            let params = build_parameters(&user);
            serde_json::to_string_pretty(&params).context("failed to encode parameters")
        }
        "script" => render_job_script(&JobScriptRequest {
            job_name: &cfg.workflow.name,
            code: &cfg.code,
            options: &cfg.options,
        }),
        other => Err(anyhow!(
            "unknown render selector '{}' (supported: input,params,script)",
            other
        )),
    }
}

/// Stages the calculation through the local engine in dry-run mode and
/// writes the batch script next to it.
#[instrument(skip_all)]
pub fn prepare(cfg: &MdflowConfig, overrides: &ParamTree) -> Result<WorkflowOutcome> {
    let inputs = load_inputs(cfg, overrides)?;
    let store = ParameterStore::open(&cfg.store.path)?;
    let engine = LocalEngine::new(cfg.workflow.work_dir.clone()).dry_run(true);

    let script = render_job_script(&JobScriptRequest {
        job_name: &cfg.workflow.name,
        code: &inputs.code,
        options: &inputs.options,
    })?;
    check_job_script(&inputs.options, &script)?;

    let outcome = MdNvtWorkflow::new(inputs).run(&engine, &store)?;
    if let Some(workdir) = &outcome.outputs.workdir {
        let path = workdir.join(JOB_SCRIPT_FILE);
        fs::write(&path, script).with_context(|| format!("failed to write '{}'", path.display()))?;
        info!("prepared {}", workdir.display());
    }
    Ok(outcome)
}

/// Runs the workflow with the named engine (default: the configured one).
#[instrument(skip(cfg, registry, overrides))]
pub fn submit(
    cfg: &MdflowConfig,
    registry: &EngineRegistry,
    engine_name: Option<&str>,
    overrides: &ParamTree,
) -> Result<WorkflowOutcome> {
    let name = engine_name.unwrap_or(&cfg.workflow.engine);
    let engine = registry.get(name)?;
    if name == LOCAL_ENGINE {
        info!("running locally under {}", cfg.workflow.work_dir.display());
    }

    let inputs = load_inputs(cfg, overrides)?;
    let store = ParameterStore::open(&cfg.store.path)?;
    MdNvtWorkflow::new(inputs)
        .run(engine, &store)
        .with_context(|| format!("workflow '{}' failed on engine '{}'", cfg.workflow.name, name))
}
