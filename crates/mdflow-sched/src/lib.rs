use anyhow::{anyhow, bail, Result};
use tracing::{debug, instrument};

use mdflow_core::constants::{INPUT_FILE, OUTPUT_FILE};
use mdflow_core::{CalcOptions, Code};

/// What goes into a batch script for one calculation.
#[derive(Debug, Clone)]
pub struct JobScriptRequest<'a> {
    pub job_name: &'a str,
    pub code: &'a Code,
    pub options: &'a CalcOptions,
}

/// Formats seconds as `HH:MM:SS`; hours are not wrapped into days.
pub fn format_walltime(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[instrument(skip_all, fields(job = request.job_name))]
pub fn render_job_script(request: &JobScriptRequest<'_>) -> Result<String> {
    let options = request.options;
    let resources = &options.resources;
    if resources.num_machines == 0 || resources.num_mpiprocs_per_machine == 0 {
        bail!(
            "resources must request at least one machine and one process (got {} x {})",
            resources.num_machines,
            resources.num_mpiprocs_per_machine
        );
    }
    if options.max_wallclock_seconds == 0 {
        bail!("max_wallclock_seconds must be positive");
    }
    let total_mpiprocs = resources.total_mpiprocs()?;
    debug!(
        "rendering job script for {} x {} processes",
        resources.num_machines, resources.num_mpiprocs_per_machine
    );

    let template = include_str!("../resources/slurm-template.sh");

    let mut directives = Vec::new();
    if let Some(queue) = &options.queue_name {
        directives.push(format!("#SBATCH --partition={queue}"));
    }
    if let Some(account) = &options.account {
        directives.push(format!("#SBATCH --account={account}"));
    }
    directives.extend(options.custom_scheduler_commands.iter().cloned());

    let run_line = format!(
        "srun -n {} '{}' -i {} -o {}",
        total_mpiprocs,
        request.code.executable.display(),
        INPUT_FILE,
        OUTPUT_FILE
    );

    let rendered = template
        .replace("{{JOB_NAME}}", request.job_name)
        .replace("{{NUM_MACHINES}}", &resources.num_machines.to_string())
        .replace(
            "{{MPIPROCS_PER_MACHINE}}",
            &resources.num_mpiprocs_per_machine.to_string(),
        )
        .replace("{{WALLTIME}}", &format_walltime(options.max_wallclock_seconds))
        .replace("{{CODE}}", &request.code.reference().to_string())
        .replace("{{RUN_LINE}}", &run_line);

    // An empty directive block would leave a stray blank line in the header.
    let rendered = if directives.is_empty() {
        rendered.replace("{{DIRECTIVES}}\n", "")
    } else {
        rendered.replace("{{DIRECTIVES}}", &directives.join("\n"))
    };

    Ok(rendered)
}

/// Checks that `script` requests the resources in `options`.
pub fn check_job_script(options: &CalcOptions, script: &str) -> Result<()> {
    let resources = &options.resources;
    let mut issues = Vec::new();

    let expected = [
        format!("#SBATCH --nodes={}", resources.num_machines),
        format!(
            "#SBATCH --ntasks-per-node={}",
            resources.num_mpiprocs_per_machine
        ),
        format!(
            "#SBATCH --time={}",
            format_walltime(options.max_wallclock_seconds)
        ),
    ];
    for line in &expected {
        if !script.lines().any(|l| l.trim() == line) {
            issues.push(format!("missing '{line}'"));
        }
    }

    if !script.contains(&format!("-i {INPUT_FILE}")) {
        issues.push(format!("run line does not read {INPUT_FILE}"));
    }
    if script.contains("{{") {
        issues.push("unrendered template placeholder".to_string());
    }

    if issues.is_empty() {
        return Ok(());
    }

    Err(anyhow!("job script check failed:\n- {}", issues.join("\n- ")))
}
