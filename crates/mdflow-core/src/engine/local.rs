use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::calc::{CalculationInputs, CalculationOutputs};
use crate::constants::{COORDS_FILE, INPUTS_FILE, INPUT_FILE, LOCAL_ENGINE, OUTPUT_FILE};
use crate::engine::{Engine, JobHandle};
use crate::input::Cp2kInput;

/// Captured standard error of the CP2K process.
const STDERR_FILE: &str = "_stderr.txt";

/// Runs CP2K on this machine, one directory per calculation under `work_root`.
///
/// In dry-run mode the directory is only staged and nothing is executed.
#[derive(Debug)]
pub struct LocalEngine {
    work_root: PathBuf,
    dry_run: bool,
}

impl LocalEngine {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Writes the input, coordinates and full inputs record into a fresh
    /// calculation directory and returns `(job_id, directory)`.
    #[instrument(skip_all)]
    pub fn stage(&self, inputs: &CalculationInputs) -> Result<(String, PathBuf)> {
        let job_id = job_id(inputs)?;
        let workdir = self.work_root.join(&job_id);
        fs::create_dir_all(&workdir)
            .with_context(|| format!("failed to create directory '{}'", workdir.display()))?;

        let input = Cp2kInput::new(inputs.parameters.tree.clone()).with_structure(&inputs.structure);
        let rendered = input.render().context("failed to render CP2K input")?;
        write_file(&workdir.join(INPUT_FILE), &rendered)?;
        let coords = workdir.join(COORDS_FILE);
        inputs
            .structure
            .save_xyz(&coords)
            .with_context(|| format!("failed to write '{}'", coords.display()))?;

        let record =
            serde_json::to_string_pretty(inputs).context("failed to encode calculation inputs")?;
        write_file(&workdir.join(INPUTS_FILE), &record)?;

        debug!("staged {} in {}", job_id, workdir.display());
        Ok((job_id, workdir))
    }

    fn launch(&self, inputs: &CalculationInputs, workdir: &Path) -> Result<Child> {
        let code = &inputs.code;
        let mut command = if code.withmpi {
            let nprocs = inputs.options.resources.total_mpiprocs()?;
            let mut cmd = Command::new(&code.mpirun);
            cmd.arg("-np")
                .arg(nprocs.to_string())
                .arg(&code.executable);
            cmd
        } else {
            Command::new(&code.executable)
        };

        let stderr_path = workdir.join(STDERR_FILE);
        let stderr = File::create(&stderr_path)
            .with_context(|| format!("failed to create '{}'", stderr_path.display()))?;

        command
            .args(["-i", INPUT_FILE, "-o", OUTPUT_FILE])
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .with_context(|| {
                format!(
                    "failed to start '{}' for {}",
                    code.executable.display(),
                    code.reference()
                )
            })
    }
}

impl Engine for LocalEngine {
    fn name(&self) -> &str {
        LOCAL_ENGINE
    }

    fn submit(&self, inputs: &CalculationInputs) -> Result<Box<dyn JobHandle>> {
        let (job_id, workdir) = self.stage(inputs)?;

        if self.dry_run {
            info!("dry run: staged {} without executing", workdir.display());
            return Ok(Box::new(StagedJob { job_id, workdir }));
        }

        let child = self.launch(inputs, &workdir)?;
        Ok(Box::new(LocalJob {
            job_id,
            workdir,
            child,
        }))
    }
}

/// Deterministic id derived from everything that defines the calculation.
/// It names a single directory under the work root, so the code label is
/// reduced to characters that cannot form a path.
fn job_id(inputs: &CalculationInputs) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(inputs.parameters.digest.as_bytes());
    hasher.update(b"\0");
    hasher.update(serde_json::to_vec(&inputs.structure).context("failed to encode structure")?);
    hasher.update(b"\0");
    hasher.update(serde_json::to_vec(&inputs.options).context("failed to encode options")?);
    let digest = hex::encode(hasher.finalize());

    let label: String = inputs
        .code
        .label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    Ok(format!("{}-{}", label, &digest[..12]))
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("failed to write '{}'", path.display()))
}

#[derive(Debug)]
struct StagedJob {
    job_id: String,
    workdir: PathBuf,
}

impl JobHandle for StagedJob {
    fn id(&self) -> &str {
        &self.job_id
    }

    fn wait(self: Box<Self>) -> Result<CalculationOutputs> {
        Ok(CalculationOutputs {
            job_id: self.job_id,
            exit_code: None,
            workdir: Some(self.workdir),
            output_parameters: Default::default(),
        })
    }
}

#[derive(Debug)]
struct LocalJob {
    job_id: String,
    workdir: PathBuf,
    child: Child,
}

impl JobHandle for LocalJob {
    fn id(&self) -> &str {
        &self.job_id
    }

    fn wait(mut self: Box<Self>) -> Result<CalculationOutputs> {
        let status = self
            .child
            .wait()
            .with_context(|| format!("failed to wait for {}", self.job_id))?;
        debug!("{} exited with {}", self.job_id, status);

        Ok(CalculationOutputs {
            job_id: self.job_id,
            exit_code: status.code(),
            workdir: Some(self.workdir),
            output_parameters: Default::default(),
        })
    }
}
