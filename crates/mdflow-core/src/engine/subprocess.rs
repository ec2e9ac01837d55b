use std::io::Write;
use std::process::{Child, Command, Stdio};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::calc::{CalculationInputs, CalculationOutputs};
use crate::engine::{Engine, JobHandle};

/// An engine that delegates to an external binary via JSON over stdio.
///
/// The binary is started as `<binary> --submit`, receives the
/// [`CalculationInputs`] on stdin and prints [`CalculationOutputs`] on
/// stdout once the calculation has finished.
#[derive(Debug)]
pub struct SubprocessEngine {
    name: String,
    binary_path: String,
}

impl SubprocessEngine {
    /// Creates a new `SubprocessEngine`.
    pub fn new(name: String, binary_path: String) -> Self {
        Self { name, binary_path }
    }
}

impl Engine for SubprocessEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, inputs: &CalculationInputs) -> Result<Box<dyn JobHandle>> {
        let payload = serde_json::to_vec(inputs)
            .with_context(|| format!("failed to serialize inputs for {}", self.name))?;

        let mut child = Command::new(&self.binary_path)
            .arg("--submit")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn engine binary '{}'", self.binary_path))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(&payload) {
                drop(stdin);
                // The engine stopped reading; don't leave it running unreaped.
                let _ = child.kill();
                let _ = child.wait();
                return Err(err).with_context(|| format!("failed to write to {} stdin", self.name));
            }
        }

        let job_id = format!("{}-{}", self.name, child.id());
        debug!("submitted {} via {}", job_id, self.binary_path);

        Ok(Box::new(SubprocessJob {
            job_id,
            engine: self.name.clone(),
            child,
        }))
    }
}

#[derive(Debug)]
struct SubprocessJob {
    job_id: String,
    engine: String,
    child: Child,
}

impl JobHandle for SubprocessJob {
    fn id(&self) -> &str {
        &self.job_id
    }

    fn wait(self: Box<Self>) -> Result<CalculationOutputs> {
        let SubprocessJob {
            job_id,
            engine,
            child,
        } = *self;

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to read from {engine} stdout"))?;

        if !output.status.success() {
            bail!(
                "engine {} failed for {} with status {}",
                engine,
                job_id,
                output.status
            );
        }

        serde_json::from_slice::<CalculationOutputs>(&output.stdout)
            .with_context(|| format!("failed to parse CalculationOutputs from {engine}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{calculation_inputs, write_script};

    const ECHO_ENGINE: &str = r#"#!/bin/sh
[ "$1" = "--submit" ] || exit 2
payload=$(cat)
case "$payload" in
  *'"ENSEMBLE":"NVT"'*) echo '{"job_id": "remote-42", "exit_code": 0, "output_parameters": {"ENERGY": -17.2}}' ;;
  *) exit 1 ;;
esac
"#;

    #[test]
    fn subprocess_engine_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_script(dir.path(), "mdflow-engine-mock", ECHO_ENGINE);
        let engine = SubprocessEngine::new("mock".to_string(), binary);

        let handle = engine.submit(&calculation_inputs("cp2k.psmp")).unwrap();
        assert!(handle.id().starts_with("mock-"));

        let out = handle.wait().expect("engine should reply");
        assert_eq!(out.job_id, "remote-42");
        assert_eq!(out.exit_code, Some(0));
        assert!(out.output_parameters.contains_key("ENERGY"));
    }

    #[test]
    fn subprocess_engine_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_script(dir.path(), "mdflow-engine-broken", "#!/bin/sh\ncat >/dev/null\nexit 1\n");
        let engine = SubprocessEngine::new("broken".to_string(), binary);

        let err = engine
            .submit(&calculation_inputs("cp2k.psmp"))
            .unwrap()
            .wait()
            .unwrap_err();
        assert!(err.to_string().contains("engine broken failed"));
    }

    #[test]
    fn engine_closing_stdin_is_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_script(
            dir.path(),
            "mdflow-engine-deaf",
            "#!/bin/sh\nexec 0<&-\nsleep 30\n",
        );
        let engine = SubprocessEngine::new("deaf".to_string(), binary);

        // Larger than a pipe buffer, so the write cannot complete unread.
        let mut inputs = calculation_inputs("cp2k.psmp");
        inputs.parameters.tree.insert("PADDING", "x".repeat(256 * 1024));

        let started = std::time::Instant::now();
        let err = match engine.submit(&inputs) {
            Ok(_) => panic!("submit should fail when the engine stops reading"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("failed to write to deaf stdin"));
        assert!(started.elapsed() < std::time::Duration::from_secs(20));
    }

    #[test]
    fn missing_binary_fails_at_submit() {
        let engine = SubprocessEngine::new(
            "ghost".to_string(),
            "/nonexistent/mdflow-engine-ghost".to_string(),
        );
        assert!(engine.submit(&calculation_inputs("cp2k.psmp")).is_err());
    }
}
