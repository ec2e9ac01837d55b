use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};

use crate::Cli;
use tracing::{info, instrument};

/// Runs the `init` command to bootstrap a new mdflow project.
#[instrument(skip(cli))]
pub fn run(cli: &Cli, template_selector: Option<&str>) -> Result<()> {
    let template = match template_selector {
        Some(value) => InitTemplate::from_str(value)?,
        None => InitTemplate::Water,
    };

    write_if_absent(&cli.config, template.render_config(), cli.force)
        .with_context(|| format!("failed to write '{}'", cli.config))?;

    if let Some((name, content)) = template.structure_file() {
        // The config names the structure relative to itself.
        let path = Path::new(&cli.config).with_file_name(name);
        let path = path.to_string_lossy();
        write_if_absent(&path, content, cli.force)
            .with_context(|| format!("failed to write '{}'", path))?;
    }

    // Parse what was just written so a broken template fails here, not later.
    mdflow_core::MdflowConfig::load_from_file(&cli.config)?;

    info!(
        "init complete: template={}, config={}",
        template.as_str(),
        cli.config
    );
    println!("next: run 'mdf render' to inspect the CP2K input");

    Ok(())
}

/// Supported project templates for initialization.
#[derive(Debug, Clone, Copy)]
enum InitTemplate {
    /// A single water molecule with a ready-to-run PBE setup.
    Water,
    /// Only the required sections; bring your own structure and DFT setup.
    Bare,
}

impl InitTemplate {
    fn from_str(value: &str) -> Result<Self> {
        match value {
            "water" => Ok(Self::Water),
            "bare" => Ok(Self::Bare),
            other => Err(anyhow!(
                "unknown init template '{}' (supported: water,bare)",
                other
            )),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Water => "water",
            Self::Bare => "bare",
        }
    }

    fn render_config(self) -> &'static str {
        match self {
            Self::Water => r#"[workflow]
name = "water-md"
structure = "water.xyz"
engine = "local"

[code]
label = "cp2k"
computer = "localhost"
executable = "cp2k.psmp"
withmpi = true

[options]
max_wallclock_seconds = 10800

[options.resources]
num_machines = 1
num_mpiprocs_per_machine = 4

[parameters.FORCE_EVAL]
METHOD = "Quickstep"

[parameters.FORCE_EVAL.DFT]
BASIS_SET_FILE_NAME = "BASIS_MOLOPT"
POTENTIAL_FILE_NAME = "GTH_POTENTIALS"

[parameters.FORCE_EVAL.DFT.XC.XC_FUNCTIONAL]
_ = "PBE"

[[parameters.FORCE_EVAL.SUBSYS.KIND]]
_ = "O"
BASIS_SET = "DZVP-MOLOPT-SR-GTH"
POTENTIAL = "GTH-PBE-q6"

[[parameters.FORCE_EVAL.SUBSYS.KIND]]
_ = "H"
BASIS_SET = "DZVP-MOLOPT-SR-GTH"
POTENTIAL = "GTH-PBE-q1"
"#,
            Self::Bare => r#"[workflow]
name = "my-md-run"
structure = "structure.xyz"

[code]
label = "cp2k"
computer = "localhost"
executable = "cp2k.psmp"

# Scheduler options default to 4 machines x 12 processes for 3 hours.
# [options.resources]
# num_machines = 4
# num_mpiprocs_per_machine = 12

# Everything under [parameters] is merged over the MD-NVT defaults.
[parameters.MOTION.MD]
STEPS = 50
"#,
        }
    }

    fn structure_file(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Water => Some((
                "water.xyz",
                "3\nLattice=\"10.0 0.0 0.0 0.0 10.0 0.0 0.0 0.0 10.0\"\nO   0.000  0.000  0.119\nH   0.000  0.763 -0.477\nH   0.000 -0.763 -0.477\n",
            )),
            Self::Bare => None,
        }
    }
}

fn write_if_absent(path: &str, content: &str, force: bool) -> Result<()> {
    let output = Path::new(path);

    if output.exists() && !force {
        return Err(anyhow!(
            "'{}' already exists. Re-run with --force to overwrite",
            path
        ));
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }

    fs::write(output, content)
        .with_context(|| format!("failed to write file '{}'", output.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdflow_core::{MdflowConfig, ParamValue};

    #[test]
    fn templates_parse_as_config() {
        for template in [InitTemplate::Water, InitTemplate::Bare] {
            let cfg: MdflowConfig = toml::from_str(template.render_config())
                .unwrap_or_else(|e| panic!("{} template invalid: {e}", template.as_str()));
            assert!(!cfg.workflow.name.is_empty());
        }
    }

    #[test]
    fn water_template_declares_kinds() {
        let cfg: MdflowConfig = toml::from_str(InitTemplate::Water.render_config()).unwrap();
        match cfg.parameters.get_path(&["FORCE_EVAL", "SUBSYS", "KIND"]) {
            Some(ParamValue::List(kinds)) => assert_eq!(kinds.len(), 2),
            other => panic!("expected a KIND list, got {other:?}"),
        }
    }

    #[test]
    fn structure_is_written_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("proj").join(mdflow_core::constants::CONFIG_FILE);
        let cli = Cli {
            command: Some("init".to_string()),
            selector: None,
            config: config.to_string_lossy().to_string(),
            sets: Vec::new(),
            engine: None,
            dry_run: false,
            force: false,
        };

        run(&cli, Some("water")).unwrap();
        assert!(dir.path().join("proj").join("water.xyz").is_file());

        let cfg = MdflowConfig::load_from_file(&cli.config).unwrap();
        assert_eq!(cfg.load_structure().unwrap().sites.len(), 3);
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mdflow.toml");
        fs::write(&path, "existing").unwrap();
        let path = path.to_string_lossy().to_string();

        let err = write_if_absent(&path, "new", false).unwrap_err();
        assert!(err.to_string().contains("--force"));

        write_if_absent(&path, "new", true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }
}
