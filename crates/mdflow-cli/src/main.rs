use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use mdflow_core::constants::CONFIG_FILE;
use mdflow_core::{CommandRef, EngineRegistry, MdflowConfig, PrimaryCommand, WorkflowOutcome};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod discovery;
mod executor;
mod init;
mod styles;

use styles as s;

/// The command-line interface for mdflow.
#[derive(Debug, Parser)]
#[command(name = "mdf")]
#[command(version)]
#[command(styles = s::get_clap_styles())]
#[command(
    help_template = "{bin} {version}\n\n{about-with-newline}{usage-heading} {usage}\n\n{all-args}{after-help}"
)]
#[command(about = "CP2K NVT molecular-dynamics workflow")]
#[command(
    long_about = "mdflow layers MD-NVT defaults, fixed overrides and your own parameters into
one CP2K input, persists it, and submits the calculation to an engine.

Common Commands:
  init              Write a starter mdflow.toml (templates: water, bare)
  render:input      Print the merged CP2K input
  render:params     Print the merged parameter tree as JSON
  render:script     Print the batch job script
  prepare           Stage the calculation directory without running it
  submit            Run the workflow on the configured engine
"
)]
#[command(
    after_help = "Examples:\n  mdf init water\n  mdf render --set MOTION.MD.STEPS=200\n  mdf prepare\n  mdf submit --engine slurm"
)]
pub(crate) struct Cli {
    /// Command in canonical form, for example: `render:input`, `submit`
    command: Option<String>,
    /// Optional selector (supports `mdf render script` style)
    selector: Option<String>,
    /// Path to mdflow config file.
    #[arg(long, default_value = CONFIG_FILE)]
    config: String,
    /// Parameter override as SECTION.KEY=VALUE; may be repeated.
    #[arg(long = "set", value_name = "PATH=VALUE")]
    sets: Vec<String>,
    /// Engine to submit to, instead of `workflow.engine`.
    #[arg(long)]
    engine: Option<String>,
    /// Stage calculations without executing them.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Overwrite generated files if they already exist.
    #[arg(long, default_value_t = false)]
    force: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    debug!("parsed cli arguments: {:?}", cli);

    let command_name = match &cli.command {
        Some(cmd) => cmd,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            return Ok(());
        }
    };

    let command_text = match &cli.selector {
        Some(selector) => format!("{}:{}", command_name, selector),
        None => command_name.clone(),
    };

    let command = CommandRef::from_str(&command_text)
        .map_err(|e| anyhow!("failed to parse command '{}': {e}", command_text))?;

    if command.primary == PrimaryCommand::Init {
        return init::run(&cli, command.selector.as_deref());
    }

    let cfg = MdflowConfig::load_from_file(&cli.config)
        .with_context(|| format!("unable to load config '{}'", cli.config))?;

    let mut registry = EngineRegistry::default();
    discovery::register_engines(&cfg, &mut registry, cli.dry_run)?;

    execute(&cli, &cfg, &registry, &command)
}

/// Executes a parsed mdflow command.
fn execute(
    cli: &Cli,
    cfg: &MdflowConfig,
    registry: &EngineRegistry,
    command: &CommandRef,
) -> Result<()> {
    let overrides = executor::parse_overrides(&cli.sets)?;

    match command.primary {
        PrimaryCommand::Render => {
            let selector = command.selector.as_deref().unwrap_or("input");
            let rendered = executor::render(cfg, selector, &overrides)?;
            print!("{rendered}");
            if !rendered.ends_with('\n') {
                println!();
            }
            Ok(())
        }
        PrimaryCommand::Prepare => {
            let outcome = executor::prepare(cfg, &overrides)?;
            report(&outcome)
        }
        PrimaryCommand::Submit => {
            let outcome = executor::submit(cfg, registry, cli.engine.as_deref(), &overrides)?;
            report(&outcome)
        }
        PrimaryCommand::Init => init::run(cli, command.selector.as_deref()),
    }
}

fn report(outcome: &WorkflowOutcome) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome).context("failed to encode outcome")?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn test_cli(command: &str, config: &str) -> Cli {
        Cli {
            command: Some(command.to_string()),
            selector: None,
            config: config.to_string(),
            sets: Vec::new(),
            engine: None,
            dry_run: true,
            force: false,
        }
    }

    fn write_project(dir: &std::path::Path) -> String {
        let xyz = dir.join("argon.xyz");
        fs::write(&xyz, "1\nLattice=\"5 0 0 0 5 0 0 0 5\"\nO 0.0 0.0 0.0\n").unwrap();
        let config = dir.join("mdflow.toml");
        fs::write(
            &config,
            format!(
                r#"
[workflow]
name = "argon"
structure = "{}"
work_dir = "{}"

[code]
label = "cp2k"
computer = "localhost"
executable = "/nonexistent/cp2k.psmp"

[store]
path = "{}"
"#,
                xyz.display(),
                dir.join("calcs").display(),
                dir.join("store").display()
            ),
        )
        .unwrap();
        config.to_string_lossy().to_string()
    }

    #[test]
    fn smoke_test_execute_render_script() {
        let dir = tempdir().unwrap();
        let config = write_project(dir.path());
        let cfg = MdflowConfig::load_from_file(&config).unwrap();
        let registry = EngineRegistry::default();
        let cmd = CommandRef::from_str("render:script").unwrap();

        execute(&test_cli("render", &config), &cfg, &registry, &cmd)
            .expect("render:script should succeed");
    }

    #[test]
    fn integration_test_submit_dry_run_through_local_engine() {
        let dir = tempdir().unwrap();
        let config = write_project(dir.path());
        let cli = test_cli("submit", &config);
        let cfg = MdflowConfig::load_from_file(&config).unwrap();

        let mut registry = EngineRegistry::default();
        discovery::register_engines(&cfg, &mut registry, cli.dry_run).unwrap();

        let cmd = CommandRef::from_str("submit").unwrap();
        execute(&cli, &cfg, &registry, &cmd).expect("dry-run submit should succeed");

        let staged: Vec<_> = fs::read_dir(dir.path().join("calcs")).unwrap().collect();
        assert_eq!(staged.len(), 1);
    }

    #[test]
    fn bad_override_is_rejected_before_running() {
        let dir = tempdir().unwrap();
        let config = write_project(dir.path());
        let cfg = MdflowConfig::load_from_file(&config).unwrap();
        let mut cli = test_cli("render", &config);
        cli.sets = vec!["NOT_AN_ASSIGNMENT".to_string()];

        let cmd = CommandRef::from_str("render").unwrap();
        assert!(execute(&cli, &cfg, &EngineRegistry::default(), &cmd).is_err());
    }
}
