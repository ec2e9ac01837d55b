use anyhow::Result;
use tracing::{debug, warn};

use mdflow_core::constants::LOCAL_ENGINE;
use mdflow_core::engine::local::LocalEngine;
use mdflow_core::engine::subprocess::SubprocessEngine;
use mdflow_core::{EngineRegistry, EngineSource, MdflowConfig};

/// Registers the builtin local engine and every `source = "path"` engine
/// listed under `[engines]`.
pub fn register_engines(
    cfg: &MdflowConfig,
    registry: &mut EngineRegistry,
    dry_run: bool,
) -> Result<()> {
    registry.register(Box::new(
        LocalEngine::new(cfg.workflow.work_dir.clone()).dry_run(dry_run),
    ));

    let Some(engines) = &cfg.engines else {
        return Ok(());
    };

    for (name, engine) in engines {
        match engine.source {
            EngineSource::Builtin => {
                if name != LOCAL_ENGINE {
                    warn!("unknown builtin engine '{}' ignored", name);
                }
            }
            EngineSource::Path => {
                // Without an explicit path the binary is looked up on PATH.
                let binary = match &engine.path {
                    Some(path) => path.to_string_lossy().to_string(),
                    None => format!("mdflow-engine-{}", name),
                };
                debug!("registering subprocess engine '{}' -> {}", name, binary);
                registry.register(Box::new(SubprocessEngine::new(name.clone(), binary)));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(engines: &str) -> MdflowConfig {
        toml::from_str(&format!(
            r#"
            [workflow]
            name = "demo"
            structure = "water.xyz"

            [code]
            label = "cp2k"
            computer = "localhost"
            executable = "cp2k.psmp"

            {engines}
            "#
        ))
        .expect("fixture config should parse")
    }

    #[test]
    fn registers_local_engine_by_default() {
        let mut registry = EngineRegistry::default();
        register_engines(&cfg(""), &mut registry, false).unwrap();
        assert_eq!(registry.names(), vec!["local"]);
    }

    #[test]
    fn registers_path_engines() {
        let mut registry = EngineRegistry::default();
        let config = cfg(
            r#"
            [engines.slurm]
            source = "path"
            path = "/opt/bin/mdflow-engine-slurm"

            [engines.pbs]
            source = "path"

            [engines.local]
            source = "builtin"
            "#,
        );
        register_engines(&config, &mut registry, false).unwrap();
        assert_eq!(registry.names(), vec!["local", "pbs", "slurm"]);
    }

    #[test]
    fn ignores_unknown_builtin() {
        let mut registry = EngineRegistry::default();
        let config = cfg(
            r#"
            [engines.magic]
            source = "builtin"
            "#,
        );
        register_engines(&config, &mut registry, false).unwrap();
        assert!(registry.get("magic").is_err());
    }
}
