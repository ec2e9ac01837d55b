use std::collections::HashMap;

use anyhow::{bail, Result};
use tracing::{debug, instrument};

use crate::calc::{CalculationInputs, CalculationOutputs};

pub mod local;
pub mod subprocess;

/// A submitted calculation that can be waited on.
pub trait JobHandle: std::fmt::Debug {
    /// Identifier assigned by the engine at submission time.
    fn id(&self) -> &str;
    /// Blocks until the calculation has finished.
    fn wait(self: Box<Self>) -> Result<CalculationOutputs>;
}

/// A contract for everything that can run a CP2K calculation.
pub trait Engine: std::fmt::Debug {
    /// Unique name of the engine.
    fn name(&self) -> &str;
    /// Hands the calculation over and returns without waiting for it.
    fn submit(&self, inputs: &CalculationInputs) -> Result<Box<dyn JobHandle>>;
}

/// All engines known to this process, by name.
#[derive(Debug, Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Box<dyn Engine>>,
}

impl EngineRegistry {
    /// Registers an engine, replacing any engine with the same name.
    pub fn register(&mut self, engine: Box<dyn Engine>) {
        debug!("registering engine: {}", engine.name());
        self.engines.insert(engine.name().to_string(), engine);
    }

    /// Looks up an engine by name.
    ///
    /// # Errors
    /// Returns an error listing the known engines if `name` is not registered.
    #[instrument(skip(self))]
    pub fn get(&self, name: &str) -> Result<&dyn Engine> {
        match self.engines.get(name) {
            Some(engine) => Ok(engine.as_ref()),
            None => bail!(
                "no engine named '{}' (known: {})",
                name,
                self.names().join(", ")
            ),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct MockEngine {
        name: String,
    }

    #[derive(Debug)]
    struct MockHandle;

    impl JobHandle for MockHandle {
        fn id(&self) -> &str {
            "mock-1"
        }

        fn wait(self: Box<Self>) -> Result<CalculationOutputs> {
            unreachable!("registry tests never wait")
        }
    }

    impl Engine for MockEngine {
        fn name(&self) -> &str {
            &self.name
        }

        fn submit(&self, _inputs: &CalculationInputs) -> Result<Box<dyn JobHandle>> {
            Ok(Box::new(MockHandle))
        }
    }

    fn mock(name: &str) -> Box<dyn Engine> {
        Box::new(MockEngine {
            name: name.to_string(),
        })
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = EngineRegistry::default();
        registry.register(mock("slurm"));
        registry.register(mock("local"));

        assert_eq!(registry.get("slurm").unwrap().name(), "slurm");
        assert_eq!(registry.names(), vec!["local", "slurm"]);
    }

    #[test]
    fn unknown_engine_lists_known_names() {
        let mut registry = EngineRegistry::default();
        registry.register(mock("local"));

        let err = registry.get("pbs").unwrap_err();
        assert!(err.to_string().contains("no engine named 'pbs'"));
        assert!(err.to_string().contains("local"));
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut registry = EngineRegistry::default();
        registry.register(mock("local"));
        registry.register(mock("local"));
        assert_eq!(registry.names().len(), 1);
    }
}
