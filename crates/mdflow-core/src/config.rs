use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::calc::{CalcOptions, RemoteFolder};
use crate::code::Code;
use crate::constants::{DEFAULT_STORE_DIR, DEFAULT_WORK_DIR, LOCAL_ENGINE};
use crate::structure::{Cell, Structure};
use crate::tree::{deep_merge, ParamTree};
use crate::workflow::WorkflowInputs;

#[derive(Debug, Deserialize)]
pub struct MdflowConfig {
    pub workflow: WorkflowConfig,
    pub code: Code,
    #[serde(default)]
    pub options: CalcOptions,
    #[serde(default)]
    pub store: StoreConfig,
    pub engines: Option<HashMap<String, EngineConfig>>,
    /// User overrides merged over the MD-NVT defaults.
    #[serde(default)]
    pub parameters: ParamTree,
}

impl MdflowConfig {
    /// Loads a config file. Relative paths inside it are taken relative to
    /// the directory holding the file.
    pub fn load_from_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        let mut cfg = toml::from_str::<Self>(&text)
            .with_context(|| format!("failed to parse TOML config: {path}"))?;
        if let Some(base) = Path::new(path).parent() {
            cfg.resolve_paths(base);
        }
        Ok(cfg)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.workflow.structure);
        resolve(&mut self.workflow.work_dir);
        resolve(&mut self.store.path);
        for engine in self.engines.iter_mut().flat_map(|e| e.values_mut()) {
            if let Some(path) = engine.path.as_mut() {
                resolve(path);
            }
        }
    }

    pub fn load_structure(&self) -> Result<Structure> {
        let path = &self.workflow.structure;
        Structure::load_xyz(path, self.workflow.cell)
            .with_context(|| format!("unable to load structure '{}'", path.display()))
    }

    /// Builds the workflow inputs; `extra` is merged over the configured
    /// parameters.
    pub fn workflow_inputs(&self, extra: &ParamTree) -> Result<WorkflowInputs> {
        let mut parameters = self.parameters.clone();
        deep_merge(&mut parameters, extra);

        Ok(WorkflowInputs {
            code: self.code.clone(),
            structure: self.load_structure()?,
            parameters,
            options: self.options.clone(),
            parent_folder: self.workflow.parent_folder.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,
    /// Extended XYZ file with the starting geometry.
    pub structure: PathBuf,
    /// Overrides the `Lattice` entry of the structure file.
    pub cell: Option<Cell>,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    pub parent_folder: Option<RemoteFolder>,
}

fn default_engine() -> String {
    LOCAL_ENGINE.to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(DEFAULT_WORK_DIR)
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_DIR),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub source: EngineSource,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineSource {
    Builtin,
    Path,
}
