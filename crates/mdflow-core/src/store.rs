use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::tree::ParamTree;

/// A parameter tree that has been persisted, identified by its digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredParameters {
    pub digest: String,
    pub tree: ParamTree,
}

/// Computes the SHA-256 of the tree's canonical JSON encoding.
///
/// Keys are sorted, so equal trees always produce equal digests.
pub fn digest_tree(tree: &ParamTree) -> Result<String> {
    let bytes = serde_json::to_vec(tree).context("failed to encode parameters")?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Content-addressed store of parameter trees: `<root>/<sha256>.json`.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    root: PathBuf,
}

impl ParameterStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create parameter store '{}'", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}.json"))
    }

    /// Persists `tree`. Storing an identical tree again is a no-op.
    pub fn store(&self, tree: &ParamTree) -> Result<StoredParameters> {
        if let Some(path) = tree.find_non_finite() {
            bail!("parameter '{path}' is not a finite number and cannot be stored");
        }
        let digest = digest_tree(tree)?;
        let path = self.path_for(&digest);

        if path.is_file() {
            debug!("parameters {} already stored", &digest[..12]);
        } else {
            let body = serde_json::to_string_pretty(tree).context("failed to encode parameters")?;
            fs::write(&path, body)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            debug!("stored parameters {} at {}", &digest[..12], path.display());
        }

        Ok(StoredParameters {
            digest,
            tree: tree.clone(),
        })
    }

    /// Loads a tree by digest and checks that its content still matches.
    pub fn load(&self, digest: &str) -> Result<StoredParameters> {
        let path = self.path_for(digest);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        let tree: ParamTree = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse '{}'", path.display()))?;

        let actual = digest_tree(&tree)?;
        if actual != digest {
            bail!(
                "parameter store entry '{}' is corrupt: content hashes to {}",
                path.display(),
                actual
            );
        }

        Ok(StoredParameters {
            digest: actual,
            tree,
        })
    }
}
