// Module catalog - payloads staged onto targets and their argument specs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use super::{registry, ArgumentSpec};
use crate::output::errors::StagehandError;

/// Staged module payload: which compiled module to run and how to validate its args
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub module: String,
    pub argument_spec: ArgumentSpec,
}

impl ModuleDescriptor {
    pub fn load(path: &Path) -> Result<Self, StagehandError> {
        let raw = std::fs::read_to_string(path).map_err(|e| StagehandError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            StagehandError::parse(
                Some(path.to_path_buf()),
                format!("invalid module descriptor: {}", e),
            )
        })
    }
}

/// Source of module payloads for staging and of argument specs for validation
pub trait ModuleCatalog: Send + Sync {
    /// Controller-side file to copy into the staging area
    fn payload(&self, name: &str) -> Result<PathBuf, StagehandError>;

    fn argument_spec(&self, name: &str) -> Result<ArgumentSpec, StagehandError>;

    /// Known module names, sorted
    fn names(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool {
        self.names().iter().any(|n| n == name)
    }
}

/// Catalog of the compiled-in modules
///
/// Descriptors are written once into a private temporary directory that lives
/// as long as the catalog.
pub struct BuiltinCatalog {
    dir: TempDir,
}

impl BuiltinCatalog {
    pub fn new() -> Result<Self, StagehandError> {
        let dir = tempfile::Builder::new()
            .prefix("stagehand-catalog")
            .tempdir()
            .map_err(|e| StagehandError::io(std::env::temp_dir(), e))?;

        for module in registry() {
            let descriptor = ModuleDescriptor {
                module: module.name().to_string(),
                argument_spec: module.argument_spec(),
            };
            let path = dir.path().join(format!("{}.json", module.name()));
            let body = serde_json::to_string_pretty(&descriptor).map_err(|e| {
                StagehandError::parse(
                    Some(path.clone()),
                    format!("cannot encode descriptor: {}", e),
                )
            })?;
            std::fs::write(&path, body).map_err(|e| StagehandError::io(&path, e))?;
        }

        tracing::debug!(
            dir = %dir.path().display(),
            modules = registry().len(),
            "wrote module descriptors"
        );
        Ok(BuiltinCatalog { dir })
    }
}

impl ModuleCatalog for BuiltinCatalog {
    fn payload(&self, name: &str) -> Result<PathBuf, StagehandError> {
        if super::lookup(name).is_none() {
            return Err(StagehandError::UnknownModule {
                name: name.to_string(),
            });
        }
        Ok(self.dir.path().join(format!("{}.json", name)))
    }

    fn argument_spec(&self, name: &str) -> Result<ArgumentSpec, StagehandError> {
        super::lookup(name)
            .map(|m| m.argument_spec())
            .ok_or_else(|| StagehandError::UnknownModule {
                name: name.to_string(),
            })
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = registry().iter().map(|m| m.name().to_string()).collect();
        names.sort();
        names
    }
}
