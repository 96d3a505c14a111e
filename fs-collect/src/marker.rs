//! Declarative file dependencies of compiled units.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use data_error::{LoaderError, Result};
use data_offer::{ContentKind, FileRecord};
use fs_utils::file_stamp;

/// Extra files a unit needs at run time, named either statically or by
/// the id of a provider registered in a [`ProviderRegistry`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyMarker {
    Files(Vec<String>),
    Provider(String),
}

/// A file path produced by a dependency provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentFile {
    pub path: String,
}

impl DependentFile {
    pub fn new(path: impl Into<String>) -> Self {
        DependentFile { path: path.into() }
    }
}

pub type ProviderFn =
    dyn Fn() -> anyhow::Result<Vec<DependentFile>> + Send + Sync;

/// Provider ids mapped to the functions computing their file lists.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<ProviderFn>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, id: impl Into<String>, provider: F)
    where
        F: Fn() -> anyhow::Result<Vec<DependentFile>> + Send + Sync + 'static,
    {
        self.providers.insert(id.into(), Arc::new(provider));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    fn run(&self, unit: &str, id: &str) -> Result<Vec<DependentFile>> {
        let provider =
            self.providers
                .get(id)
                .ok_or_else(|| LoaderError::Provider {
                    unit: unit.to_owned(),
                    provider: id.to_owned(),
                    reason: "no such provider is registered".to_owned(),
                })?;
        provider().map_err(|err| {
            log::error!(
                "collect: dependency provider {} of {} failed: {}",
                id,
                unit,
                err
            );
            LoaderError::Provider {
                unit: unit.to_owned(),
                provider: id.to_owned(),
                reason: err.to_string(),
            }
        })
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.providers.keys().collect();
        ids.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &ids)
            .finish()
    }
}

/// Describe the files `marker` declares for `unit`, without content.
///
/// Paths are resolved against `base_dir` but keep their declared form as
/// the record name. Missing files are logged and skipped. A static marker
/// without paths means no dependencies at all.
pub fn collect_dependent_files(
    unit: &str,
    marker: &DependencyMarker,
    base_dir: &Path,
    providers: &ProviderRegistry,
) -> Result<Option<Vec<FileRecord>>> {
    let paths: Vec<String> = match marker {
        DependencyMarker::Files(paths) if paths.is_empty() => return Ok(None),
        DependencyMarker::Files(paths) => paths.clone(),
        DependencyMarker::Provider(id) => providers
            .run(unit, id)?
            .into_iter()
            .map(|file| file.path)
            .collect(),
    };

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let resolved = resolve(base_dir, &path);
        if !resolved.is_file() {
            log::error!(
                "collect: {} declares {} as required, but the file is missing at {}",
                unit,
                path,
                resolved.display()
            );
            continue;
        }
        let (modified, size) = file_stamp(&resolved)?;
        files.push(FileRecord::new(
            path,
            modified,
            size,
            ContentKind::ReadonlyFile,
        ));
    }
    Ok(Some(files))
}

pub(crate) fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    base_dir.join(path)
}
