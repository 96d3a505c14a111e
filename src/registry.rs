//! Units defined on the requester side and the places they may come from.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use data_error::{LoaderError, Result};
use fs_cache::UnitOrigin;
use fs_utils::{archive, unit_to_entry, unit_to_path};

/// A unit that has been defined and may be handed out to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinedUnit {
    pub name: String,
    pub bytecode: Vec<u8>,
    pub origin: UnitOrigin,
}

/// Somewhere the requester finds code without asking the owner.
pub trait CodeSource: Send + Sync {
    fn label(&self) -> &str;

    fn find_unit(&self, unit: &str) -> Result<Option<Vec<u8>>>;

    fn find_resource(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

/// Compiled units laid out below a directory, one file per unit.
pub struct DirectorySource {
    label: String,
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        DirectorySource {
            label: root.display().to_string(),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_if_present(path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl CodeSource for DirectorySource {
    fn label(&self) -> &str {
        &self.label
    }

    fn find_unit(&self, unit: &str) -> Result<Option<Vec<u8>>> {
        Self::read_if_present(&self.root.join(unit_to_path(unit)))
    }

    fn find_resource(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let relative = name.trim_start_matches('/');
        if relative.is_empty() {
            return Ok(None);
        }
        let path = self.root.join(relative);
        if !path.is_file() {
            return Ok(None);
        }
        Self::read_if_present(&path)
    }
}

/// Defined units, local code sources and the archives added at runtime.
///
/// A unit is defined at most once; the archive classpath only grows.
#[derive(Default)]
pub struct CodeRegistry {
    defined: HashMap<String, DefinedUnit>,
    sources: Vec<Box<dyn CodeSource>>,
    classpath: Vec<PathBuf>,
}

impl CodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl CodeSource + 'static) -> Self {
        self.add_source(source);
        self
    }

    pub fn add_source(&mut self, source: impl CodeSource + 'static) {
        self.sources.push(Box::new(source));
    }

    pub fn is_defined(&self, unit: &str) -> bool {
        self.defined.contains_key(unit)
    }

    pub fn find_defined(&self, unit: &str) -> Option<&DefinedUnit> {
        self.defined.get(unit)
    }

    pub fn defined_count(&self) -> usize {
        self.defined.len()
    }

    /// Define `unit` from `bytecode`. Either the unit is fully defined or
    /// nothing changes.
    pub fn define(
        &mut self,
        unit: &str,
        bytecode: Vec<u8>,
        origin: UnitOrigin,
    ) -> Result<&DefinedUnit> {
        if self.defined.contains_key(unit) {
            return Err(LoaderError::Definition {
                unit: unit.to_owned(),
                reason: "already defined".to_owned(),
            });
        }
        if bytecode.is_empty() {
            return Err(LoaderError::Definition {
                unit: unit.to_owned(),
                reason: "empty bytecode".to_owned(),
            });
        }
        log::trace!("registry: defining {} from {:?}", unit, origin);
        let defined = self.defined.entry(unit.to_owned()).or_insert(DefinedUnit {
            name: unit.to_owned(),
            bytecode,
            origin,
        });
        Ok(defined)
    }

    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    /// Append an archive to the classpath. Returns `false` if it is already
    /// there.
    pub fn add_to_classpath(&mut self, archive: impl Into<PathBuf>) -> bool {
        let archive = archive.into();
        if self.classpath.contains(&archive) {
            return false;
        }
        log::debug!("registry: classpath += {}", archive.display());
        self.classpath.push(archive);
        true
    }

    /// Find `unit` in the local sources, then in the classpath archives,
    /// and define it from there.
    pub fn find_local(&mut self, unit: &str) -> Result<Option<DefinedUnit>> {
        let Some((bytecode, origin)) = self.lookup_local(unit)? else {
            return Ok(None);
        };
        self.define(unit, bytecode, origin).map(|defined| Some(defined.clone()))
    }

    fn lookup_local(&self, unit: &str) -> Result<Option<(Vec<u8>, UnitOrigin)>> {
        for source in &self.sources {
            if let Some(bytecode) = source.find_unit(unit)? {
                log::trace!("registry: {} found in {}", unit, source.label());
                return Ok(Some((bytecode, UnitOrigin::Local)));
            }
        }
        let entry = unit_to_entry(unit);
        for archive in &self.classpath {
            match archive::read_entry(archive, &entry) {
                Ok(Some(bytecode)) => {
                    return Ok(Some((bytecode, UnitOrigin::Archive(archive.clone()))))
                }
                Ok(None) => {}
                Err(err) => log::warn!(
                    "registry: skipping unreadable archive {}: {}",
                    archive.display(),
                    err
                ),
            }
        }
        Ok(None)
    }

    /// Bytes of a plain resource from the local sources or the classpath
    /// archives.
    pub fn find_resource(&self, name: &str) -> Result<Option<Vec<u8>>> {
        for source in &self.sources {
            if let Some(bytes) = source.find_resource(name)? {
                return Ok(Some(bytes));
            }
        }
        let entry = name.trim_start_matches('/');
        for archive in &self.classpath {
            if let Ok(Some(bytes)) = archive::read_entry(archive, entry) {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}
