//! Locating compiled units and plain resources on the owner's classpath.

use std::fs;
use std::path::{Path, PathBuf};

use data_error::Result;
use fs_utils::{archive, unit_to_entry, unit_to_path};

/// Where a unit physically lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitLocation {
    /// A `.class` file below a classpath directory.
    Directory { file: PathBuf },
    /// An entry of a jar/zip archive on the classpath.
    Archive { archive: PathBuf },
}

impl UnitLocation {
    /// The file holding the unit: the `.class` file or the whole archive.
    pub fn path(&self) -> &Path {
        match self {
            UnitLocation::Directory { file } => file,
            UnitLocation::Archive { archive } => archive,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, UnitLocation::Archive { .. })
    }
}

/// Ordered classpath entries; earlier entries shadow later ones.
#[derive(Clone, Debug, Default)]
pub struct Classpath {
    entries: Vec<PathBuf>,
}

impl Classpath {
    pub fn new(entries: Vec<PathBuf>) -> Self {
        Classpath { entries }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn locate(&self, unit: &str) -> Option<UnitLocation> {
        let relative = unit_to_path(unit);
        let entry = unit_to_entry(unit);
        for root in &self.entries {
            if root.is_dir() {
                let file = root.join(&relative);
                if file.is_file() {
                    return Some(UnitLocation::Directory { file });
                }
            } else if fs_utils::is_archive(root) && root.is_file() {
                match archive::contains_entry(root, &entry) {
                    Ok(true) => {
                        return Some(UnitLocation::Archive {
                            archive: root.clone(),
                        })
                    }
                    Ok(false) => {}
                    Err(err) => log::warn!(
                        "collect: skipping unreadable archive {}: {}",
                        root.display(),
                        err
                    ),
                }
            }
        }
        None
    }

    /// Bytecode of `unit` at an already known location.
    pub fn read_unit(
        &self,
        unit: &str,
        location: &UnitLocation,
    ) -> Result<Option<Vec<u8>>> {
        match location {
            UnitLocation::Directory { file } => Ok(Some(fs::read(file)?)),
            UnitLocation::Archive { archive } => {
                archive::read_entry(archive, &unit_to_entry(unit))
            }
        }
    }

    /// A plain file named `name` below one of the classpath directories.
    pub fn find_resource(&self, name: &str) -> Option<PathBuf> {
        let relative = name.trim_start_matches('/');
        if relative.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .filter(|root| root.is_dir())
            .map(|root| root.join(relative))
            .find(|path| path.is_file())
    }
}
