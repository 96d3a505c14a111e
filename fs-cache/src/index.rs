//! On-disk index of a shared file store.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use data_error::Result;
use data_offer::{ContentKind, FileRecord};
use fs_atomic_light::temp_and_move;

pub const INDEX_VERSION: u32 = 1;

/// One file of a cached item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub name: String,
    pub kind: ContentKind,
    pub last_modified: i64,
    pub size: u64,
    /// Relative to the store root.
    pub path: PathBuf,
    /// Units the file holds: itself for a unit, the entries of an archive.
    pub units: Vec<String>,
}

impl StoredFile {
    pub fn metadata(&self) -> FileRecord {
        FileRecord::new(
            self.name.clone(),
            self.last_modified,
            self.size,
            self.kind,
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub created_at: i64,
    pub files: Vec<StoredFile>,
    pub units_with_files: Vec<String>,
}

impl ItemRecord {
    pub fn new(created_at: i64) -> Self {
        ItemRecord {
            created_at,
            ..Default::default()
        }
    }

    pub fn file(&self, name: &str) -> Option<&StoredFile> {
        self.files.iter().find(|file| file.name == name)
    }

    pub fn file_holding(&self, unit: &str) -> Option<&StoredFile> {
        self.files
            .iter()
            .find(|file| file.units.iter().any(|known| known == unit))
    }

    /// Insert or replace the file of the same name, keeping its position.
    pub fn upsert(&mut self, stored: StoredFile) {
        match self.files.iter_mut().find(|file| file.name == stored.name) {
            Some(file) => *file = stored,
            None => self.files.push(stored),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheIndex {
    pub version: u32,
    pub id: Uuid,
    pub items: BTreeMap<String, ItemRecord>,
    pub deployed: BTreeSet<PathBuf>,
}

impl CacheIndex {
    /// `Ok(None)` when there is no index, or one that cannot be used.
    pub fn load(path: &Path, label: &str) -> Result<Option<CacheIndex>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        let index: CacheIndex = match serde_json::from_str(&json) {
            Ok(index) => index,
            Err(err) => {
                log::error!(
                    "cache/{}: failed to read index {}: {}",
                    label,
                    path.display(),
                    err
                );
                return Ok(None);
            }
        };
        if index.version != INDEX_VERSION {
            log::warn!(
                "cache/{}: ignoring index of version {}",
                label,
                index.version
            );
            return Ok(None);
        }
        Ok(Some(index))
    }

    pub fn save(&self, root: &Path, index_file: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        temp_and_move(json.as_bytes(), root, index_file)?;
        Ok(())
    }
}
