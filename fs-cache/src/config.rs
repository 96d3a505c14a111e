use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use data_error::Result;

use crate::file_store::FileCacheStore;
use crate::no_cache::NoCacheStore;
use crate::shared;
use crate::store::CacheStore;

pub const DEFAULT_CACHE_FOLDER: &str = "classLoaderCache";
pub const DEFAULT_INDEX_FILE: &str = "index.json";
pub const DEFAULT_MEMORY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    #[default]
    File,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub folder: PathBuf,
    /// Shared stores live directly in `folder`, are handed out once per
    /// process and keep their index between runs. Private ones use a
    /// fresh subfolder that is deleted on close.
    pub share: bool,
    pub index_file: String,
    /// Where plain files of offers are materialized.
    pub deploy_root: PathBuf,
    /// Budget of the in-memory bytecode cache.
    pub memory_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            kind: CacheKind::File,
            folder: PathBuf::from(DEFAULT_CACHE_FOLDER),
            share: true,
            index_file: DEFAULT_INDEX_FILE.to_owned(),
            deploy_root: PathBuf::from("."),
            memory_bytes: DEFAULT_MEMORY_BYTES,
        }
    }
}

impl CacheConfig {
    /// A private file store rooted in `folder`.
    pub fn private(folder: impl Into<PathBuf>) -> Self {
        CacheConfig {
            folder: folder.into(),
            share: false,
            ..Default::default()
        }
    }

    pub fn open(&self) -> Result<Arc<dyn CacheStore>> {
        match self.kind {
            CacheKind::None => Ok(Arc::new(NoCacheStore::open(self)?)),
            CacheKind::File if self.share => shared::open_shared(self),
            CacheKind::File => Ok(Arc::new(FileCacheStore::open(self, false)?)),
        }
    }
}
