//! Process-wide registry of shared stores, one per folder.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::Mutex;

use data_error::Result;
use data_offer::Offer;

use crate::config::CacheConfig;
use crate::file_store::FileCacheStore;
use crate::store::{CacheStore, UnitOrigin};

struct SharedEntry {
    store: Arc<FileCacheStore>,
    references: usize,
}

lazy_static! {
    static ref SHARED_STORES: Mutex<HashMap<PathBuf, SharedEntry>> =
        Mutex::new(HashMap::new());
}

pub(crate) fn open_shared(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    fs::create_dir_all(&config.folder)?;
    let key = fs::canonicalize(&config.folder)?;

    let mut stores = SHARED_STORES.lock();
    let store = match stores.get_mut(&key) {
        Some(entry) => {
            entry.references += 1;
            log::debug!(
                "cache: reusing shared store {} ({} references)",
                key.display(),
                entry.references
            );
            entry.store.clone()
        }
        None => {
            let store = Arc::new(FileCacheStore::open(config, true)?);
            stores.insert(
                key.clone(),
                SharedEntry {
                    store: store.clone(),
                    references: 1,
                },
            );
            store
        }
    };
    Ok(Arc::new(SharedHandle {
        key,
        store,
        closed: AtomicBool::new(false),
    }))
}

/// Number of open handles to the shared store in `folder`.
pub fn shared_references(folder: &std::path::Path) -> usize {
    let Ok(key) = fs::canonicalize(folder) else {
        return 0;
    };
    SHARED_STORES
        .lock()
        .get(&key)
        .map_or(0, |entry| entry.references)
}

/// One user of a shared store. Closing the last handle closes the store.
struct SharedHandle {
    key: PathBuf,
    store: Arc<FileCacheStore>,
    closed: AtomicBool,
}

impl CacheStore for SharedHandle {
    fn is_from_cache(&self, origin: &UnitOrigin) -> bool {
        self.store.is_from_cache(origin)
    }

    fn item_names_for(&self, unit: &str) -> Vec<String> {
        self.store.item_names_for(unit)
    }

    fn items(&self) -> Vec<String> {
        self.store.items()
    }

    fn build_offer_metadata(&self, item: &str) -> Option<Offer> {
        self.store.build_offer_metadata(item)
    }

    fn units_with_files_of(&self, item: &str) -> Vec<String> {
        self.store.units_with_files_of(item)
    }

    fn register_offer(&self, offer: &mut Offer) -> Result<()> {
        self.store.register_offer(offer)
    }

    fn bytecode_of(&self, unit: &str, item: &str) -> Result<Option<Vec<u8>>> {
        self.store.bytecode_of(unit, item)
    }

    fn file_location_of(&self, file: &str, item: &str) -> Option<PathBuf> {
        self.store.file_location_of(file, item)
    }

    fn deploy_file(&self, file: &str, item: &str) -> bool {
        self.store.deploy_file(file, item)
    }

    fn remove_offer(&self, item: &str) {
        self.store.remove_offer(item)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let last = {
            let mut stores = SHARED_STORES.lock();
            match stores.get_mut(&self.key) {
                Some(entry) if entry.references > 1 => {
                    entry.references -= 1;
                    false
                }
                Some(_) => {
                    stores.remove(&self.key);
                    true
                }
                None => false,
            }
        };
        if last {
            self.store.close()?;
        }
        Ok(())
    }
}

impl Drop for SharedHandle {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("cache: failed to close shared store: {}", err);
        }
    }
}
