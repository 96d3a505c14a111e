use std::path::PathBuf;

use data_error::Result;
use data_offer::Offer;

use crate::config::CacheConfig;
use crate::file_store::FileCacheStore;
use crate::store::{CacheStore, UnitOrigin};

/// Keeps files only for the lifetime of the process and never proposes
/// anything for reuse, so every request is answered with full content.
pub struct NoCacheStore {
    inner: FileCacheStore,
}

impl NoCacheStore {
    pub fn open(config: &CacheConfig) -> Result<Self> {
        Ok(NoCacheStore {
            inner: FileCacheStore::open(config, false)?,
        })
    }
}

impl CacheStore for NoCacheStore {
    fn is_from_cache(&self, origin: &UnitOrigin) -> bool {
        self.inner.is_from_cache(origin)
    }

    fn item_names_for(&self, _unit: &str) -> Vec<String> {
        Vec::new()
    }

    fn items(&self) -> Vec<String> {
        self.inner.items()
    }

    fn build_offer_metadata(&self, _item: &str) -> Option<Offer> {
        None
    }

    fn units_with_files_of(&self, item: &str) -> Vec<String> {
        self.inner.units_with_files_of(item)
    }

    fn register_offer(&self, offer: &mut Offer) -> Result<()> {
        self.inner.register_offer(offer)
    }

    fn bytecode_of(&self, unit: &str, item: &str) -> Result<Option<Vec<u8>>> {
        self.inner.bytecode_of(unit, item)
    }

    fn file_location_of(&self, file: &str, item: &str) -> Option<PathBuf> {
        self.inner.file_location_of(file, item)
    }

    fn deploy_file(&self, file: &str, item: &str) -> bool {
        self.inner.deploy_file(file, item)
    }

    fn remove_offer(&self, item: &str) {
        self.inner.remove_offer(item)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_offer::{ContentKind, FileRecord};
    use tempdir::TempDir;

    #[test]
    fn never_proposes_candidates_but_serves_bytes() {
        let dir = TempDir::new("fs-cache").unwrap();
        let store =
            NoCacheStore::open(&CacheConfig::private(dir.path())).unwrap();

        let mut offer = Offer::new(vec![FileRecord::with_content(
            "a.Foo",
            1,
            ContentKind::Class,
            b"foo".to_vec(),
        )]);
        store.register_offer(&mut offer).unwrap();
        let item = offer.name.clone().unwrap();

        assert!(store.item_names_for("a.Foo").is_empty());
        assert_eq!(store.build_offer_metadata(&item), None);
        assert_eq!(
            store.bytecode_of("a.Foo", &item).unwrap(),
            Some(b"foo".to_vec())
        );

        store.close().unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
