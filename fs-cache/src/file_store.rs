use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use data_error::{LoaderError, Result};
use data_offer::{ContentKind, FileRecord, Offer};
use fs_atomic_light::temp_and_move_stamped;
use fs_utils::{
    archive, escape_file_path, from_epoch_millis, now_millis,
    remove_dir_quietly, unit_to_entry,
};

use crate::cache::BytecodeCache;
use crate::config::CacheConfig;
use crate::index::{CacheIndex, ItemRecord, StoredFile, INDEX_VERSION};
use crate::store::{CacheStore, UnitOrigin};

/// Cache store keeping every item in its own folder below the store root.
///
/// Items sit behind their own lock, so operations on different items never
/// wait for each other.
pub struct FileCacheStore {
    /// Label for logging
    label: String,
    id: Uuid,
    root: PathBuf,
    shared: bool,
    index_file: String,
    deploy_root: PathBuf,
    items: DashMap<String, Arc<RwLock<ItemRecord>>>,
    /// Unit name to the items holding it, in registration order.
    unit_items: DashMap<String, Vec<String>>,
    /// Canonical paths of plain files materialized outside the store.
    deployed: Mutex<BTreeSet<PathBuf>>,
    bytecode: Mutex<BytecodeCache>,
    closed: AtomicBool,
}

impl FileCacheStore {
    /// Open the store described by `config`. A shared store reuses the
    /// folder and index left by earlier runs.
    pub fn open(config: &CacheConfig, shared: bool) -> Result<Self> {
        let mut id = Uuid::new_v4();
        let root = if shared {
            config.folder.clone()
        } else {
            config.folder.join(id.to_string())
        };
        fs::create_dir_all(&root).map_err(|err| {
            LoaderError::Cache(
                root.display().to_string(),
                format!("failed to create cache folder: {}", err),
            )
        })?;
        let label = root
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("cache")
            .to_owned();

        let mut items = Vec::new();
        let mut deployed = BTreeSet::new();
        if shared {
            let index_path = root.join(&config.index_file);
            if let Some(index) = CacheIndex::load(&index_path, &label)? {
                id = index.id;
                items = index.items.into_iter().collect();
                deployed = index.deployed;
            }
        }

        let store = FileCacheStore {
            bytecode: Mutex::new(BytecodeCache::new(
                label.clone(),
                config.memory_bytes,
            )),
            label,
            id,
            root,
            shared,
            index_file: config.index_file.clone(),
            deploy_root: config.deploy_root.clone(),
            items: DashMap::new(),
            unit_items: DashMap::new(),
            deployed: Mutex::new(deployed),
            closed: AtomicBool::new(false),
        };

        items.sort_by_key(|(_, record)| record.created_at);
        for (name, record) in items {
            for file in &record.files {
                for unit in &file.units {
                    store.link(unit, &name);
                }
            }
            store.items.insert(name, Arc::new(RwLock::new(record)));
        }

        log::info!(
            "cache/{}: opened {} store at {} with {} items",
            store.label,
            if shared { "shared" } else { "private" },
            store.root.display(),
            store.items.len()
        );
        Ok(store)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item(&self, name: &str) -> Option<Arc<RwLock<ItemRecord>>> {
        self.items.get(name).map(|entry| entry.value().clone())
    }

    fn link(&self, unit: &str, item: &str) {
        let mut items = self.unit_items.entry(unit.to_owned()).or_default();
        if !items.iter().any(|known| known == item) {
            items.push(item.to_owned());
        }
    }

    fn unlink(&self, unit: &str, item: &str) {
        if let Some(mut items) = self.unit_items.get_mut(unit) {
            items.retain(|known| known != item);
        }
        self.unit_items.remove_if(unit, |_, items| items.is_empty());
    }

    /// Write one file of an offer into the item folder and describe it.
    /// `Ok(None)` when there are no bytes to store.
    fn store_file(
        &self,
        item: &str,
        file: &FileRecord,
        previous: Option<&StoredFile>,
    ) -> Result<Option<StoredFile>> {
        let Some(content) = file.content.as_deref() else {
            if previous.is_none() {
                log::warn!(
                    "cache/{}: {} arrived without content for new item file {}",
                    self.label,
                    item,
                    file.name
                );
            }
            return Ok(None);
        };

        let relative = Path::new(item).join(escape_file_path(&file.name));
        let path = temp_and_move_stamped(
            content,
            &self.root,
            &relative.to_string_lossy(),
            from_epoch_millis(file.last_modified),
        )
        .map_err(|err| {
            log::error!(
                "cache/{}: failed to store {} of {}: {}",
                self.label,
                file.name,
                item,
                err
            );
            LoaderError::Cache(
                self.label.clone(),
                format!("failed to store {}: {}", file.name, err),
            )
        })?;

        let units = match file.kind {
            ContentKind::Class => vec![file.name.clone()],
            ContentKind::Jar => archive::list_units(&path).map_err(|err| {
                LoaderError::Cache(
                    self.label.clone(),
                    format!(
                        "failed to list units of {} in {}: {}",
                        file.name, item, err
                    ),
                )
            })?,
            ContentKind::ReadonlyFile => Vec::new(),
        };

        Ok(Some(StoredFile {
            name: file.name.clone(),
            kind: file.kind,
            last_modified: file.last_modified,
            size: content.len() as u64,
            path: relative,
            units,
        }))
    }

    fn snapshot(&self) -> CacheIndex {
        let items = self
            .items
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().read().clone()))
            .collect();
        CacheIndex {
            version: INDEX_VERSION,
            id: self.id,
            items,
            deployed: self.deployed.lock().clone(),
        }
    }

    fn remove_deployed_files(&self) {
        let mut deployed = self.deployed.lock();
        for path in deployed.iter() {
            if !path.exists() {
                continue;
            }
            if let Err(err) = fs::remove_file(path) {
                log::warn!(
                    "cache/{}: failed to remove deployed file {}: {}",
                    self.label,
                    path.display(),
                    err
                );
            }
        }
        deployed.clear();
    }
}

impl CacheStore for FileCacheStore {
    fn is_from_cache(&self, origin: &UnitOrigin) -> bool {
        match origin {
            UnitOrigin::Local => false,
            UnitOrigin::Item(_) => true,
            UnitOrigin::Archive(path) => path.starts_with(&self.root),
        }
    }

    fn item_names_for(&self, unit: &str) -> Vec<String> {
        self.unit_items
            .get(unit)
            .map(|items| items.value().clone())
            .unwrap_or_default()
    }

    fn items(&self) -> Vec<String> {
        let mut items: Vec<(i64, String)> = self
            .items
            .iter()
            .map(|entry| (entry.value().read().created_at, entry.key().clone()))
            .collect();
        items.sort();
        items.into_iter().map(|(_, name)| name).collect()
    }

    fn build_offer_metadata(&self, item: &str) -> Option<Offer> {
        let entry = self.item(item)?;
        let record = entry.read();
        let mut offer = Offer::named(item, record.created_at);
        offer.files =
            Some(record.files.iter().map(StoredFile::metadata).collect());
        offer.units_with_files = record.units_with_files.clone();
        Some(offer)
    }

    fn units_with_files_of(&self, item: &str) -> Vec<String> {
        self.item(item)
            .map(|entry| entry.read().units_with_files.clone())
            .unwrap_or_default()
    }

    fn register_offer(&self, offer: &mut Offer) -> Result<()> {
        let known = offer
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .and_then(|name| self.item(name).map(|entry| (name.to_owned(), entry)));

        let (name, entry) = match known {
            Some(found) => found,
            None => {
                let name = Uuid::new_v4().to_string();
                offer.name = Some(name.clone());
                offer.created_at = now_millis()?;
                let entry =
                    Arc::new(RwLock::new(ItemRecord::new(offer.created_at)));
                self.items.insert(name.clone(), entry.clone());
                log::debug!("cache/{}: new item {}", self.label, name);
                (name, entry)
            }
        };

        let mut record = entry.write();
        record.created_at = offer.created_at;
        for file in offer.files() {
            let previous = record.file(&file.name).cloned();
            let Some(stored) = self.store_file(&name, file, previous.as_ref())?
            else {
                continue;
            };
            if let Some(previous) = &previous {
                for unit in &previous.units {
                    if !stored.units.contains(unit) {
                        self.unlink(unit, &name);
                    }
                }
            }
            for unit in &stored.units {
                self.link(unit, &name);
            }
            record.upsert(stored);
        }
        let mut units_with_files = std::mem::take(&mut record.units_with_files);
        for unit in &offer.units_with_files {
            if !units_with_files.contains(unit) {
                units_with_files.push(unit.clone());
            }
        }
        record.units_with_files = units_with_files;
        self.bytecode.lock().invalidate_item(&name);

        log::debug!(
            "cache/{}: registered {} with {} files",
            self.label,
            name,
            record.files.len()
        );
        Ok(())
    }

    fn bytecode_of(&self, unit: &str, item: &str) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self.item(item) else {
            return Ok(None);
        };
        let key = BytecodeCache::key(item, unit);
        if let Some(bytes) = self.bytecode.lock().get(&key) {
            return Ok(Some(bytes));
        }

        let (kind, path) = {
            let record = entry.read();
            match record.file_holding(unit) {
                Some(file) => (file.kind, self.root.join(&file.path)),
                None => return Ok(None),
            }
        };
        let bytes = match kind {
            ContentKind::Class => fs::read(&path)?,
            ContentKind::Jar => {
                match archive::read_entry(&path, &unit_to_entry(unit))? {
                    Some(bytes) => bytes,
                    None => return Ok(None),
                }
            }
            ContentKind::ReadonlyFile => {
                return Err(LoaderError::Cache(
                    self.label.clone(),
                    format!("{} of {} is not a code file", unit, item),
                ))
            }
        };
        self.bytecode.lock().put(key, bytes.clone());
        Ok(Some(bytes))
    }

    fn file_location_of(&self, file: &str, item: &str) -> Option<PathBuf> {
        let entry = self.item(item)?;
        let record = entry.read();
        record.file(file).map(|stored| self.root.join(&stored.path))
    }

    fn deploy_file(&self, file: &str, item: &str) -> bool {
        let Some(entry) = self.item(item) else {
            return false;
        };
        let (source, last_modified) = {
            let record = entry.read();
            match record.file(file) {
                Some(stored) => {
                    (self.root.join(&stored.path), stored.last_modified)
                }
                None => return false,
            }
        };

        let deployed = (|| -> Result<PathBuf> {
            let bytes = fs::read(&source)?;
            temp_and_move_stamped(
                &bytes,
                &self.deploy_root,
                file,
                from_epoch_millis(last_modified),
            )
        })();
        match deployed {
            Ok(path) => {
                let path = fs::canonicalize(&path).unwrap_or(path);
                log::debug!(
                    "cache/{}: deployed {} to {}",
                    self.label,
                    file,
                    path.display()
                );
                self.deployed.lock().insert(path);
                true
            }
            Err(err) => {
                log::error!(
                    "cache/{}: failed to deploy {} of {}: {}",
                    self.label,
                    file,
                    item,
                    err
                );
                false
            }
        }
    }

    fn remove_offer(&self, item: &str) {
        let Some((_, entry)) = self.items.remove(item) else {
            return;
        };
        {
            let record = entry.write();
            for file in &record.files {
                for unit in &file.units {
                    self.unlink(unit, item);
                }
            }
        }
        self.bytecode.lock().invalidate_item(item);
        remove_dir_quietly(&self.root.join(item));
        log::info!("cache/{}: removed item {}", self.label, item);
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.remove_deployed_files();
        if self.shared {
            self.snapshot().save(&self.root, &self.index_file)?;
            log::info!(
                "cache/{}: saved index with {} items",
                self.label,
                self.items.len()
            );
        } else {
            remove_dir_quietly(&self.root);
            log::info!("cache/{}: deleted private store", self.label);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::thread;
    use tempdir::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn config(dir: &TempDir) -> CacheConfig {
        CacheConfig {
            folder: dir.path().join("cache"),
            deploy_root: dir.path().join("deploy"),
            share: false,
            ..Default::default()
        }
    }

    fn class(name: &str, modified: i64, bytes: &[u8]) -> FileRecord {
        FileRecord::with_content(name, modified, ContentKind::Class, bytes.to_vec())
    }

    fn jar_bytes(units: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (unit, bytes) in units {
            writer
                .start_file(unit_to_entry(unit), FileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn new_offers_get_a_generated_name() {
        let dir = TempDir::new("fs-cache").unwrap();
        let store = FileCacheStore::open(&config(&dir), false).unwrap();

        let mut offer = Offer::new(vec![class("a.Foo", 10, b"foo")]);
        offer.name = Some("owner-chosen".to_owned());
        offer.units_with_files = vec!["a.Foo".to_owned()];
        store.register_offer(&mut offer).unwrap();

        let item = offer.name.clone().unwrap();
        assert_ne!(item, "owner-chosen");
        assert!(Uuid::parse_str(&item).is_ok());
        assert!(offer.created_at > 0);
        assert_eq!(store.item_names_for("a.Foo"), vec![item.clone()]);
        assert_eq!(store.items(), vec![item.clone()]);
        assert_eq!(store.units_with_files_of(&item), vec!["a.Foo"]);

        let meta = store.build_offer_metadata(&item).unwrap();
        assert_eq!(meta.name.as_deref(), Some(item.as_str()));
        assert_eq!(meta.created_at, offer.created_at);
        let file = &meta.files()[0];
        assert_eq!((file.last_modified, file.size), (10, 3));
        assert!(!file.has_content());
    }

    #[test]
    fn patches_update_only_what_they_carry() {
        let dir = TempDir::new("fs-cache").unwrap();
        let store = FileCacheStore::open(&config(&dir), false).unwrap();

        let mut offer = Offer::new(vec![
            class("a.Foo", 10, b"foo"),
            class("a.Bar", 10, b"bar"),
        ]);
        store.register_offer(&mut offer).unwrap();
        let item = offer.name.clone().unwrap();
        let created_at = offer.created_at;
        assert_eq!(store.bytecode_of("a.Foo", &item).unwrap().unwrap(), b"foo");

        let mut patch = store.build_offer_metadata(&item).unwrap();
        patch.files = Some(vec![
            class("a.Foo", 20, b"foo-2"),
            FileRecord::new("a.Bar", 10, 3, ContentKind::Class),
        ]);
        patch.merge_units_with_files(&["a.Foo"]);
        store.register_offer(&mut patch).unwrap();

        assert_eq!(patch.name.as_deref(), Some(item.as_str()));
        assert_eq!(patch.created_at, created_at);
        assert_eq!(
            store.bytecode_of("a.Foo", &item).unwrap().unwrap(),
            b"foo-2"
        );
        assert_eq!(store.bytecode_of("a.Bar", &item).unwrap().unwrap(), b"bar");
        let meta = store.build_offer_metadata(&item).unwrap();
        assert_eq!(meta.file("a.Foo").unwrap().last_modified, 20);
        assert_eq!(meta.files().len(), 2);
        assert_eq!(store.units_with_files_of(&item), vec!["a.Foo"]);
    }

    #[test]
    fn archives_expose_their_units() {
        let dir = TempDir::new("fs-cache").unwrap();
        let store = FileCacheStore::open(&config(&dir), false).unwrap();

        let jar = jar_bytes(&[("a.Foo", b"foo"), ("a.b.Bar", b"bar")]);
        let mut offer = Offer::new(vec![FileRecord::with_content(
            "lib.jar",
            5,
            ContentKind::Jar,
            jar,
        )]);
        store.register_offer(&mut offer).unwrap();
        let item = offer.name.clone().unwrap();

        assert_eq!(store.item_names_for("a.b.Bar"), vec![item.clone()]);
        assert_eq!(
            store.bytecode_of("a.b.Bar", &item).unwrap().unwrap(),
            b"bar"
        );
        assert_eq!(store.bytecode_of("a.Nope", &item).unwrap(), None);

        let location = store.file_location_of("lib.jar", &item).unwrap();
        assert!(location.is_file());
        assert!(store.is_from_cache(&UnitOrigin::Archive(location)));
        assert!(!store.is_from_cache(&UnitOrigin::Local));
        assert!(store.is_from_cache(&UnitOrigin::Item(item)));
    }

    #[test]
    fn deployed_files_are_removed_on_close() {
        let dir = TempDir::new("fs-cache").unwrap();
        let config = config(&dir);
        let store = FileCacheStore::open(&config, false).unwrap();

        let mut offer = Offer::new(vec![FileRecord::with_content(
            "conf/app.txt",
            1_600_000_000_000,
            ContentKind::ReadonlyFile,
            b"cfg".to_vec(),
        )]);
        store.register_offer(&mut offer).unwrap();
        let item = offer.name.clone().unwrap();

        assert!(store.deploy_file("conf/app.txt", &item));
        assert!(!store.deploy_file("conf/other.txt", &item));
        let deployed = config.deploy_root.join("conf/app.txt");
        assert_eq!(fs::read(&deployed).unwrap(), b"cfg");
        let modified = fs::metadata(&deployed).unwrap().modified().unwrap();
        assert_eq!(modified, from_epoch_millis(1_600_000_000_000));

        let root = store.root().to_owned();
        store.close().unwrap();
        assert!(!deployed.exists());
        assert!(!root.exists());
    }

    #[test]
    fn removal_forgets_the_item() {
        let dir = TempDir::new("fs-cache").unwrap();
        let store = FileCacheStore::open(&config(&dir), false).unwrap();

        let mut first = Offer::new(vec![class("a.Foo", 1, b"one")]);
        let mut second = Offer::new(vec![class("a.Foo", 2, b"two")]);
        store.register_offer(&mut first).unwrap();
        store.register_offer(&mut second).unwrap();
        let first = first.name.unwrap();
        let second = second.name.unwrap();
        assert_eq!(
            store.item_names_for("a.Foo"),
            vec![first.clone(), second.clone()]
        );

        store.remove_offer(&first);
        store.remove_offer("never-registered");
        assert_eq!(store.item_names_for("a.Foo"), vec![second.clone()]);
        assert_eq!(store.build_offer_metadata(&first), None);
        assert_eq!(store.bytecode_of("a.Foo", &first).unwrap(), None);
        assert!(!store.root().join(&first).exists());

        store.remove_offer(&second);
        assert!(store.item_names_for("a.Foo").is_empty());
    }

    #[test]
    fn concurrent_registrations_and_reads() {
        let dir = TempDir::new("fs-cache").unwrap();
        let store = Arc::new(FileCacheStore::open(&config(&dir), false).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    let unit = format!("a.Unit{}", i);
                    let mut offer =
                        Offer::new(vec![class(&unit, 1, unit.as_bytes())]);
                    store.register_offer(&mut offer).unwrap();
                    let item = offer.name.unwrap();
                    for _ in 0..20 {
                        let bytes = store.bytecode_of(&unit, &item).unwrap();
                        assert_eq!(bytes.as_deref(), Some(unit.as_bytes()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.items().len(), 8);
    }
}
