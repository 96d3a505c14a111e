use std::cell::RefCell;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempdir::TempDir;
use zip::write::FileOptions;
use zip::ZipWriter;

use fs_utils::unit_to_path;

use crate::catalog::Classpath;
use crate::context::CollectContext;
use crate::graph::{UnitGraph, UnitInfo};
use crate::marker::{DependentFile, ProviderRegistry};

pub fn write_class(root: &Path, unit: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(unit_to_path(unit));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, bytes).unwrap();
    path
}

pub fn write_jar(path: &Path, units: &[(&str, &[u8])]) {
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    for (unit, bytes) in units {
        writer
            .start_file(fs_utils::unit_to_entry(unit), FileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

pub fn set_modified(path: &Path, millis: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_millis(millis))
        .unwrap();
}

/// Scratch owner: a classes folder, archives, a unit graph and providers.
pub struct Fixture {
    dir: TempDir,
    jars: RefCell<Vec<PathBuf>>,
    graph: RefCell<UnitGraph>,
    providers: RefCell<ProviderRegistry>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new("fs-collect").unwrap();
        fs::create_dir(dir.path().join("classes")).unwrap();
        Fixture {
            dir,
            jars: RefCell::new(Vec::new()),
            graph: RefCell::new(UnitGraph::new()),
            providers: RefCell::new(ProviderRegistry::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn classes(&self) -> PathBuf {
        self.root().join("classes")
    }

    pub fn class(&self, unit: &str, bytes: &[u8]) -> PathBuf {
        write_class(&self.classes(), unit, bytes)
    }

    /// A plain file relative to the base folder.
    pub fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.root().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }

    /// A plain file inside the classes folder.
    pub fn resource(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.classes().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }

    pub fn jar(&self, name: &str, units: &[(&str, &[u8])]) -> PathBuf {
        let path = self.root().join(name);
        write_jar(&path, units);
        self.jars.borrow_mut().push(path.clone());
        path
    }

    pub fn unit(&self, name: &str, build: impl FnOnce(UnitInfo) -> UnitInfo) {
        let info = {
            let graph = self.graph.borrow();
            graph.get(name).cloned()
        }
        .unwrap_or_else(|| UnitInfo::new(name).in_module("app"));
        self.graph.borrow_mut().insert(build(info));
    }

    pub fn provider<F>(&self, id: &str, provider: F)
    where
        F: Fn() -> anyhow::Result<Vec<DependentFile>> + Send + Sync + 'static,
    {
        self.providers.borrow_mut().register(id, provider);
    }

    pub fn context(&self) -> Arc<CollectContext> {
        let mut entries = vec![self.classes()];
        entries.extend(self.jars.borrow().iter().cloned());
        Arc::new(CollectContext::new(
            Classpath::new(entries),
            self.graph.borrow().clone(),
            self.providers.borrow().clone(),
            self.root(),
        ))
    }
}
