use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use data_error::{LoaderError, Result};
use data_offer::{ContentKind, FileRecord, Offer};
use fs_utils::file_stamp;

use crate::catalog::{Classpath, UnitLocation};
use crate::graph::UnitGraph;
use crate::marker::{self, ProviderRegistry};
use crate::order::order_for_definition;

/// Everything a strategy consults on the owner side.
#[derive(Debug, Default)]
pub struct CollectContext {
    classpath: Classpath,
    graph: UnitGraph,
    providers: ProviderRegistry,
    base_dir: PathBuf,
}

impl CollectContext {
    pub fn new(
        classpath: Classpath,
        graph: UnitGraph,
        providers: ProviderRegistry,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        CollectContext {
            classpath,
            graph,
            providers,
            base_dir: base_dir.into(),
        }
    }

    pub fn classpath(&self) -> &Classpath {
        &self.classpath
    }

    pub fn graph(&self) -> &UnitGraph {
        &self.graph
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Files declared by the dependency marker of `unit`, or `None` when
    /// it has no marker.
    pub fn dependent_files(&self, unit: &str) -> Result<Option<Vec<FileRecord>>> {
        match self.graph.marker_of(unit) {
            None => Ok(None),
            Some(marker) => marker::collect_dependent_files(
                unit,
                marker,
                &self.base_dir,
                &self.providers,
            ),
        }
    }

    pub fn order_for_definition(&self, files: &mut Vec<FileRecord>) {
        order_for_definition(files, &self.graph)
    }

    /// The record naming the physical file of a located unit: the archive
    /// for archived units, the unit itself otherwise. No content attached.
    pub fn physical_record(
        &self,
        unit: &str,
        location: &UnitLocation,
    ) -> Result<FileRecord> {
        let path = location.path();
        let (modified, size) = file_stamp(path)?;
        match location {
            UnitLocation::Archive { archive } => {
                let name = archive
                    .file_name()
                    .and_then(|name| name.to_str())
                    .ok_or_else(|| {
                        LoaderError::Path(format!(
                            "archive {} has no usable file name",
                            archive.display()
                        ))
                    })?;
                let hint = fs::canonicalize(archive)
                    .unwrap_or_else(|_| archive.clone());
                Ok(FileRecord::new(name, modified, size, ContentKind::Jar)
                    .with_location_hint(hint.to_string_lossy()))
            }
            UnitLocation::Directory { .. } => {
                Ok(FileRecord::new(unit, modified, size, ContentKind::Class))
            }
        }
    }

    /// Attach the bytes of `file` unless it already carries them.
    pub fn load_content(&self, file: &mut FileRecord) -> Result<()> {
        if file.has_content() {
            return Ok(());
        }
        let content = match file.kind {
            ContentKind::Class => {
                let location = self
                    .classpath
                    .locate(&file.name)
                    .ok_or_else(|| LoaderError::UnitNotFound(file.name.clone()))?;
                self.classpath
                    .read_unit(&file.name, &location)?
                    .ok_or_else(|| LoaderError::UnitNotFound(file.name.clone()))?
            }
            ContentKind::Jar => {
                let path = match file.location_hint.as_deref() {
                    Some(hint) if !hint.is_empty() => PathBuf::from(hint),
                    _ => PathBuf::from(&file.name),
                };
                fs::read(path)?
            }
            ContentKind::ReadonlyFile => {
                fs::read(marker::resolve(&self.base_dir, &file.name))?
            }
        };
        file.content = Some(content);
        Ok(())
    }

    /// Offer `name` as a plain classpath resource, the fallback when no
    /// unit of that name exists.
    pub fn resource_offer(&self, name: &str, label: &str) -> Result<Option<Offer>> {
        let Some(path) = self.classpath.find_resource(name) else {
            log::error!(
                "collect/{}: {} was requested, but it is not available here",
                label,
                name
            );
            return Ok(None);
        };
        let (modified, _) = file_stamp(&path)?;
        let content = fs::read(&path)?;
        log::debug!("collect/{}: offering resource {}", label, path.display());
        Ok(Some(Offer::new(vec![FileRecord::with_content(
            name,
            modified,
            ContentKind::ReadonlyFile,
            content,
        )])))
    }
}

/// Keep the first record of every name.
pub(crate) fn dedup_files(files: Vec<FileRecord>) -> Vec<FileRecord> {
    files
        .into_iter()
        .unique_by(|file| file.name.clone())
        .collect()
}
