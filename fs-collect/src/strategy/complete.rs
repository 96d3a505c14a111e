use std::path::Path;
use std::sync::Arc;

use walkdir::WalkDir;

use data_error::Result;
use data_offer::{ContentKind, FileRecord, Offer};
use fs_utils::{file_stamp, is_archive, is_class_file, path_to_unit};

use super::CollectionStrategy;
use crate::context::{dedup_files, CollectContext};

/// Offers the entire classpath: every unit below classpath directories
/// and every archive as one opaque file.
pub struct CompleteStrategy {
    context: Arc<CollectContext>,
}

impl CompleteStrategy {
    pub fn new(context: Arc<CollectContext>) -> Self {
        CompleteStrategy { context }
    }

    fn collect_directory(
        &self,
        root: &Path,
        files: &mut Vec<FileRecord>,
        units_with_files: &mut Vec<String>,
    ) -> Result<()> {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("collect/complete: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file());

        for entry in walker {
            let path = entry.path();
            if !is_class_file(path) {
                continue;
            }
            let Some(unit) = path
                .strip_prefix(root)
                .ok()
                .and_then(path_to_unit)
            else {
                continue;
            };
            let (modified, size) = file_stamp(path)?;
            files.push(FileRecord::new(
                unit.clone(),
                modified,
                size,
                ContentKind::Class,
            ));

            match self.context.dependent_files(&unit) {
                Ok(Some(required)) => {
                    files.extend(required);
                    units_with_files.push(unit);
                }
                Ok(None) => {}
                Err(err) => log::info!(
                    "collect/complete: failed to collect files of {}: {}",
                    unit,
                    err
                ),
            }
        }
        Ok(())
    }
}

impl CollectionStrategy for CompleteStrategy {
    fn label(&self) -> &str {
        "complete"
    }

    fn context(&self) -> &CollectContext {
        &self.context
    }

    fn collect(&self, unit: &str) -> Result<Option<Offer>> {
        let ctx = &self.context;
        if ctx.classpath().locate(unit).is_none() {
            return ctx.resource_offer(unit, self.label());
        }
        log::info!(
            "collect/complete: collecting the whole classpath for {}",
            unit
        );

        let mut files = Vec::new();
        let mut units_with_files = Vec::new();
        for entry in ctx.classpath().entries() {
            if entry.is_dir() {
                self.collect_directory(entry, &mut files, &mut units_with_files)?;
            } else if entry.is_file() && is_archive(entry) {
                let location = crate::catalog::UnitLocation::Archive {
                    archive: entry.clone(),
                };
                files.push(ctx.physical_record(unit, &location)?);
            } else {
                log::info!(
                    "collect/complete: skipping missing classpath entry {}",
                    entry.display()
                );
            }
        }

        // The requested unit may live in an archive the walk did not open.
        if !units_with_files.iter().any(|known| known == unit) {
            if let Some(required) = ctx.dependent_files(unit)? {
                if !required.is_empty() {
                    files.extend(required);
                    units_with_files.push(unit.to_owned());
                }
            }
        }

        let mut files = dedup_files(files);
        ctx.order_for_definition(&mut files);

        let mut offer = Offer::new(files);
        offer.merge_units_with_files(&units_with_files);
        log::info!(
            "collect/complete: collected {} files, {}KB total",
            offer.files().len(),
            offer.total_size() / 1024
        );
        Ok(Some(offer))
    }
}
