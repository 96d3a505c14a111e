use std::sync::Arc;

use data_error::Result;
use data_offer::{ContentKind, FileRecord, Offer};
use fs_utils::file_stamp;

use super::CollectionStrategy;
use crate::context::CollectContext;

/// Offers exactly the requested unit, with its bytes, plus the files its
/// dependency marker declares.
pub struct ClassBasedStrategy {
    context: Arc<CollectContext>,
}

impl ClassBasedStrategy {
    pub fn new(context: Arc<CollectContext>) -> Self {
        ClassBasedStrategy { context }
    }
}

impl CollectionStrategy for ClassBasedStrategy {
    fn label(&self) -> &str {
        "class-based"
    }

    fn context(&self) -> &CollectContext {
        &self.context
    }

    fn collect(&self, unit: &str) -> Result<Option<Offer>> {
        let ctx = &self.context;
        let Some(location) = ctx.classpath().locate(unit) else {
            return ctx.resource_offer(unit, self.label());
        };

        let bytecode = match ctx.classpath().read_unit(unit, &location) {
            Ok(Some(bytecode)) => bytecode,
            Ok(None) => {
                log::error!(
                    "collect/class-based: {} is listed in {} but cannot be read",
                    unit,
                    location.path().display()
                );
                return Ok(None);
            }
            Err(err) => {
                log::error!(
                    "collect/class-based: failed to read bytecode of {}: {}",
                    unit,
                    err
                );
                return Ok(None);
            }
        };
        let (modified, _) = file_stamp(location.path())?;
        let record =
            FileRecord::with_content(unit, modified, ContentKind::Class, bytecode);

        let offer = match ctx.dependent_files(unit)? {
            Some(mut files) => {
                files.push(record);
                let mut offer = Offer::new(files);
                offer.merge_units_with_files(&[unit]);
                offer
            }
            None => Offer::new(vec![record]),
        };
        Ok(Some(offer))
    }
}
