use std::sync::Arc;

use data_error::Result;
use data_offer::Offer;

use super::CollectionStrategy;
use crate::context::CollectContext;

/// Offers the whole physical file holding the unit: its archive when it
/// comes from one, the unit alone otherwise. Content is attached later.
pub struct FileBasedStrategy {
    context: Arc<CollectContext>,
}

impl FileBasedStrategy {
    pub fn new(context: Arc<CollectContext>) -> Self {
        FileBasedStrategy { context }
    }
}

impl CollectionStrategy for FileBasedStrategy {
    fn label(&self) -> &str {
        "file-based"
    }

    fn context(&self) -> &CollectContext {
        &self.context
    }

    fn collect(&self, unit: &str) -> Result<Option<Offer>> {
        let ctx = &self.context;
        let Some(location) = ctx.classpath().locate(unit) else {
            return ctx.resource_offer(unit, self.label());
        };
        let record = ctx.physical_record(unit, &location)?;

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
