use std::sync::Arc;

use data_error::Result;
use data_offer::Offer;

use super::CollectionStrategy;
use crate::context::CollectContext;

/// Refuses every request.
pub struct StubStrategy {
    context: Arc<CollectContext>,
}

impl StubStrategy {
    pub fn new(context: Arc<CollectContext>) -> Self {
        StubStrategy { context }
    }
}

impl CollectionStrategy for StubStrategy {
    fn label(&self) -> &str {
        "stub"
    }

    fn context(&self) -> &CollectContext {
        &self.context
    }

    fn collect(&self, unit: &str) -> Result<Option<Offer>> {
        log::debug!("collect/stub: refusing {}", unit);
        Ok(None)
    }
}
