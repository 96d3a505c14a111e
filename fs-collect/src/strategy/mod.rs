//! Strategies deciding which files answer a request for one unit.

mod caching;
mod class_based;
mod complete;
mod dependency_based;
mod file_based;
mod stub;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use data_error::{LoaderError, Result};
use data_offer::{FileRecord, Offer};

use crate::context::CollectContext;

pub use caching::CachingStrategy;
pub use class_based::ClassBasedStrategy;
pub use complete::CompleteStrategy;
pub use dependency_based::DependencyBasedStrategy;
pub use file_based::FileBasedStrategy;
pub use stub::StubStrategy;

/// Computes the authoritative offer for a unit. Implementations are shared
/// between the worker threads of a responder.
pub trait CollectionStrategy: Send + Sync {
    /// Short label used in log lines.
    fn label(&self) -> &str;

    fn context(&self) -> &CollectContext;

    /// `Ok(None)` when neither a unit nor a resource of that name exists.
    fn collect(&self, unit: &str) -> Result<Option<Offer>>;

    /// Attach the bytes of a collected record.
    fn load_content(&self, file: &mut FileRecord) -> Result<()> {
        self.context().load_content(file)
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Stub,
    ClassBased,
    #[default]
    FileBased,
    DependencyBased,
    Complete,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StrategyKind::Stub => "stub",
            StrategyKind::ClassBased => "class-based",
            StrategyKind::FileBased => "file-based",
            StrategyKind::DependencyBased => "dependency-based",
            StrategyKind::Complete => "complete",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stub" => Ok(StrategyKind::Stub),
            "class-based" => Ok(StrategyKind::ClassBased),
            "file-based" => Ok(StrategyKind::FileBased),
            "dependency-based" => Ok(StrategyKind::DependencyBased),
            "complete" => Ok(StrategyKind::Complete),
            other => Err(LoaderError::Config(format!(
                "unknown collection strategy {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    /// Wrap the strategy into a [`CachingStrategy`] of this capacity.
    pub cache_capacity: Option<usize>,
}

impl StrategyConfig {
    pub fn build(
        &self,
        context: Arc<CollectContext>,
    ) -> Result<Arc<dyn CollectionStrategy>> {
        let strategy: Arc<dyn CollectionStrategy> = match self.kind {
            StrategyKind::Stub => Arc::new(StubStrategy::new(context)),
            StrategyKind::ClassBased => {
                Arc::new(ClassBasedStrategy::new(context))
            }
            StrategyKind::FileBased => Arc::new(FileBasedStrategy::new(context)),
            StrategyKind::DependencyBased => {
                Arc::new(DependencyBasedStrategy::new(context))
            }
            StrategyKind::Complete => Arc::new(CompleteStrategy::new(context)),
        };
        match self.cache_capacity {
            None => Ok(strategy),
            Some(0) => Err(LoaderError::Config(
                "strategy cache capacity must be positive".to_owned(),
            )),
            Some(capacity) => {
                Ok(Arc::new(CachingStrategy::new(strategy, capacity)))
            }
        }
    }
}
