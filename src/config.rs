use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use data_error::{LoaderError, Result};
use fs_cache::CacheConfig;
use fs_collect::{
    Classpath, CollectContext, CollectionStrategy, ProviderRegistry,
    StrategyConfig, UnitGraph,
};

pub const DEFAULT_REQUEST_QUEUE: &str = "CS_ClassRequest";
pub const DEFAULT_RESPONSE_QUEUE: &str = "CS_ClassResponse";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

/// Settings shared by both sides of the protocol. Every field falls back
/// to its default when absent from the configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub request_queue: String,
    pub response_queue: String,
    pub request_timeout_ms: u64,
    /// Look up resources in local sources before asking the owner.
    pub local_first: bool,
    pub strategy: StrategyConfig,
    /// Directories and archives searched by the owner, in order.
    pub classpath: Vec<PathBuf>,
    /// Base of the relative paths named by dependency markers.
    pub base_dir: PathBuf,
    /// JSON manifest describing the units and their relations.
    pub graph: Option<PathBuf>,
    pub cache: CacheConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            request_queue: DEFAULT_REQUEST_QUEUE.to_owned(),
            response_queue: DEFAULT_RESPONSE_QUEUE.to_owned(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            local_first: true,
            strategy: StrategyConfig::default(),
            classpath: Vec::new(),
            base_dir: PathBuf::from("."),
            graph: None,
            cache: CacheConfig::default(),
        }
    }
}

impl LoaderConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|err| {
            LoaderError::Config(format!(
                "cannot read {}: {}",
                path.display(),
                err
            ))
        })?;
        serde_json::from_str(&json).map_err(|err| {
            LoaderError::Config(format!("{}: {}", path.display(), err))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The unit graph named by `graph`, or an empty one.
    pub fn load_graph(&self) -> Result<UnitGraph> {
        match &self.graph {
            Some(path) => UnitGraph::from_file(path),
            None => Ok(UnitGraph::new()),
        }
    }

    /// Everything a strategy needs to look at the owner's classpath.
    pub fn collect_context(
        &self,
        providers: ProviderRegistry,
    ) -> Result<Arc<CollectContext>> {
        Ok(Arc::new(CollectContext::new(
            Classpath::new(self.classpath.clone()),
            self.load_graph()?,
            providers,
            self.base_dir.clone(),
        )))
    }

    /// The configured strategy over a fresh collect context.
    pub fn build_strategy(
        &self,
        providers: ProviderRegistry,
    ) -> Result<Arc<dyn CollectionStrategy>> {
        self.strategy.build(self.collect_context(providers)?)
    }
}
