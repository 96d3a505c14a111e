//! Owner-side collection of the files answering a request for a unit.

pub mod catalog;
mod context;
pub mod graph;
pub mod marker;
mod order;
pub mod strategy;

#[cfg(test)]
mod test_utils;

pub use catalog::{Classpath, UnitLocation};
pub use context::CollectContext;
pub use graph::{UnitGraph, UnitInfo};
pub use marker::{
    collect_dependent_files, DependencyMarker, DependentFile,
    ProviderRegistry,
};
pub use order::order_for_definition;
pub use strategy::{
    CachingStrategy, ClassBasedStrategy, CollectionStrategy,
    CompleteStrategy, DependencyBasedStrategy, FileBasedStrategy,
    StrategyConfig, StrategyKind, StubStrategy,
};
