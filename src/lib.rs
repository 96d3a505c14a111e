//! On-demand loading of compiled units from a remote owner, reusing offers
//! cached on the requesting side.
//!
//! The owner runs an [`OwnerResponder`] over a collection strategy; the
//! requester runs a [`RequesterResolver`] over a [`CodeRegistry`] and a
//! cache store. Both talk through a [`MessageChannel`].

pub mod channel;
pub mod config;
pub mod registry;
pub mod resolver;
pub mod responder;

#[cfg(test)]
mod test_utils;

pub use channel::{BusClient, Envelope, LocalBus, MessageChannel};
pub use config::{
    LoaderConfig, DEFAULT_REQUEST_QUEUE, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_RESPONSE_QUEUE,
};
pub use registry::{CodeRegistry, CodeSource, DefinedUnit, DirectorySource};
pub use resolver::RequesterResolver;
pub use responder::{OwnerResponder, ServeHandle};

pub use data_error::{LoaderError, Result};
pub use data_offer::{ContentKind, FileRecord, Message, Offer, Request, Response};
pub use fs_cache::{CacheConfig, CacheKind, CacheStore, UnitOrigin};
pub use fs_collect::{
    CollectionStrategy, DependencyMarker, DependentFile, ProviderRegistry,
    StrategyConfig, StrategyKind, UnitGraph, UnitInfo,
};
