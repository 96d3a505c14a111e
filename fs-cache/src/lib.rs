//! Requester-side store of accepted offers.

mod cache;
mod config;
mod file_store;
mod index;
mod no_cache;
mod shared;
mod store;

pub use cache::BytecodeCache;
pub use config::{
    CacheConfig, CacheKind, DEFAULT_CACHE_FOLDER, DEFAULT_INDEX_FILE,
    DEFAULT_MEMORY_BYTES,
};
pub use file_store::FileCacheStore;
pub use index::{CacheIndex, ItemRecord, StoredFile, INDEX_VERSION};
pub use no_cache::NoCacheStore;
pub use shared::shared_references;
pub use store::{CacheStore, UnitOrigin};
