use std::path::PathBuf;

use data_error::Result;
use data_offer::Offer;

/// Where the bytecode of a defined unit came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnitOrigin {
    /// The requester's own code sources.
    Local,
    /// Bytes registered in a cache store under this item name.
    Item(String),
    /// An archive on the requester's classpath.
    Archive(PathBuf),
}

/// Persists accepted offers and their file bytes keyed by item name.
///
/// Every operation is atomic on its own; callers get no transactions
/// spanning several operations.
pub trait CacheStore: Send + Sync {
    /// Whether a unit defined from `origin` was served by this store.
    fn is_from_cache(&self, origin: &UnitOrigin) -> bool;

    /// Items believed to contain `unit`, oldest registration first.
    fn item_names_for(&self, unit: &str) -> Vec<String>;

    /// Every item currently known.
    fn items(&self) -> Vec<String>;

    /// Metadata of a cached item, suitable as a candidate offer.
    fn build_offer_metadata(&self, item: &str) -> Option<Offer>;

    fn units_with_files_of(&self, item: &str) -> Vec<String>;

    /// Store `offer` under its name. Unknown or missing names are replaced
    /// by a freshly generated one, together with a new creation date.
    fn register_offer(&self, offer: &mut Offer) -> Result<()>;

    /// `Ok(None)` when the item does not hold the unit.
    fn bytecode_of(&self, unit: &str, item: &str) -> Result<Option<Vec<u8>>>;

    fn file_location_of(&self, file: &str, item: &str) -> Option<PathBuf>;

    /// Materialize a cached plain file at its declared path.
    fn deploy_file(&self, file: &str, item: &str) -> bool;

    fn remove_offer(&self, item: &str);

    fn close(&self) -> Result<()>;
}
