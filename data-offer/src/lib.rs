//! Records exchanged between a requester and an owner of compiled units.

mod file;
mod message;
mod offer;

pub use file::{ContentKind, FileRecord};
pub use message::{Message, Request, Response};
pub use offer::Offer;
