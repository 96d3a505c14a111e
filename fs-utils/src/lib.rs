//! Small filesystem helpers shared by the collecting and caching crates.

pub mod archive;
pub mod names;

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use data_error::Result;

pub use names::{
    entry_to_unit, escape_file_path, is_archive, is_class_file,
    path_to_unit, unit_to_entry, unit_to_path, CLASS_EXTENSION,
};

/// Milliseconds between the Unix epoch and `time`.
pub fn epoch_millis(time: SystemTime) -> Result<i64> {
    Ok(time.duration_since(SystemTime::UNIX_EPOCH)?.as_millis() as i64)
}

/// The inverse of [`epoch_millis`]; negative values clamp to the epoch.
pub fn from_epoch_millis(millis: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}

pub fn now_millis() -> Result<i64> {
    epoch_millis(SystemTime::now())
}

/// Modification time and length of the file at `path`.
pub fn file_stamp(path: &Path) -> Result<(i64, u64)> {
    let metadata = fs::metadata(path)?;
    Ok((epoch_millis(metadata.modified()?)?, metadata.len()))
}

/// Remove a directory tree, logging instead of failing.
pub fn remove_dir_quietly(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = fs::remove_dir_all(path) {
        log::warn!("failed to delete {}: {}", path.display(), err);
    }
}
