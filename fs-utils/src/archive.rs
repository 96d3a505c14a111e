//! Read access to jar/zip archives of compiled units.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use data_error::Result;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::names::entry_to_unit;

fn open(path: &Path) -> Result<ZipArchive<File>> {
    Ok(ZipArchive::new(File::open(path)?)?)
}

/// Names of all units stored in the archive, in entry order.
pub fn list_units(path: &Path) -> Result<Vec<String>> {
    let mut archive = open(path)?;
    let mut units = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        if let Some(unit) = entry_to_unit(entry.name()) {
            units.push(unit);
        }
    }
    Ok(units)
}

/// Bytes of `entry`, or `None` when the archive has no such entry.
pub fn read_entry(path: &Path, entry: &str) -> Result<Option<Vec<u8>>> {
    let mut archive = open(path)?;
    let mut file = match archive.by_name(entry) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

pub fn contains_entry(path: &Path, entry: &str) -> Result<bool> {
    let mut archive = open(path)?;
    let found = archive.by_name(entry).is_ok();
    Ok(found)
}
