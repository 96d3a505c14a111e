use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use zip::write::FileOptions;
use zip::ZipWriter;

use fs_utils::{unit_to_entry, unit_to_path};

pub fn write_class(root: &Path, unit: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(unit_to_path(unit));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, bytes).unwrap();
    path
}

pub fn write_jar(path: &Path, units: &[(&str, &[u8])]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (unit, bytes) in units {
        zip.start_file(unit_to_entry(unit), FileOptions::default())
            .unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

pub fn set_modified(path: &Path, millis: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_millis(millis))
        .unwrap();
}
