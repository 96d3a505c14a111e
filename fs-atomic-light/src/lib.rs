use data_error::{LoaderError, Result};

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Write data to a temporary file next to the destination and rename it
/// into place, so readers never observe a partially written file.
///
/// `filename` may contain separators; missing parent folders are created.
/// Returns the final path.
pub fn temp_and_move(
    data: &[u8],
    dest_dir: impl AsRef<Path>,
    filename: &str,
) -> Result<PathBuf> {
    write_file(data, dest_dir.as_ref(), filename, None)
}

/// Same as [`temp_and_move`], and the written file gets `modified` as its
/// modification time.
pub fn temp_and_move_stamped(
    data: &[u8],
    dest_dir: impl AsRef<Path>,
    filename: &str,
    modified: SystemTime,
) -> Result<PathBuf> {
    write_file(data, dest_dir.as_ref(), filename, Some(modified))
}

fn write_file(
    data: &[u8],
    dest_dir: &Path,
    filename: &str,
    modified: Option<SystemTime>,
) -> Result<PathBuf> {
    let dest = dest_dir.join(filename);
    let parent = dest
        .parent()
        .ok_or_else(|| LoaderError::Path(format!("{} has no parent", filename)))?;
    fs::create_dir_all(parent)?;

    let temp = parent.join(format!(
        ".{}.{}.{}.tmp",
        dest.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("file"),
        process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let written = (|| -> Result<()> {
        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        if let Some(modified) = modified {
            file.set_modified(modified)?;
        }
        file.sync_all()?;
        Ok(())
    })();
    if let Err(err) = written.and_then(|_| Ok(fs::rename(&temp, &dest)?)) {
        let _ = fs::remove_file(&temp);
        return Err(err);
    }

    Ok(dest)
}
