use std::path::{Component, Path, PathBuf};

pub const CLASS_EXTENSION: &str = "class";

const SEPARATOR_ESCAPE: &str = "$%$";

/// `a.b.Foo` -> `a/b/Foo.class`, relative to a classpath root.
pub fn unit_to_path(unit: &str) -> PathBuf {
    let mut path: PathBuf = unit.split('.').collect();
    path.set_extension(CLASS_EXTENSION);
    path
}

/// `a.b.Foo` -> `a/b/Foo.class`, the entry name inside an archive.
pub fn unit_to_entry(unit: &str) -> String {
    format!("{}.{}", unit.replace('.', "/"), CLASS_EXTENSION)
}

/// `a/b/Foo.class` (relative to a classpath root) -> `a.b.Foo`.
pub fn path_to_unit(relative: &Path) -> Option<String> {
    if !is_class_file(relative) {
        return None;
    }
    let stem = relative.with_extension("");
    let mut parts = Vec::new();
    for component in stem.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_owned()),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

/// `a/b/Foo.class` inside an archive -> `a.b.Foo`.
pub fn entry_to_unit(entry: &str) -> Option<String> {
    let stem = entry.strip_suffix(".class")?;
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(stem.trim_start_matches('/').replace('/', "."))
}

pub fn is_class_file(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case(CLASS_EXTENSION))
}

/// Jar and zip files are both treated as opaque archives of units.
pub fn is_archive(path: &Path) -> bool {
    path.extension().map_or(false, |ext| {
        ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip")
    })
}

/// Flatten a relative file name into a single path segment.
pub fn escape_file_path(name: &str) -> String {
    name.replace(['/', '\\'], SEPARATOR_ESCAPE)
}
