use std::fmt;

use serde::{Deserialize, Serialize};

use crate::file::FileRecord;

/// A named bundle of files answering one request.
///
/// The name stays `None` while an offer is freshly collected; the cache
/// store assigns it on first registration and it never changes after
/// that. Both parties use it as the handle for avoiding re-transfer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub name: Option<String>,
    /// Milliseconds since the Unix epoch, set together with the name.
    pub created_at: i64,
    /// `None` when an offer is accepted unchanged.
    pub files: Option<Vec<FileRecord>>,
    /// Units whose file dependencies are fully satisfied by `files`.
    /// Kept in insertion order without duplicates.
    pub units_with_files: Vec<String>,
}

impl Offer {
    /// A fresh, unnamed offer over `files`.
    pub fn new(files: Vec<FileRecord>) -> Self {
        Offer {
            name: None,
            created_at: 0,
            files: Some(files),
            units_with_files: Vec::new(),
        }
    }

    /// An offer known under `name`, without any files attached yet.
    pub fn named(name: impl Into<String>, created_at: i64) -> Self {
        Offer {
            name: Some(name.into()),
            created_at,
            files: None,
            units_with_files: Vec::new(),
        }
    }

    pub fn has_name(&self) -> bool {
        self.name.as_deref().map_or(false, |name| !name.is_empty())
    }

    pub fn has_files(&self) -> bool {
        self.files.as_ref().map_or(false, |files| !files.is_empty())
    }

    pub fn files(&self) -> &[FileRecord] {
        self.files.as_deref().unwrap_or(&[])
    }

    pub fn file(&self, name: &str) -> Option<&FileRecord> {
        self.files().iter().find(|file| file.name == name)
    }

    pub fn contains_file(&self, name: &str) -> bool {
        self.file(name).is_some()
    }

    /// Append the units that are not recorded yet, keeping the order of the
    /// ones that are.
    pub fn merge_units_with_files<S: AsRef<str>>(&mut self, units: &[S]) {
        for unit in units {
            let unit = unit.as_ref();
            if !self.units_with_files.iter().any(|known| known == unit) {
                self.units_with_files.push(unit.to_owned());
            }
        }
    }

    /// Append every file of `others` whose name is not present yet.
    ///
    /// Used to recover the unchanged files of a candidate after the owner
    /// answered with a patch that only lists the changed ones.
    pub fn merge_missing_files(&mut self, others: &[FileRecord]) {
        if others.is_empty() {
            return;
        }
        let mut files = self.files.take().unwrap_or_default();
        for other in others {
            if !files.iter().any(|file| file.name == other.name) {
                files.push(other.clone());
            }
        }
        self.files = Some(files);
    }

    /// Copy of this offer with every file's bytes dropped.
    pub fn metadata(&self) -> Offer {
        Offer {
            files: self
                .files
                .as_ref()
                .map(|files| files.iter().map(FileRecord::metadata).collect()),
            ..self.clone()
        }
    }

    /// Total size in bytes of the listed files.
    pub fn total_size(&self) -> u64 {
        self.files().iter().map(|file| file.size).sum()
    }
}

impl fmt::Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("NEW OFFER");
        match &self.files {
            Some(files) => write!(
                f,
                "{} ({}): {} file(s)",
                name,
                self.created_at,
                files.len()
            ),
            None => write!(f, "{} ({}): no files", name, self.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::ContentKind;

    fn file(name: &str) -> FileRecord {
        FileRecord::new(name, 1, 1, ContentKind::Class)
    }

    #[test]
    fn name_and_files_presence() {
        let mut offer = Offer::default();
        assert!(!offer.has_name());
        assert!(!offer.has_files());

        offer.name = Some(String::new());
        assert!(!offer.has_name());

        offer.files = Some(Vec::new());
        assert!(!offer.has_files());

        let offer = Offer::new(vec![file("a")]);
        assert!(offer.has_files());
        assert!(offer.contains_file("a"));
        assert!(!offer.contains_file("b"));
    }

    #[test]
    fn merge_units_keeps_previous_order() {
        let mut offer = Offer::default();
        offer.units_with_files = vec!["b".to_owned(), "a".to_owned()];
        offer.merge_units_with_files(&["a", "c", "c"]);
        assert_eq!(offer.units_with_files, vec!["b", "a", "c"]);
    }

    #[test]
    fn merge_missing_files_adds_only_unknown_names() {
        let mut patched = Offer::new(vec![FileRecord::with_content(
            "a",
            2,
            ContentKind::Class,
            vec![1, 2],
        )]);
        patched.merge_missing_files(&[file("a"), file("b")]);

        let names: Vec<_> =
            patched.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(patched.file("a").unwrap().has_content());
    }

    #[test]
    fn merge_into_offer_without_files() {
        let mut accepted = Offer::named("item", 0);
        accepted.merge_missing_files(&[file("x")]);
        assert_eq!(accepted.files().len(), 1);
    }

    #[test]
    fn metadata_strips_content_only() {
        let mut offer = Offer::new(vec![FileRecord::with_content(
            "a",
            2,
            ContentKind::Class,
            vec![1, 2, 3],
        )]);
        offer.units_with_files.push("a".to_owned());
        let meta = offer.metadata();
        assert!(!meta.files()[0].has_content());
        assert_eq!(meta.files()[0].size, 3);
        assert_eq!(meta.units_with_files, offer.units_with_files);
    }
}
