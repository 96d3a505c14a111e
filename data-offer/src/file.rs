use std::fmt;

use serde::{Deserialize, Serialize};

/// What a [`FileRecord`] carries and how the requesting side applies it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
pub enum ContentKind {
    /// Bytecode of exactly one compiled unit, named after the unit.
    Class,
    /// An archive of compiled units, registered on the classpath as a whole.
    Jar,
    /// A non-code file that is written to disk as-is.
    ReadonlyFile,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContentKind::Class => "CLASS",
            ContentKind::Jar => "JAR",
            ContentKind::ReadonlyFile => "READONLY_FILE",
        };
        f.write_str(label)
    }
}

/// One physical artifact shipped inside an [`Offer`](crate::Offer).
///
/// `content == None` means "reuse the bytes cached under the offer name";
/// it is how metadata-only candidates and unchanged files travel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique within one offer. Unit name for `Class`, archive file name
    /// for `Jar`, declared relative path for `ReadonlyFile`.
    pub name: String,
    /// Modification time in milliseconds since the Unix epoch.
    pub last_modified: i64,
    /// Length in bytes.
    pub size: u64,
    pub kind: ContentKind,
    pub content: Option<Vec<u8>>,
    /// Absolute path of the archive on the owner side (`Jar` only).
    pub location_hint: Option<String>,
}

impl FileRecord {
    /// Describe a file without attaching its bytes.
    pub fn new(
        name: impl Into<String>,
        last_modified: i64,
        size: u64,
        kind: ContentKind,
    ) -> Self {
        FileRecord {
            name: name.into(),
            last_modified,
            size,
            kind,
            content: None,
            location_hint: None,
        }
    }

    /// Describe a file together with its bytes; the size is taken from them.
    pub fn with_content(
        name: impl Into<String>,
        last_modified: i64,
        kind: ContentKind,
        content: Vec<u8>,
    ) -> Self {
        let mut file =
            FileRecord::new(name, last_modified, content.len() as u64, kind);
        file.content = Some(content);
        file
    }

    pub fn with_location_hint(mut self, hint: impl Into<String>) -> Self {
        self.location_hint = Some(hint.into());
        self
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Same timestamp and same size, i.e. no patch needed.
    pub fn same_version(&self, other: &FileRecord) -> bool {
        self.last_modified == other.last_modified && self.size == other.size
    }

    /// Copy of this record with the bytes dropped.
    pub fn metadata(&self) -> FileRecord {
        FileRecord {
            content: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}B): {}, last modified {}",
            self.name,
            self.kind,
            self.size,
            if self.content.is_some() {
                "WITH CONT"
            } else {
                "NO CONT"
            },
            self.last_modified
        )
    }
}
