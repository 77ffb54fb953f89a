//! Metadata document and record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owner stamped on every record; there is a single implicit user.
pub const DEFAULT_OWNER: &str = "me";

// ============================================================================
// Record Kinds
// ============================================================================

/// Kind of a stored entry. Folders share the record shape with files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Folder,
    Document,
    Spreadsheet,
    Presentation,
    Pdf,
    Image,
    File,
}

impl FileType {
    /// Classify a file by the extension after its last dot.
    pub fn from_filename(filename: &str) -> Self {
        let ext = match filename.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return FileType::File,
        };

        match ext.as_str() {
            "pdf" => FileType::Pdf,
            "doc" | "docx" | "txt" => FileType::Document,
            "xls" | "xlsx" => FileType::Spreadsheet,
            "ppt" | "pptx" => FileType::Presentation,
            "jpg" | "jpeg" | "png" | "gif" => FileType::Image,
            _ => FileType::File,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Folder => "folder",
            FileType::Document => "document",
            FileType::Spreadsheet => "spreadsheet",
            FileType::Presentation => "presentation",
            FileType::Pdf => "pdf",
            FileType::Image => "image",
            FileType::File => "file",
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, FileType::Folder)
    }
}

// ============================================================================
// Records
// ============================================================================

/// A file or folder entry of the metadata document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    #[serde(default)]
    pub size: u64,
    /// Location relative to the data directory, e.g. `uploads/Photos/a.png`.
    pub path: String,
    #[serde(default)]
    pub parent_folder_id: Option<u64>,
    #[serde(default, with = "flag")]
    pub starred: bool,
    #[serde(default, with = "flag")]
    pub deleted: bool,
    #[serde(default, with = "flag")]
    pub shared: bool,
    #[serde(default = "default_owner")]
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_folder(&self) -> bool {
        self.file_type.is_folder()
    }
}

fn default_owner() -> String {
    DEFAULT_OWNER.to_string()
}

/// The whole persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub files: Vec<FileRecord>,
    pub next_id: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            next_id: 1,
        }
    }
}

/// Fields supplied by the caller of `insert`; the store fills in the rest.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
    pub path: String,
    pub parent_folder_id: Option<u64>,
}

impl NewRecord {
    pub fn folder(name: impl Into<String>, path: impl Into<String>, parent: Option<u64>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::Folder,
            size: 0,
            path: path.into(),
            parent_folder_id: parent,
        }
    }

    pub fn file(
        name: impl Into<String>,
        size: u64,
        path: impl Into<String>,
        parent: Option<u64>,
    ) -> Self {
        let name = name.into();
        Self {
            file_type: FileType::from_filename(&name),
            name,
            size,
            path: path.into(),
            parent_folder_id: parent,
        }
    }
}

/// Partial update merged into an existing record by `update`.
///
/// `parent_folder_id` is doubly optional: `Some(None)` moves the record to
/// the root.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub path: Option<String>,
    pub size: Option<u64>,
    pub parent_folder_id: Option<Option<u64>>,
    pub starred: Option<bool>,
    pub deleted: Option<bool>,
    pub shared: Option<bool>,
}

// ============================================================================
// Flag Encoding
// ============================================================================

/// Boolean flags are written as `0`/`1`. Reading accepts JSON booleans and
/// the integers 0 and 1; anything else is a malformed document.
mod flag {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        deserializer.deserialize_any(FlagVisitor)
    }

    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a boolean or the integer 0 or 1")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
            }
        }
    }
}
