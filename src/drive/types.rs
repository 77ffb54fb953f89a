//! REST request and response types.

use serde::{Deserialize, Deserializer, Serialize};

use super::format::{format_date, format_file_size, FOLDER_SIZE};
use crate::error::{AppError, Result};
use crate::store::{FileRecord, FileType};

// ============================================================================
// Requests
// ============================================================================

/// Query parameters of `GET /api/files`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub parent_folder_id: Option<String>,
    pub starred: Option<String>,
    pub view_mode: Option<String>,
}

/// Folder id as clients send it: a JSON number or a (possibly empty) string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdParam {
    Number(u64),
    Text(String),
}

impl IdParam {
    /// Empty strings mean "no folder".
    pub fn resolve(&self) -> Result<Option<u64>> {
        match self {
            IdParam::Number(n) => Ok(Some(*n)),
            IdParam::Text(s) => parse_optional_id(Some(s.as_str())),
        }
    }
}

/// Body of `POST /api/folders`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_folder_id: Option<IdParam>,
}

/// Body of `PATCH /api/files/:id`.
///
/// A missing `parentFolderId` keeps the current parent; `null` moves the
/// entry to the root.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub parent_folder_id: Option<Option<IdParam>>,
}

fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Parse a record id from a path segment.
pub fn parse_id(raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid id: {}", raw)))
}

/// Parse an optional folder id; absent or empty means the root.
pub fn parse_optional_id(raw: Option<&str>) -> Result<Option<u64>> {
    match raw.map(str::trim) {
        None | Some("") | Some("null") => Ok(None),
        Some(s) => parse_id(s).map(Some),
    }
}

// ============================================================================
// Responses
// ============================================================================

/// A record as shown in listings.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedFile {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub size: String,
    pub modified: String,
    pub owner: String,
    pub starred: bool,
    pub shared: bool,
    pub path: String,
    pub parent_folder_id: Option<u64>,
}

impl From<&FileRecord> for ListedFile {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            file_type: record.file_type,
            size: display_size(record),
            modified: format_date(&record.modified_at),
            owner: record.owner.clone(),
            starred: record.starred,
            shared: record.shared,
            path: record.path.clone(),
            parent_folder_id: record.parent_folder_id,
        }
    }
}

pub fn display_size(record: &FileRecord) -> String {
    if record.is_folder() {
        FOLDER_SIZE.to_string()
    } else {
        format_file_size(record.size)
    }
}

/// Response of `POST /api/files/upload`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub size: String,
    pub path: String,
    pub message: String,
}

/// Response of `POST /api/folders`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderResponse {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub size: String,
    pub path: String,
    pub parent_folder_id: Option<u64>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub message: String,
    pub restored: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StarResponse {
    pub starred: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareResponse {
    pub shared: bool,
}

/// Response of `GET /api/storage`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub used: u64,
    pub total: u64,
    pub used_formatted: String,
    pub total_formatted: String,
    pub percentage: f64,
}

impl StorageInfo {
    /// Usage of `used` bytes out of a `total` byte quota.
    pub fn new(used: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            (used as f64 / total as f64 * 100.0).min(100.0)
        };

        Self {
            used,
            total,
            used_formatted: format_file_size(used),
            total_formatted: format_file_size(total),
            percentage,
        }
    }
}
