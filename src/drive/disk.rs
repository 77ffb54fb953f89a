//! Mapping between record paths and the filesystem.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::store::FileRecord;

/// Directory (relative to the data directory) holding all uploaded bytes.
pub const UPLOADS_DIR: &str = "uploads";

/// Prefix older records carried in front of their paths.
const LEGACY_PREFIX: &str = "public/";

/// Filesystem layout under the data directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    data_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn uploads_root(&self) -> PathBuf {
        self.data_dir.join(UPLOADS_DIR)
    }

    /// Create the uploads root if it does not exist yet.
    pub async fn ensure_uploads_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.uploads_root()).await?;
        Ok(())
    }

    /// Absolute location of a stored record path.
    pub fn absolute(&self, record_path: &str) -> PathBuf {
        let rel = record_path
            .strip_prefix(LEGACY_PREFIX)
            .unwrap_or(record_path)
            .trim_start_matches('/');
        self.data_dir.join(rel)
    }

    /// Record path of the directory new entries under `parent` go into.
    /// Without a parent folder that is the uploads root.
    pub fn dir_for(&self, parent: Option<&FileRecord>) -> String {
        match parent {
            Some(folder) if folder.is_folder() => folder.path.clone(),
            _ => UPLOADS_DIR.to_string(),
        }
    }
}

/// Join a record directory path and an entry name.
pub fn child_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Reduce an uploaded file name to its last path component.
pub fn sanitize_upload_name(raw: &str) -> Result<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(AppError::BadRequest(format!("Invalid file name: {:?}", raw)));
    }
    Ok(name.to_string())
}

/// Validate and trim an entry name supplied by the client. `kind` names the
/// entry in the error message ("Folder", "File").
pub fn validate_name(raw: &str, kind: &str) -> Result<String> {
    let name = raw.trim();

    if name.is_empty() {
        return Err(AppError::BadRequest(format!("{} name is required", kind)));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(AppError::BadRequest(format!("Invalid name: {}", name)));
    }
    Ok(name.to_string())
}

/// Candidate names for `original`: the name itself, then `stem (n).ext`.
fn numbered_name(original: &str, n: u32) -> String {
    if n == 0 {
        return original.to_string();
    }
    match original.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", original, n),
    }
}

/// First variant of `original` for which `taken` is false.
pub fn unique_name(original: &str, mut taken: impl FnMut(&str) -> Result<bool>) -> Result<String> {
    let mut n = 0;
    loop {
        let candidate = numbered_name(original, n);
        if !taken(&candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}
