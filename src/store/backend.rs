//! Persistence backends for the metadata document.

use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::types::Document;
use crate::error::Result;

/// Loads and saves the whole metadata document.
pub trait Backend: Send + Sync {
    fn load(&self) -> Result<Document>;
    fn save(&self, doc: &Document) -> Result<()>;
}

/// Document kept as pretty-printed JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Open the document at `path`, creating an empty one if it is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let backend = Self { path: path.into() };

        if !backend.path.exists() {
            if let Some(parent) = backend.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            tracing::info!("Initializing empty database at {}", backend.path.display());
            backend.save(&Document::default())?;
        }

        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl Backend for JsonFileBackend {
    fn load(&self) -> Result<Document> {
        let data = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn save(&self, doc: &Document) -> Result<()> {
        let data = serde_json::to_string_pretty(doc)?;
        // Uniquely named sibling, so concurrent writers never share it.
        let mut tmp = NamedTempFile::new_in(self.dir())?;
        tmp.write_all(data.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Document held in memory; nothing touches the filesystem.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    doc: Mutex<Document>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: Document) -> Self {
        Self {
            doc: Mutex::new(doc),
        }
    }
}

impl Backend for MemoryBackend {
    fn load(&self) -> Result<Document> {
        Ok(self.doc.lock().clone())
    }

    fn save(&self, doc: &Document) -> Result<()> {
        *self.doc.lock() = doc.clone();
        Ok(())
    }
}
