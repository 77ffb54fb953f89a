//! Metadata store over a single JSON document.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use super::backend::{Backend, JsonFileBackend, MemoryBackend};
use super::types::*;
use crate::error::{AppError, Result};

/// File and folder records with hierarchy queries.
///
/// Every operation loads the whole document, works on a copy and saves it
/// back. Operations are serialized inside the process; separate processes
/// sharing one document file still race (last write wins).
#[derive(Clone)]
pub struct MetadataStore {
    backend: Arc<dyn Backend>,
    lock: Arc<Mutex<()>>,
}

impl MetadataStore {
    /// Create a store on top of the given backend.
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open (or initialize) a JSON document file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(JsonFileBackend::open(path)?))
    }

    /// Store backed by memory only.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    fn read<T>(&self, f: impl FnOnce(&Document) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        let doc = self.backend.load()?;
        f(&doc)
    }

    /// Run `f` against the document and persist it when `f` returns `Some`.
    fn modify<T>(&self, f: impl FnOnce(&mut Document) -> Result<Option<T>>) -> Result<Option<T>> {
        let _guard = self.lock.lock();
        let mut doc = self.backend.load()?;
        let out = f(&mut doc)?;
        if out.is_some() {
            self.backend.save(&doc)?;
        }
        Ok(out)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All records directly under `parent_id` (`None` is the root).
    /// Deleted records are included; callers filter.
    pub fn get_all(&self, parent_id: Option<u64>) -> Result<Vec<FileRecord>> {
        self.read(|doc| {
            Ok(doc
                .files
                .iter()
                .filter(|f| f.parent_folder_id == parent_id)
                .cloned()
                .collect())
        })
    }

    /// Every record in the document.
    pub fn all(&self) -> Result<Vec<FileRecord>> {
        self.read(|doc| Ok(doc.files.clone()))
    }

    pub fn get(&self, id: u64) -> Result<Option<FileRecord>> {
        self.read(|doc| Ok(doc.files.iter().find(|f| f.id == id).cloned()))
    }

    /// Whether a record named `name` sits under `parent_id`, ignoring
    /// `exclude_id`. Deleted records still occupy their name.
    pub fn exists(&self, name: &str, parent_id: Option<u64>, exclude_id: Option<u64>) -> Result<bool> {
        self.read(|doc| Ok(name_taken(&doc.files, name, parent_id, exclude_id)))
    }

    /// Ids of every transitive descendant of `id`.
    pub fn descendants(&self, id: u64) -> Result<Vec<u64>> {
        self.read(|doc| collect_descendants(&doc.files, id))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert a record and return its newly assigned id.
    pub fn insert(&self, record: NewRecord) -> Result<u64> {
        let id = self.modify(|doc| {
            validate_name(&record.name)?;
            check_parent(&doc.files, record.parent_folder_id, true)?;
            if name_taken(&doc.files, &record.name, record.parent_folder_id, None) {
                return Err(duplicate_name(&record.name));
            }

            let id = doc.next_id;
            doc.next_id += 1;

            let now = Utc::now();
            doc.files.push(FileRecord {
                id,
                name: record.name,
                file_type: record.file_type,
                size: if record.file_type.is_folder() { 0 } else { record.size },
                path: record.path,
                parent_folder_id: record.parent_folder_id,
                starred: false,
                deleted: false,
                shared: false,
                owner: DEFAULT_OWNER.to_string(),
                created_at: now,
                modified_at: now,
            });

            Ok(Some(id))
        })?;

        id.ok_or_else(|| AppError::Internal("Insert produced no id".to_string()))
    }

    /// Merge `patch` into record `id`. Returns `None` if the record is absent.
    pub fn update(&self, id: u64, patch: RecordPatch) -> Result<Option<FileRecord>> {
        self.modify(|doc| {
            let Some(idx) = position(&doc.files, id) else {
                return Ok(None);
            };

            let current = &doc.files[idx];
            if patch.name.is_some() || patch.parent_folder_id.is_some() {
                let name = patch.name.as_deref().unwrap_or(&current.name);
                let parent = patch.parent_folder_id.unwrap_or(current.parent_folder_id);
                validate_placement(&doc.files, id, name, parent)?;
            }

            let record = &mut doc.files[idx];
            if let Some(name) = patch.name {
                if !record.is_folder() {
                    record.file_type = FileType::from_filename(&name);
                }
                record.name = name;
            }
            if let Some(path) = patch.path {
                record.path = path;
            }
            if let Some(size) = patch.size {
                record.size = size;
            }
            if let Some(parent) = patch.parent_folder_id {
                record.parent_folder_id = parent;
            }
            if let Some(starred) = patch.starred {
                record.starred = starred;
            }
            if let Some(deleted) = patch.deleted {
                record.deleted = deleted;
            }
            if let Some(shared) = patch.shared {
                record.shared = shared;
            }
            record.modified_at = Utc::now();

            Ok(Some(record.clone()))
        })
    }

    /// Permanently remove record `id` and all of its descendants.
    /// Returns how many records were removed (0 if `id` is absent).
    pub fn delete(&self, id: u64) -> Result<usize> {
        let removed = self.modify(|doc| {
            if position(&doc.files, id).is_none() {
                return Ok(None);
            }

            let mut doomed: HashSet<u64> = collect_descendants(&doc.files, id)?
                .into_iter()
                .collect();
            doomed.insert(id);

            let before = doc.files.len();
            doc.files.retain(|f| !doomed.contains(&f.id));
            Ok(Some(before - doc.files.len()))
        })?;

        Ok(removed.unwrap_or(0))
    }

    /// Set the `deleted` flag on `id` and every descendant in one write.
    ///
    /// Restoring (`deleted == false`) also restores deleted ancestors so the
    /// record is reachable from the root again. Returns the number of records
    /// whose flag changed, or `None` if `id` is absent.
    pub fn set_deleted(&self, id: u64, deleted: bool) -> Result<Option<usize>> {
        self.modify(|doc| {
            if position(&doc.files, id).is_none() {
                return Ok(None);
            }

            let mut targets: HashSet<u64> = collect_descendants(&doc.files, id)?
                .into_iter()
                .collect();
            targets.insert(id);
            if !deleted {
                targets.extend(collect_ancestors(&doc.files, id)?);
            }

            let now = Utc::now();
            let mut changed = 0;
            for record in doc.files.iter_mut() {
                if targets.contains(&record.id) && record.deleted != deleted {
                    record.deleted = deleted;
                    record.modified_at = now;
                    changed += 1;
                }
            }

            Ok(Some(changed))
        })
    }

    /// Rename and/or move record `id` to `path`, rewriting the paths of all
    /// descendants stored below the old location.
    pub fn relocate(
        &self,
        id: u64,
        name: &str,
        parent_id: Option<u64>,
        path: &str,
    ) -> Result<Option<FileRecord>> {
        self.modify(|doc| {
            let Some(idx) = position(&doc.files, id) else {
                return Ok(None);
            };
            validate_placement(&doc.files, id, name, parent_id)?;

            let old_prefix = format!("{}/", doc.files[idx].path);
            let subtree: HashSet<u64> = collect_descendants(&doc.files, id)?.into_iter().collect();

            for record in doc.files.iter_mut() {
                if !subtree.contains(&record.id) {
                    continue;
                }
                let moved = record
                    .path
                    .strip_prefix(&old_prefix)
                    .map(|rest| format!("{}/{}", path, rest));
                if let Some(moved) = moved {
                    record.path = moved;
                }
            }

            let record = &mut doc.files[idx];
            if !record.is_folder() {
                record.file_type = FileType::from_filename(name);
            }
            record.name = name.to_string();
            record.parent_folder_id = parent_id;
            record.path = path.to_string();
            record.modified_at = Utc::now();

            Ok(Some(record.clone()))
        })
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore").finish_non_exhaustive()
    }
}

// ============================================================================
// Hierarchy Helpers
// ============================================================================

fn position(files: &[FileRecord], id: u64) -> Option<usize> {
    files.iter().position(|f| f.id == id)
}

fn name_taken(files: &[FileRecord], name: &str, parent: Option<u64>, exclude: Option<u64>) -> bool {
    files
        .iter()
        .any(|f| f.name == name && f.parent_folder_id == parent && Some(f.id) != exclude)
}

fn duplicate_name(name: &str) -> AppError {
    AppError::BadRequest(format!("An item named '{}' already exists here", name))
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("Name must not be empty".to_string()));
    }
    Ok(())
}

/// A non-root parent must be an existing folder. A live record may not go
/// under a folder that is in the trash.
fn check_parent(files: &[FileRecord], parent: Option<u64>, live: bool) -> Result<()> {
    let Some(parent_id) = parent else {
        return Ok(());
    };

    match files.iter().find(|f| f.id == parent_id) {
        Some(p) if p.is_folder() && live && p.deleted => Err(AppError::BadRequest(format!(
            "Parent folder {} is in the trash",
            parent_id
        ))),
        Some(p) if p.is_folder() => Ok(()),
        Some(_) => Err(AppError::BadRequest(format!(
            "Parent {} is not a folder",
            parent_id
        ))),
        None => Err(AppError::NotFound(format!(
            "Parent folder {} not found",
            parent_id
        ))),
    }
}

/// Checks for putting record `id` under `parent` with `name`.
fn validate_placement(files: &[FileRecord], id: u64, name: &str, parent: Option<u64>) -> Result<()> {
    validate_name(name)?;
    let live = files.iter().any(|f| f.id == id && !f.deleted);
    check_parent(files, parent, live)?;

    if let Some(parent_id) = parent {
        if parent_id == id || collect_descendants(files, id)?.contains(&parent_id) {
            return Err(AppError::BadRequest(
                "A folder cannot be moved into itself".to_string(),
            ));
        }
    }

    if name_taken(files, name, parent, Some(id)) {
        return Err(duplicate_name(name));
    }
    Ok(())
}

/// Transitive children of `root`, found iteratively. Each record has one
/// parent, so reaching a record twice means the links form a cycle.
fn collect_descendants(files: &[FileRecord], root: u64) -> Result<Vec<u64>> {
    let mut children: HashMap<u64, Vec<u64>> = HashMap::new();
    for f in files {
        if let Some(parent) = f.parent_folder_id {
            children.entry(parent).or_default().push(f.id);
        }
    }

    let mut visited = HashSet::from([root]);
    let mut stack = vec![root];
    let mut out = Vec::new();

    while let Some(current) = stack.pop() {
        for &child in children.get(&current).into_iter().flatten() {
            if !visited.insert(child) {
                return Err(AppError::Cycle { id: child });
            }
            out.push(child);
            stack.push(child);
        }
    }

    Ok(out)
}

/// Ids on the parent chain of `id`, nearest first.
fn collect_ancestors(files: &[FileRecord], id: u64) -> Result<Vec<u64>> {
    let parents: HashMap<u64, Option<u64>> =
        files.iter().map(|f| (f.id, f.parent_folder_id)).collect();

    let mut visited = HashSet::from([id]);
    let mut out = Vec::new();
    let mut current = parents.get(&id).copied().flatten();

    while let Some(parent) = current {
        if !visited.insert(parent) {
            return Err(AppError::Cycle { id: parent });
        }
        out.push(parent);
        current = parents.get(&parent).copied().flatten();
    }

    Ok(out)
}
