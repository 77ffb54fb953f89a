//! Offline maintenance: orphaned upload cleanup and trash purging.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::drive::{StorageLayout, UPLOADS_DIR};
use crate::error::{AppError, Result};
use crate::store::{FileRecord, MetadataStore};

/// A filesystem entry under the uploads root that no record references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    /// Path in record form, e.g. `uploads/old/a.txt`.
    pub path: String,
    pub full_path: PathBuf,
    pub is_dir: bool,
    /// Number of components below the uploads root.
    pub depth: usize,
}

/// Outcome of removing orphans.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub failures: usize,
}

/// Ids of trashed records with nothing live anywhere below them.
///
/// Every live record pins its ancestors, so a trashed folder that still
/// holds a live entry is never selected.
pub fn purgeable(records: &[FileRecord]) -> HashSet<u64> {
    let parents: HashMap<u64, Option<u64>> =
        records.iter().map(|f| (f.id, f.parent_folder_id)).collect();

    let mut pinned: HashSet<u64> = HashSet::new();
    for record in records.iter().filter(|f| !f.deleted) {
        let mut current = Some(record.id);
        while let Some(id) = current {
            if !pinned.insert(id) {
                break;
            }
            current = parents.get(&id).copied().flatten();
        }
    }

    records
        .iter()
        .filter(|f| f.deleted && !pinned.contains(&f.id))
        .map(|f| f.id)
        .collect()
}

/// Hard-delete the purgeable part of the trash, subtrees included.
/// Returns the number of records removed.
pub fn purge_trash(store: &MetadataStore) -> Result<usize> {
    let records = store.all()?;
    let doomed = purgeable(&records);

    let kept = records
        .iter()
        .filter(|f| f.deleted && !doomed.contains(&f.id))
        .count();
    if kept > 0 {
        tracing::warn!("Keeping {} trashed records that still hold live entries", kept);
    }

    let mut removed = 0;
    for id in doomed {
        // Descendants of an earlier purge are already gone and count 0.
        removed += store.delete(id)?;
    }

    tracing::info!("Purged {} records from the trash", removed);
    Ok(removed)
}

/// Walk the uploads tree and collect entries unknown to the store.
///
/// A directory that contains a referenced path is never an orphan, even if
/// the directory itself has no record.
pub fn find_orphans(store: &MetadataStore, layout: &StorageLayout) -> Result<Vec<Orphan>> {
    find_orphans_among(&store.all()?, layout)
}

/// Like [`find_orphans`], against an explicit set of records.
pub fn find_orphans_among(records: &[FileRecord], layout: &StorageLayout) -> Result<Vec<Orphan>> {
    let root = layout.uploads_root();
    if !root.exists() {
        tracing::info!("Uploads directory {} does not exist", root.display());
        return Ok(Vec::new());
    }

    let mut known: HashSet<String> = HashSet::new();
    for record in records {
        let path = record
            .path
            .strip_prefix("public/")
            .unwrap_or(&record.path)
            .to_string();
        // Every ancestor directory of a referenced path is in use too.
        let mut prefix = path.as_str();
        while let Some((parent, _)) = prefix.rsplit_once('/') {
            known.insert(parent.to_string());
            prefix = parent;
        }
        known.insert(path);
    }

    let mut orphans = Vec::new();
    for entry in WalkDir::new(&root).min_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(&root)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let components: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let path = format!("{}/{}", UPLOADS_DIR, components.join("/"));

        if !known.contains(&path) {
            orphans.push(Orphan {
                path,
                full_path: entry.path().to_path_buf(),
                is_dir: entry.file_type().is_dir(),
                depth: components.len(),
            });
        }
    }

    tracing::info!(
        "Found {} orphaned items, database references {} paths",
        orphans.len(),
        known.len()
    );
    Ok(orphans)
}

/// Delete orphan files, then orphan directories deepest first.
/// Failures are logged and counted; they do not stop the sweep.
pub fn remove_orphans(orphans: &[Orphan]) -> CleanupReport {
    let mut report = CleanupReport::default();

    for item in orphans.iter().filter(|o| !o.is_dir) {
        if !item.full_path.exists() {
            continue;
        }
        match std::fs::remove_file(&item.full_path) {
            Ok(()) => {
                tracing::info!("Deleted file: {}", item.path);
                report.files_removed += 1;
            }
            Err(e) => {
                tracing::error!("Error deleting {}: {}", item.path, e);
                report.failures += 1;
            }
        }
    }

    let mut dirs: Vec<&Orphan> = orphans.iter().filter(|o| o.is_dir).collect();
    dirs.sort_by(|a, b| b.depth.cmp(&a.depth));

    for item in dirs {
        if !item.full_path.exists() {
            continue;
        }
        match std::fs::remove_dir_all(&item.full_path) {
            Ok(()) => {
                tracing::info!("Deleted folder: {}", item.path);
                report.dirs_removed += 1;
            }
            Err(e) => {
                tracing::error!("Error deleting {}: {}", item.path, e);
                report.failures += 1;
            }
        }
    }

    report
}
