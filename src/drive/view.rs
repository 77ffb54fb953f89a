//! Listing views over the stored records.

use std::cmp::Ordering;

use crate::error::{AppError, Result};
use crate::store::FileRecord;

/// Maximum number of entries in the recent view.
pub const RECENT_LIMIT: usize = 50;

/// Which slice of the drive a listing shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Non-deleted entries directly under a folder (`None` is the root).
    Drive(Option<u64>),
    Starred,
    Trash,
    Shared,
    Recent,
}

impl View {
    /// Pick the view from the listing query parameters.
    ///
    /// `trash`, `shared` and `recent` view modes win over the starred flag;
    /// the starred flag wins over the drive view.
    pub fn from_query(view_mode: Option<&str>, starred: bool, parent: Option<u64>) -> Result<Self> {
        match view_mode.filter(|m| !m.is_empty()) {
            Some("trash") => Ok(View::Trash),
            Some("shared") => Ok(View::Shared),
            Some("recent") => Ok(View::Recent),
            Some("starred") => Ok(View::Starred),
            None | Some("my-drive") | Some("drive") => Ok(if starred {
                View::Starred
            } else {
                View::Drive(parent)
            }),
            Some(other) => Err(AppError::BadRequest(format!("Invalid view mode: {}", other))),
        }
    }

    fn includes(&self, record: &FileRecord) -> bool {
        match self {
            View::Drive(parent) => !record.deleted && record.parent_folder_id == *parent,
            View::Starred => record.starred && !record.deleted,
            View::Trash => record.deleted,
            View::Shared => record.shared && !record.deleted,
            View::Recent => !record.deleted,
        }
    }

    /// Filter and order `records` for this view.
    pub fn apply(&self, records: Vec<FileRecord>) -> Vec<FileRecord> {
        let mut selected: Vec<FileRecord> =
            records.into_iter().filter(|r| self.includes(r)).collect();

        match self {
            View::Recent => {
                selected.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
                selected.truncate(RECENT_LIMIT);
            }
            _ => selected.sort_by(folders_first),
        }

        selected
    }
}

/// Folders before files, newest first within each group.
fn folders_first(a: &FileRecord, b: &FileRecord) -> Ordering {
    b.is_folder()
        .cmp(&a.is_folder())
        .then_with(|| b.modified_at.cmp(&a.modified_at))
}
