//! REST handlers for files, folders and storage usage.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Uri},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::disk::{child_path, sanitize_upload_name, unique_name, validate_name, StorageLayout};
use super::format::{format_file_size, FOLDER_SIZE};
use super::types::*;
use super::view::View;
use crate::error::{AppError, Result};
use crate::store::{FileRecord, FileType, MetadataStore, NewRecord, RecordPatch};

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: MetadataStore,
    pub layout: StorageLayout,
    /// Display-only storage quota in bytes.
    pub quota_bytes: u64,
}

impl AppState {
    pub fn new(store: MetadataStore, layout: StorageLayout, quota_bytes: u64) -> Self {
        Self {
            store,
            layout,
            quota_bytes,
        }
    }

    /// Run a store operation on the blocking pool. Every store call reads or
    /// rewrites the document file.
    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&MetadataStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| AppError::Internal(format!("Store task failed: {}", e)))?
    }

    /// Look up the folder new entries should go into. A missing parent, one
    /// that is not a folder, or one in the trash falls back to the root.
    async fn resolve_parent(&self, requested: Option<u64>) -> Result<Option<FileRecord>> {
        let Some(id) = requested else {
            return Ok(None);
        };

        match self.with_store(move |s| s.get(id)).await? {
            Some(folder) if folder.is_folder() && !folder.deleted => Ok(Some(folder)),
            Some(folder) if folder.deleted => {
                tracing::warn!("Parent folder {} is in the trash, using uploads root", id);
                Ok(None)
            }
            _ => {
                tracing::warn!("Parent folder {} not found, using uploads root", id);
                Ok(None)
            }
        }
    }

    async fn require(&self, id: u64) -> Result<FileRecord> {
        self.with_store(move |s| s.get(id))
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Listing and upload
        .route("/api/files", get(list_files))
        .route("/api/files/upload", post(upload_file))
        .route("/api/folders", post(create_folder))
        // Individual entries
        .route(
            "/api/files/:id",
            axum::routing::delete(delete_file).patch(update_file),
        )
        .route("/api/files/:id/restore", post(restore_file))
        .route("/api/files/:id/star", put(toggle_star))
        .route("/api/files/:id/share", put(toggle_share))
        .route("/api/files/:id/download", get(download_file))
        // Usage
        .route("/api/storage", get(storage_usage))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn not_found(uri: Uri) -> AppError {
    if uri.path().starts_with("/api/") {
        AppError::NotFound("API route not found".to_string())
    } else {
        AppError::NotFound(format!("No route for {}", uri.path()))
    }
}

// ============================================================================
// Listing
// ============================================================================

/// GET /api/files - List entries for a view.
async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ListedFile>>> {
    let parent = parse_optional_id(query.parent_folder_id.as_deref())?;
    let starred = query.starred.as_deref() == Some("true");
    let view = View::from_query(query.view_mode.as_deref(), starred, parent)?;

    let records = match view {
        View::Drive(parent) => state.with_store(move |s| s.get_all(parent)).await?,
        _ => state.with_store(|s| s.all()).await?,
    };
    let total = records.len();
    let records = view.apply(records);

    tracing::debug!("{:?}: {} of {} records", view, records.len(), total);

    Ok(Json(records.iter().map(ListedFile::from).collect()))
}

// ============================================================================
// Upload and Folder Creation
// ============================================================================

/// POST /api/files/upload - Store an uploaded file.
async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut upload: Option<(String, Bytes)> = None;
    let mut parent_raw: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                upload = Some((filename, data));
            }
            Some("parentFolderId") => parent_raw = Some(field.text().await?),
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    let (raw_name, data) =
        upload.ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;
    let original = sanitize_upload_name(&raw_name)?;

    let requested = parse_optional_id(parent_raw.as_deref())?;
    let parent = state.resolve_parent(requested).await?;
    let parent_id = parent.as_ref().map(|p| p.id);

    let dir = state.layout.dir_for(parent.as_ref());
    let abs_dir = state.layout.absolute(&dir);
    tokio::fs::create_dir_all(&abs_dir).await?;

    // Taken on disk or by a sibling record.
    let probe_dir = abs_dir.clone();
    let name = state
        .with_store(move |store| {
            unique_name(&original, |candidate| {
                Ok(probe_dir.join(candidate).exists()
                    || store.exists(candidate, parent_id, None)?)
            })
        })
        .await?;

    let dest = abs_dir.join(&name);
    let size = data.len() as u64;
    tokio::fs::write(&dest, &data).await?;

    let path = child_path(&dir, &name);
    let record = NewRecord::file(name.clone(), size, path.clone(), parent_id);
    let file_type = record.file_type;

    let id = match state.with_store(move |s| s.insert(record)).await {
        Ok(id) => id,
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&dest).await {
                tracing::error!("Failed to remove {} after insert error: {}", dest.display(), cleanup);
            }
            return Err(e);
        }
    };

    tracing::info!("Uploaded '{}' ({} bytes) as {} with id {}", name, size, path, id);

    Ok(Json(UploadResponse {
        id,
        name,
        file_type,
        size: format_file_size(size),
        path,
        message: "File uploaded successfully".to_string(),
    }))
}

/// POST /api/folders - Create a folder.
async fn create_folder(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<CreateFolderRequest>, JsonRejection>,
) -> Result<Json<FolderResponse>> {
    let Json(req) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let name = validate_name(req.name.as_deref().unwrap_or_default(), "Folder")?;
    let requested = match &req.parent_folder_id {
        Some(param) => param.resolve()?,
        None => None,
    };
    let parent = state.resolve_parent(requested).await?;
    let parent_id = parent.as_ref().map(|p| p.id);

    let candidate = name.clone();
    if state
        .with_store(move |s| s.exists(&candidate, parent_id, None))
        .await?
    {
        return Err(AppError::BadRequest(
            "Folder with this name already exists".to_string(),
        ));
    }

    let path = child_path(&state.layout.dir_for(parent.as_ref()), &name);
    tokio::fs::create_dir_all(state.layout.absolute(&path)).await?;

    let record = NewRecord::folder(name.clone(), path.clone(), parent_id);
    let id = state.with_store(move |s| s.insert(record)).await?;

    tracing::info!("Created folder '{}' at {} with id {}", name, path, id);

    Ok(Json(FolderResponse {
        id,
        name,
        file_type: FileType::Folder,
        size: FOLDER_SIZE.to_string(),
        path,
        parent_folder_id: parent_id,
        message: "Folder created successfully".to_string(),
    }))
}

// ============================================================================
// Individual Entry Operations
// ============================================================================

/// DELETE /api/files/:id - Move an entry (and its subtree) to the trash.
async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    let id = parse_id(&id)?;
    let record = state.require(id).await?;

    let changed = state
        .with_store(move |s| s.set_deleted(id, true))
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    tracing::info!(
        "Moved {} {} (ID: {}) to trash, {} records marked",
        record.file_type.as_str(),
        record.name,
        id,
        changed
    );

    Ok(Json(MessageResponse {
        message: "File moved to trash successfully".to_string(),
    }))
}

/// POST /api/files/:id/restore - Bring an entry back from the trash.
async fn restore_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RestoreResponse>> {
    let id = parse_id(&id)?;
    let record = state.require(id).await?;

    let restored = state
        .with_store(move |s| s.set_deleted(id, false))
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    tracing::info!("Restored {} (ID: {}), {} records", record.name, id, restored);

    Ok(Json(RestoreResponse {
        message: "File restored successfully".to_string(),
        restored,
    }))
}

/// PUT /api/files/:id/star - Toggle the starred flag.
async fn toggle_star(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StarResponse>> {
    let id = parse_id(&id)?;
    let record = state.require(id).await?;

    let patch = RecordPatch {
        starred: Some(!record.starred),
        ..Default::default()
    };
    let updated = state
        .with_store(move |s| s.update(id, patch))
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    Ok(Json(StarResponse {
        starred: updated.starred,
    }))
}

/// PUT /api/files/:id/share - Toggle the shared flag.
async fn toggle_share(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ShareResponse>> {
    let id = parse_id(&id)?;
    let record = state.require(id).await?;

    let patch = RecordPatch {
        shared: Some(!record.shared),
        ..Default::default()
    };
    let updated = state
        .with_store(move |s| s.update(id, patch))
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    Ok(Json(ShareResponse {
        shared: updated.shared,
    }))
}

/// PATCH /api/files/:id - Rename and/or move an entry.
async fn update_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: std::result::Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<ListedFile>> {
    let id = parse_id(&id)?;
    let Json(req) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let record = state.require(id).await?;

    let kind = if record.is_folder() { "Folder" } else { "File" };
    let name = match req.name.as_deref() {
        Some(raw) => validate_name(raw, kind)?,
        None => record.name.clone(),
    };
    let parent_id = match req.parent_folder_id {
        None => record.parent_folder_id,
        Some(None) => None,
        Some(Some(param)) => param.resolve()?,
    };

    if name == record.name && parent_id == record.parent_folder_id {
        return Ok(Json(ListedFile::from(&record)));
    }

    // Unlike uploads, a move never falls back to the root.
    let parent = match parent_id {
        Some(pid) => {
            let folder = state
                .with_store(move |s| s.get(pid))
                .await?
                .filter(FileRecord::is_folder)
                .ok_or_else(|| AppError::NotFound(format!("Parent folder {} not found", pid)))?;
            if folder.deleted && !record.deleted {
                return Err(AppError::BadRequest(format!(
                    "Parent folder {} is in the trash",
                    pid
                )));
            }
            Some(folder)
        }
        None => None,
    };
    if let Some(pid) = parent_id {
        if pid == id || state.with_store(move |s| s.descendants(id)).await?.contains(&pid) {
            return Err(AppError::BadRequest(
                "A folder cannot be moved into itself".to_string(),
            ));
        }
    }
    let candidate = name.clone();
    if state
        .with_store(move |s| s.exists(&candidate, parent_id, Some(id)))
        .await?
    {
        return Err(AppError::BadRequest(format!(
            "An item named '{}' already exists here",
            name
        )));
    }

    let new_path = child_path(&state.layout.dir_for(parent.as_ref()), &name);
    let from = state.layout.absolute(&record.path);
    let to = state.layout.absolute(&new_path);

    if tokio::fs::try_exists(&to).await? {
        return Err(AppError::BadRequest(format!(
            "Destination {} already exists on disk",
            new_path
        )));
    }

    let moved_on_disk = if tokio::fs::try_exists(&from).await? {
        if let Some(dir) = to.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::rename(&from, &to).await?;
        true
    } else {
        tracing::warn!("{} is missing on disk, updating metadata only", record.path);
        false
    };

    let (moved_name, moved_path) = (name.clone(), new_path.clone());
    let committed = state
        .with_store(move |s| s.relocate(id, &moved_name, parent_id, &moved_path))
        .await
        .and_then(|r| r.ok_or_else(|| AppError::NotFound("File not found".to_string())));

    match committed {
        Ok(updated) => {
            tracing::info!("Moved {} (ID: {}) from {} to {}", updated.name, id, record.path, new_path);
            Ok(Json(ListedFile::from(&updated)))
        }
        Err(e) => {
            if moved_on_disk {
                if let Err(rollback) = tokio::fs::rename(&to, &from).await {
                    tracing::error!(
                        "Failed to move {} back to {}: {}",
                        to.display(),
                        from.display(),
                        rollback
                    );
                }
            }
            Err(e)
        }
    }
}

/// GET /api/files/:id/download - Stream the stored bytes.
async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let id = parse_id(&id)?;
    let record = state.require(id).await?;

    if record.is_folder() {
        return Err(AppError::BadRequest("Cannot download a folder".to_string()));
    }

    let full_path = state.layout.absolute(&record.path);
    let file = match tokio::fs::File::open(&full_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("File not found on disk".to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata().await?.len();

    let mime = mime_guess::from_path(&record.name).first_or_octet_stream();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(mime.as_ref())?);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&content_disposition(&record.name))?,
    );

    tracing::debug!("Downloading {} ({} bytes)", record.path, len);

    Ok((headers, Body::from_stream(ReaderStream::new(file))))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Internal(format!("Invalid header value {:?}: {}", value, e)))
}

/// `attachment` disposition with an ASCII fallback name and the UTF-8 name.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

// ============================================================================
// Storage Usage
// ============================================================================

/// GET /api/storage - Bytes used by all files against the quota.
async fn storage_usage(State(state): State<Arc<AppState>>) -> Result<Json<StorageInfo>> {
    let used: u64 = state
        .with_store(|s| s.all())
        .await?
        .iter()
        .filter(|f| !f.is_folder())
        .map(|f| f.size)
        .sum();

    Ok(Json(StorageInfo::new(used, state.quota_bytes)))
}
