//! HTTP-level tests driving the router in-process.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use minidrive::config::{DEFAULT_MAX_UPLOAD_SIZE, DEFAULT_QUOTA_BYTES};
use minidrive::drive::{create_router, AppState, StorageLayout};
use minidrive::maintenance::purge_trash;
use minidrive::store::MetadataStore;

const BOUNDARY: &str = "minidrive-test-boundary";

struct TestApp {
    dir: TempDir,
    router: Router,
    store: MetadataStore,
}

impl TestApp {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = MetadataStore::open(dir.path().join("database.json"))
            .expect("Failed to open store");
        let layout = StorageLayout::new(dir.path().join("public"));
        std::fs::create_dir_all(layout.uploads_root()).unwrap();

        let state = AppState::new(store.clone(), layout, DEFAULT_QUOTA_BYTES);
        let router = create_router(state, DEFAULT_MAX_UPLOAD_SIZE);

        Self { dir, router, store }
    }

    fn uploads(&self) -> std::path::PathBuf {
        self.dir.path().join("public").join("uploads")
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        (status, body.to_vec())
    }

    async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.json(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn call(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        self.json(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn send_json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        self.json(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn create_folder(&self, name: &str, parent: Option<u64>) -> u64 {
        let (status, body) = self
            .send_json(
                Method::POST,
                "/api/folders",
                json!({ "name": name, "parentFolderId": parent }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create folder failed: {}", body);
        body["id"].as_u64().unwrap()
    }

    async fn upload(&self, filename: &str, content: &[u8], parent: Option<u64>) -> (StatusCode, Value) {
        self.json(upload_request(Some(filename), content, parent.map(|p| p.to_string())))
            .await
    }
}

fn upload_request(filename: Option<&str>, content: &[u8], parent: Option<String>) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    if let Some(parent) = parent {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"parentFolderId\"\r\n\r\n{parent}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(filename) = filename {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/api/files/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn names(list: &Value) -> Vec<String> {
    list.as_array()
        .expect("list should be an array")
        .iter()
        .map(|f| f["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_upload_same_name_twice_disambiguates() {
    let app = TestApp::new();
    let docs = app.create_folder("Docs", None).await;

    let (status, first) = app.upload("name.txt", b"one", Some(docs)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = app.upload("name.txt", b"two", Some(docs)).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(first["name"], "name.txt");
    assert_eq!(first["path"], "uploads/Docs/name.txt");
    assert_eq!(first["type"], "document");
    assert_eq!(first["size"], "3 Bytes");
    assert_eq!(second["name"], "name (1).txt");
    assert_ne!(first["id"], second["id"]);

    let dir = app.uploads().join("Docs");
    assert_eq!(std::fs::read(dir.join("name.txt")).unwrap(), b"one");
    assert_eq!(std::fs::read(dir.join("name (1).txt")).unwrap(), b"two");

    let (status, list) = app.get(&format!("/api/files?parentFolderId={}", docs)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_upload_requires_file_field() {
    let app = TestApp::new();
    let (status, body) = app.json(upload_request(None, b"", Some("".to_string()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test]
async fn test_upload_to_missing_parent_falls_back_to_root() {
    let app = TestApp::new();
    let (status, body) = app.upload("lost.pdf", b"%PDF", Some(999)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "uploads/lost.pdf");
    assert_eq!(body["type"], "pdf");

    let record = app.store.get(body["id"].as_u64().unwrap()).unwrap().unwrap();
    assert_eq!(record.parent_folder_id, None);
    assert!(app.uploads().join("lost.pdf").exists());
}

#[tokio::test]
async fn test_create_folder_validation() {
    let app = TestApp::new();
    let parent = app.create_folder("Work", None).await;
    let child = app.create_folder("Reports", Some(parent)).await;
    assert!(app.uploads().join("Work").join("Reports").is_dir());
    assert_eq!(
        app.store.get(child).unwrap().unwrap().path,
        "uploads/Work/Reports"
    );

    let (status, body) = app
        .send_json(Method::POST, "/api/folders", json!({ "name": " Work " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Folder with this name already exists");

    let (status, body) = app
        .send_json(Method::POST, "/api/folders", json!({ "name": "   " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Folder name is required");

    // Same name under a different parent is allowed; string ids are accepted.
    let (status, body) = app
        .send_json(
            Method::POST,
            "/api/folders",
            json!({ "name": "Work", "parentFolderId": child.to_string() }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parentFolderId"], child);
    assert_eq!(body["size"], "—");
}

#[tokio::test]
async fn test_delete_folder_trashes_subtree() {
    let app = TestApp::new();
    let a = app.create_folder("A", None).await;
    let b = app.create_folder("B", Some(a)).await;
    let (_, f) = app.upload("F.txt", b"data", Some(b)).await;
    let f = f["id"].as_u64().unwrap();
    let (_, other) = app.upload("other.txt", b"x", None).await;

    let (status, body) = app.call(Method::DELETE, &format!("/api/files/{}", a)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "File moved to trash successfully");

    for id in [a, b, f] {
        assert!(app.store.get(id).unwrap().unwrap().deleted);
    }

    let (_, trash) = app.get("/api/files?viewMode=trash").await;
    let mut trashed = names(&trash);
    trashed.sort();
    assert_eq!(trashed, vec!["A", "B", "F.txt"]);

    let (_, root) = app.get("/api/files").await;
    assert_eq!(names(&root), vec!["other.txt"]);
    assert_eq!(root[0]["id"], other["id"]);

    // Restoring the file brings its folders back with it.
    let (status, body) = app
        .call(Method::POST, &format!("/api/files/{}/restore", f))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["restored"], 3);
    let (_, trash) = app.get("/api/files?viewMode=trash").await;
    assert!(trash.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_star_toggle_and_starred_view() {
    let app = TestApp::new();
    let folder = app.create_folder("Deep", None).await;
    let (_, file) = app.upload("pic.png", b"png", Some(folder)).await;
    let id = file["id"].as_u64().unwrap();

    let (status, body) = app.call(Method::PUT, &format!("/api/files/{}/star", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["starred"], true);

    let (_, starred) = app.get("/api/files?starred=true").await;
    assert_eq!(names(&starred), vec!["pic.png"]);
    assert_eq!(starred[0]["starred"], true);
    assert_eq!(starred[0]["type"], "image");

    let (_, body) = app.call(Method::PUT, &format!("/api/files/{}/star", id)).await;
    assert_eq!(body["starred"], false);
    let (_, starred) = app.get("/api/files?viewMode=starred").await;
    assert!(starred.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_share_toggle_and_shared_view() {
    let app = TestApp::new();
    let (_, file) = app.upload("deck.pptx", b"ppt", None).await;
    let id = file["id"].as_u64().unwrap();

    let (_, body) = app.call(Method::PUT, &format!("/api/files/{}/share", id)).await;
    assert_eq!(body["shared"], true);

    let (_, shared) = app.get("/api/files?viewMode=shared").await;
    assert_eq!(names(&shared), vec!["deck.pptx"]);

    app.call(Method::DELETE, &format!("/api/files/{}", id)).await;
    let (_, shared) = app.get("/api/files?viewMode=shared").await;
    assert!(shared.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_storage_usage() {
    let app = TestApp::new();
    app.create_folder("Empty", None).await;
    app.upload("a.bin", &[0u8; 1000], None).await;
    app.upload("b.bin", &[0u8; 2000], None).await;

    let (status, body) = app.get("/api/storage").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 3000);
    assert_eq!(body["total"], DEFAULT_QUOTA_BYTES);
    assert_eq!(body["usedFormatted"], "2.93 KB");
    assert_eq!(body["totalFormatted"], "15 GB");

    let expected = 3000.0 / (15.0 * 1024.0 * 1024.0 * 1024.0) * 100.0;
    let percentage = body["percentage"].as_f64().unwrap();
    assert!((percentage - expected).abs() < 1e-12);
}

#[tokio::test]
async fn test_download() {
    let app = TestApp::new();
    let (_, file) = app.upload("hello.txt", b"hello world", None).await;
    let id = file["id"].as_u64().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get(format!("/api/files/{}/download", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"hello.txt\""));
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "11");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"hello world");

    let folder = app.create_folder("Dir", None).await;
    let (status, body) = app.get(&format!("/api/files/{}/download", folder)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot download a folder");

    std::fs::remove_file(app.uploads().join("hello.txt")).unwrap();
    let (status, body) = app.get(&format!("/api/files/{}/download", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "File not found on disk");
}

#[tokio::test]
async fn test_rename_and_move_keep_disk_in_sync() {
    let app = TestApp::new();
    let photos = app.create_folder("Photos", None).await;
    let archive = app.create_folder("Archive", None).await;
    let (_, pic) = app.upload("cat.jpg", b"meow", Some(photos)).await;
    let pic = pic["id"].as_u64().unwrap();

    let (status, body) = app
        .send_json(
            Method::PATCH,
            &format!("/api/files/{}", photos),
            json!({ "name": "Pets", "parentFolderId": archive }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "move failed: {}", body);
    assert_eq!(body["path"], "uploads/Archive/Pets");
    assert_eq!(body["parentFolderId"], archive);

    assert!(!app.uploads().join("Photos").exists());
    assert_eq!(
        std::fs::read(app.uploads().join("Archive/Pets/cat.jpg")).unwrap(),
        b"meow"
    );
    assert_eq!(
        app.store.get(pic).unwrap().unwrap().path,
        "uploads/Archive/Pets/cat.jpg"
    );

    // Moving a folder under itself is rejected and nothing changes on disk.
    let (status, _) = app
        .send_json(
            Method::PATCH,
            &format!("/api/files/{}", archive),
            json!({ "parentFolderId": photos }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.uploads().join("Archive").is_dir());

    // Back to the root under the original name.
    let (status, body) = app
        .send_json(
            Method::PATCH,
            &format!("/api/files/{}", photos),
            json!({ "name": "Photos", "parentFolderId": null }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "uploads/Photos");
    assert!(app.uploads().join("Photos/cat.jpg").exists());
}

#[tokio::test]
async fn test_trashed_folder_is_not_a_parent() {
    let app = TestApp::new();
    let old = app.create_folder("Old", None).await;
    let (status, _) = app.call(Method::DELETE, &format!("/api/files/{}", old)).await;
    assert_eq!(status, StatusCode::OK);

    // New entries aimed at the trashed folder land in the root.
    let (status, body) = app.upload("live.txt", b"keep me", Some(old)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "uploads/live.txt");
    let live = body["id"].as_u64().unwrap();
    assert_eq!(app.store.get(live).unwrap().unwrap().parent_folder_id, None);

    let sub = app.create_folder("Sub", Some(old)).await;
    assert_eq!(app.store.get(sub).unwrap().unwrap().parent_folder_id, None);

    // A live entry cannot be moved into the trash by way of its parent.
    let (status, body) = app
        .send_json(
            Method::PATCH,
            &format!("/api/files/{}", live),
            json!({ "parentFolderId": old }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], format!("Parent folder {} is in the trash", old));

    let (_, trash) = app.get("/api/files?viewMode=trash").await;
    assert_eq!(names(&trash), vec!["Old"]);

    assert_eq!(purge_trash(&app.store).unwrap(), 1);
    assert!(app.store.get(live).unwrap().is_some());
    assert!(app.uploads().join("live.txt").exists());
}

#[tokio::test]
async fn test_rename_updates_type_from_extension() {
    let app = TestApp::new();
    let (_, notes) = app.upload("notes.txt", b"hi", None).await;
    assert_eq!(notes["type"], "document");
    let id = notes["id"].as_u64().unwrap();

    let (status, body) = app
        .send_json(
            Method::PATCH,
            &format!("/api/files/{}", id),
            json!({ "name": "photo.png" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "rename failed: {}", body);
    assert_eq!(body["name"], "photo.png");
    assert_eq!(body["type"], "image");
    assert!(app.uploads().join("photo.png").exists());
}

#[tokio::test]
async fn test_errors_are_json() {
    let app = TestApp::new();

    let (status, body) = app.call(Method::DELETE, "/api/files/12345").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "File not found");

    let (status, body) = app.call(Method::PUT, "/api/files/abc/star").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid id"));

    let (status, body) = app.get("/api/files?viewMode=everything").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = app.get("/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "API route not found");
}

#[tokio::test]
async fn test_list_formats_records() {
    let app = TestApp::new();
    app.upload("big.xlsx", &vec![7u8; 1536], None).await;
    app.create_folder("Later", None).await;

    let (status, list) = app.get("/api/files?viewMode=my-drive").await;
    assert_eq!(status, StatusCode::OK);
    // Folders come first regardless of age.
    assert_eq!(names(&list), vec!["Later", "big.xlsx"]);

    let file = &list[1];
    assert_eq!(file["size"], "1.5 KB");
    assert_eq!(file["type"], "spreadsheet");
    assert_eq!(file["owner"], "me");
    assert_eq!(file["starred"], false);
    assert_eq!(file["parentFolderId"], Value::Null);
    assert!(file["modified"].as_str().unwrap().contains(", 20"));
}
