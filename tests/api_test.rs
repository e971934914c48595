use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use media_split_backend::config::AppConfig;
use media_split_backend::{AppState, create_app};
use serde_json::Value;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "---------------------------123456789012345678901234567";
const SESSION_COOKIE: &str = "msb_session=integration-test-session";

struct TestEnv {
    state: AppState,
    app: Router,
    _upload_root: TempDir,
    _split_root: TempDir,
}

fn test_env() -> TestEnv {
    let upload_root = TempDir::new().unwrap();
    let split_root = TempDir::new().unwrap();

    let config = AppConfig {
        upload_root: upload_root.path().to_path_buf(),
        split_root: split_root.path().to_path_buf(),
        ..AppConfig::development()
    };

    let state = AppState::from_config(config);
    let app = create_app(state.clone());

    TestEnv {
        state,
        app,
        _upload_root: upload_root,
        _split_root: split_root,
    }
}

fn multipart_upload(filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::COOKIE, SESSION_COOKIE)
        .body(Body::from(body))
        .unwrap()
}

fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, SESSION_COOKIE)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::COOKIE, SESSION_COOKIE)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// The download reap runs on a spawned task after the body drops, so tests
/// poll for the folder to disappear instead of asserting immediately.
async fn wait_for_removal(path: &PathBuf) {
    for _ in 0..200 {
        if !path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} was never reaped", path.display());
}

#[tokio::test]
async fn test_upload_then_explicit_cleanup() {
    let env = test_env();

    let response = env
        .app
        .clone()
        .oneshot(multipart_upload("test.mp4", b"fake mp4 bytes"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["filename"], "test.mp4");

    let staged = env.state.config.upload_root.join("test.mp4");
    assert!(staged.exists());

    let response = env
        .app
        .clone()
        .oneshot(form_post("/cleanup", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["success"], true);
    assert!(!staged.exists());

    // Reaping an already-clean session is a quiet no-op
    let response = env
        .app
        .clone()
        .oneshot(form_post("/cleanup", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_sets_session_cookie() {
    let env = test_env();

    let mut request = multipart_upload("test.mp4", b"x");
    request.headers_mut().remove(header::COOKIE);

    let response = env.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("fresh session should set a cookie")
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("msb_session="));
}

#[tokio::test]
async fn test_upload_rejects_disallowed_extension() {
    let env = test_env();

    let response = env
        .app
        .clone()
        .oneshot(multipart_upload("notes.txt", b"plain text"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Invalid file type");
    assert!(!env.state.config.upload_root.join("notes.txt").exists());
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let env = test_env();

    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"comment\"\r\n\r\n\
         hello\r\n\
         --{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = env.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No file part in request");
}

#[tokio::test]
async fn test_duplicate_upload_from_second_session_rejected() {
    let env = test_env();

    let response = env
        .app
        .clone()
        .oneshot(multipart_upload("movie.mp4", b"bytes"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut request = multipart_upload("movie.mp4", b"other bytes");
    request.headers_mut().insert(
        header::COOKIE,
        "msb_session=some-other-session".parse().unwrap(),
    );

    let response = env.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(
        json["error"],
        "A file with this name is already being processed"
    );
}

#[tokio::test]
async fn test_process_unknown_file() {
    let env = test_env();

    let response = env
        .app
        .clone()
        .oneshot(form_post("/process", "filename=never-uploaded.mp4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Uploaded file not found");

    // No filesystem writes happened
    let entries: Vec<_> = std::fs::read_dir(&env.state.config.split_root)
        .unwrap()
        .collect();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_split_progress_unknown_is_zero() {
    let env = test_env();

    let response = env
        .app
        .clone()
        .oneshot(get("/progress/unknown.mp4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["progress"], 0.0);
}

#[tokio::test]
async fn test_transfer_status_unknown_task() {
    let env = test_env();

    let response = env
        .app
        .clone()
        .oneshot(get(&format!("/transfer/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Transfer task not found");
}

#[tokio::test]
async fn test_transfer_missing_folder() {
    let env = test_env();

    let response = env
        .app
        .clone()
        .oneshot(form_post(
            "/transfer",
            "filename=movie.mp4&folder_name=missing",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Folder not found");
}

#[tokio::test]
async fn test_transfer_lifecycle_over_noop_client() {
    let env = test_env();

    let folder = env.state.config.split_root.join("movie");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("movie_part001.mp4"), b"part one").unwrap();
    std::fs::write(folder.join("movie_part002.mp4"), b"part two").unwrap();

    let response = env
        .app
        .clone()
        .oneshot(form_post(
            "/transfer",
            "filename=movie.mp4&folder_name=movie",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    let task_id = json["task_id"].as_str().unwrap().to_string();

    let mut terminal = None;
    for _ in 0..200 {
        let response = env
            .app
            .clone()
            .oneshot(get(&format!("/transfer/{task_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = json_body(response).await;
        if status["done"] == true || !status["error"].is_null() {
            terminal = Some(status);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let status = terminal.expect("transfer never reached a terminal state");
    assert_eq!(status["done"], true);
    assert_eq!(status["progress"], 100.0);
    assert_eq!(status["stage"], "Completed");

    // A finished task cannot be cancelled
    let response = env
        .app
        .clone()
        .oneshot(form_post(&format!("/transfer/{task_id}/cancel"), ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_zip_missing_folder() {
    let env = test_env();

    let response = env
        .app
        .clone()
        .oneshot(get("/download/zip/missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_zip_streams_archive_and_reaps_folder() {
    let env = test_env();

    let folder = env.state.config.split_root.join("movie");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("movie_part001.mp4"), b"first part").unwrap();
    std::fs::write(folder.join("movie_part002.mp4"), b"second part").unwrap();
    env.state
        .ledger
        .register_split_folder("integration-test-session", folder.clone());

    let response = env
        .app
        .clone()
        .oneshot(get("/download/zip/movie"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/zip"
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 2);
    assert_eq!(archive.by_index(0).unwrap().name(), "movie_part001.mp4");

    // Folder and its ledger entry disappear once the body is consumed
    wait_for_removal(&folder).await;
    assert!(
        env.state
            .ledger
            .snapshot("integration-test-session")
            .is_empty()
    );
}

#[tokio::test]
async fn test_download_last_separate_file_reaps_folder() {
    let env = test_env();

    let folder = env.state.config.split_root.join("movie");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("movie_part001.mp4"), b"the only part").unwrap();
    env.state
        .ledger
        .register_split_folder("integration-test-session", folder.clone());

    let response = env
        .app
        .clone()
        .oneshot(get("/download/separate/movie/movie_part001.mp4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"the only part");

    wait_for_removal(&folder).await;
    assert!(
        env.state
            .ledger
            .snapshot("integration-test-session")
            .is_empty()
    );
}

#[tokio::test]
async fn test_download_separate_keeps_folder_when_files_remain() {
    let env = test_env();

    let folder = env.state.config.split_root.join("movie");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("movie_part001.mp4"), b"one").unwrap();
    std::fs::write(folder.join("movie_part002.mp4"), b"two").unwrap();

    let response = env
        .app
        .clone()
        .oneshot(get("/download/separate/movie/movie_part001.mp4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let _ = response.into_body().collect().await.unwrap();

    // Give any stray cleanup a moment, then confirm nothing was removed
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(folder.exists());
    assert!(folder.join("movie_part002.mp4").exists());
}

#[tokio::test]
async fn test_index_reaps_session_on_page_load() {
    let env = test_env();

    let staged = env.state.config.upload_root.join("movie.mp4");
    std::fs::write(&staged, b"bytes").unwrap();
    env.state
        .ledger
        .register_upload("integration-test-session", staged.clone());

    let response = env.app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(!staged.exists());
    assert!(
        env.state
            .ledger
            .snapshot("integration-test-session")
            .is_empty()
    );
}

#[tokio::test]
async fn test_health() {
    let env = test_env();

    let response = env.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["upload_root"], "writable");
}
