use crate::api::error::AppError;
use crate::api::middleware::session::SessionId;
use crate::services::archive;
use crate::services::reaper::SessionReaper;
use crate::utils::validation::{sanitize_filename, validate_folder_name};
use axum::{
    Extension,
    body::Body,
    extract::{Path as AxumPath, State},
    http::{StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_util::io::ReaderStream;
use tracing::info;

/// Reaps a split folder once the response body it rode out on is dropped —
/// whether the download completed or the client vanished mid-stream. Also
/// keeps the staged ZIP temp file alive until then.
struct ReapOnDrop {
    reaper: Arc<SessionReaper>,
    session: String,
    folder: PathBuf,
    _staged: Option<NamedTempFile>,
}

impl Drop for ReapOnDrop {
    fn drop(&mut self) {
        let reaper = self.reaper.clone();
        let session = std::mem::take(&mut self.session);
        let folder = std::mem::take(&mut self.folder);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                reaper.reap_folder(&session, &folder).await;
            });
        }
    }
}

fn streamed_body(file: tokio::fs::File, guard: Option<ReapOnDrop>) -> Body {
    let stream = ReaderStream::with_capacity(file, 64 * 1024).map(move |chunk| {
        let _guard = &guard;
        chunk
    });
    Body::from_stream(stream)
}

fn attachment_disposition(name: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(name, NON_ALPHANUMERIC)
    )
}

#[utoipa::path(
    get,
    path = "/download/zip/{folder_name}",
    params(
        ("folder_name" = String, Path, description = "Split folder name")
    ),
    responses(
        (status = 200, description = "ZIP archive of the folder; the folder is reaped when the response completes"),
        (status = 404, description = "Folder not found")
    ),
    tag = "download"
)]
pub async fn download_zip(
    State(state): State<crate::AppState>,
    Extension(session): Extension<SessionId>,
    AxumPath(folder_name): AxumPath<String>,
) -> Result<Response, AppError> {
    validate_folder_name(&folder_name).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let folder = state.config.split_root.join(&folder_name);
    if !tokio::fs::try_exists(&folder).await.unwrap_or(false) {
        return Err(AppError::NotFound("Folder not found".to_string()));
    }

    let staged = archive::stage_folder_zip(&folder)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to build archive: {e:#}")))?;

    let file = tokio::fs::File::open(staged.path())
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open staged archive: {e}")))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to stat staged archive: {e}")))?
        .len();

    info!(
        "Streaming {} byte archive of {} to session {}",
        length, folder_name, session.0
    );

    let guard = ReapOnDrop {
        reaper: state.reaper.clone(),
        session: session.0,
        folder,
        _staged: Some(staged),
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            attachment_disposition(&format!("{folder_name}.zip")),
        )
        .body(streamed_body(file, Some(guard)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

#[utoipa::path(
    get,
    path = "/download/separate/{folder_name}/{filename}",
    params(
        ("folder_name" = String, Path, description = "Split folder name"),
        ("filename" = String, Path, description = "Part filename within the folder")
    ),
    responses(
        (status = 200, description = "Single part; the folder is reaped if this was its last file"),
        (status = 404, description = "Folder or file not found")
    ),
    tag = "download"
)]
pub async fn download_separate(
    State(state): State<crate::AppState>,
    Extension(session): Extension<SessionId>,
    AxumPath((folder_name, filename)): AxumPath<(String, String)>,
) -> Result<Response, AppError> {
    validate_folder_name(&folder_name).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let filename = sanitize_filename(&filename).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let folder = state.config.split_root.join(&folder_name);
    if !tokio::fs::try_exists(&folder).await.unwrap_or(false) {
        return Err(AppError::NotFound("Folder not found".to_string()));
    }

    let file_path = folder.join(&filename);
    if !tokio::fs::try_exists(&file_path).await.unwrap_or(false) {
        return Err(AppError::NotFound("File not found".to_string()));
    }

    let is_last_file = {
        let mut remaining = 0usize;
        let mut others = false;
        let mut entries = tokio::fs::read_dir(&folder)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read folder: {e}")))?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            remaining += 1;
            if entry.file_name().to_string_lossy() != filename.as_str() {
                others = true;
            }
        }
        remaining == 1 && !others
    };

    let file = tokio::fs::File::open(&file_path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open part: {e}")))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to stat part: {e}")))?
        .len();

    let guard = is_last_file.then(|| {
        info!(
            "Last file of {} downloading; folder will be reaped on completion",
            folder_name
        );
        ReapOnDrop {
            reaper: state.reaper.clone(),
            session: session.0,
            folder,
            _staged: None,
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.as_ref())
        .header(header::CONTENT_LENGTH, length)
        .header(header::CONTENT_DISPOSITION, attachment_disposition(&filename))
        .body(streamed_body(file, guard))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}
