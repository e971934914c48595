use crate::api::error::AppError;
use crate::api::middleware::session::SessionId;
use crate::services::splitter::SplitError;
use crate::utils::validation::sanitize_filename;
use axum::{
    Extension, Form, Json,
    extract::{Path as AxumPath, State},
};
use tracing::{error, info};

use super::types::{ProcessRequest, ProcessResponse, SplitProgressResponse};

#[utoipa::path(
    post,
    path = "/process",
    request_body(content = ProcessRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "File split into parts", body = ProcessResponse),
        (status = 404, description = "Uploaded file not found"),
        (status = 500, description = "Split tool failed")
    ),
    tag = "pipeline"
)]
pub async fn process_file(
    State(state): State<crate::AppState>,
    Extension(session): Extension<SessionId>,
    Form(request): Form<ProcessRequest>,
) -> Result<Json<ProcessResponse>, AppError> {
    let filename =
        sanitize_filename(&request.filename).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let upload_path = state.config.upload_root.join(&filename);

    if !tokio::fs::try_exists(&upload_path).await.unwrap_or(false) {
        return Err(AppError::NotFound("Uploaded file not found".to_string()));
    }

    let stem = upload_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AppError::BadRequest("Filename has no stem".to_string()))?
        .to_string();
    let output_folder = state.config.split_root.join(&stem);

    tokio::fs::create_dir_all(&output_folder)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create output folder: {e}")))?;

    // Registered before splitting so a failed run's partial parts still
    // belong to this session and get reaped with it
    state
        .ledger
        .register_split_folder(&session.0, output_folder.clone());

    info!(
        "Splitting {} into {} for session {}",
        filename,
        output_folder.display(),
        session.0
    );

    let split_files = state
        .splitter
        .split(
            &upload_path,
            &output_folder,
            state.config.max_part_bytes(),
            &state.progress,
        )
        .await
        .map_err(|e| match e {
            SplitError::DurationUnavailable => {
                AppError::ExternalTool("Could not determine media duration".to_string())
            }
            other => AppError::ExternalTool(format!("Failed to split media: {other}")),
        })?;

    // The original is no longer needed once its parts exist
    state.ledger.release(&session.0, &upload_path);
    if let Err(e) = tokio::fs::remove_file(&upload_path).await {
        error!("Failed to remove original {}: {}", upload_path.display(), e);
    }

    state.progress.set_split_progress(&filename, 100.0);

    Ok(Json(ProcessResponse {
        success: true,
        filename,
        split_files,
        output_folder: output_folder.display().to_string(),
        folder_name: stem,
    }))
}

#[utoipa::path(
    get,
    path = "/progress/{filename}",
    params(
        ("filename" = String, Path, description = "Original filename the split was started with")
    ),
    responses(
        (status = 200, description = "Current split percentage (0 if unknown)", body = SplitProgressResponse)
    ),
    tag = "pipeline"
)]
pub async fn split_progress(
    State(state): State<crate::AppState>,
    AxumPath(filename): AxumPath<String>,
) -> Json<SplitProgressResponse> {
    let progress = state.progress.split_progress(&filename);
    Json(SplitProgressResponse {
        progress: (progress * 100.0).round() / 100.0,
    })
}
