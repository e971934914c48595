use crate::api::error::AppError;
use crate::api::middleware::session::SessionId;
use crate::utils::validation::{allowed_file, sanitize_filename};
use axum::{
    Extension, Json,
    extract::{Multipart, State},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use tracing::info;

use super::types::UploadResponse;

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = String, description = "Media file upload", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File staged for splitting", body = UploadResponse),
        (status = 400, description = "Missing file or disallowed extension"),
        (status = 413, description = "File exceeds the configured size ceiling")
    ),
    tag = "pipeline"
)]
pub async fn upload_file(
    State(state): State<crate::AppState>,
    Extension(session): Extension<SessionId>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let result: Result<Json<UploadResponse>, AppError> = async {
        let mut saved: Option<String> = None;

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            let message = e.to_string();
            if message.contains("length limit exceeded") {
                AppError::PayloadTooLarge(
                    "Request body exceeds the maximum allowed limit".to_string(),
                )
            } else {
                AppError::BadRequest(message)
            }
        })? {
            if field.name().unwrap_or_default() != "file" {
                continue;
            }

            let original = field.file_name().unwrap_or_default().to_string();
            if original.is_empty() {
                return Err(AppError::BadRequest("No selected file".to_string()));
            }

            let filename = sanitize_filename(&original)
                .map_err(|e| AppError::BadRequest(e.to_string()))?;

            if !allowed_file(&filename, &state.config.allowed_extensions) {
                return Err(AppError::BadRequest("Invalid file type".to_string()));
            }

            let upload_path = state.config.upload_root.join(&filename);

            // One owner per path: a second session may not stage over a file
            // another session is still working with
            if state.ledger.owned_by_other(&session.0, &upload_path) {
                return Err(AppError::BadRequest(
                    "A file with this name is already being processed".to_string(),
                ));
            }

            let body_with_io_error = field.map_err(std::io::Error::other);
            let mut reader = StreamReader::new(body_with_io_error);

            let mut file = tokio::fs::File::create(&upload_path)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create upload file: {e}")))?;
            let written = tokio::io::copy(&mut reader, &mut file).await.map_err(|e| {
                AppError::Internal(format!("Failed to write upload stream: {e}"))
            })?;
            file.sync_all()
                .await
                .map_err(|e| AppError::Internal(format!("Failed to flush upload: {e}")))?;

            state.ledger.register_upload(&session.0, upload_path.clone());
            info!(
                "Uploaded {} ({} bytes) to {} for session {}",
                filename,
                written,
                upload_path.display(),
                session.0
            );
            saved = Some(filename);
        }

        let filename = saved.ok_or(AppError::BadRequest("No file part in request".to_string()))?;
        Ok(Json(UploadResponse {
            success: true,
            filename,
        }))
    }
    .await;

    match result {
        Ok(response) => Ok(response),
        Err(e) => {
            // Drain what the client is still sending so the rejection arrives
            // as a response instead of a connection reset
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}
