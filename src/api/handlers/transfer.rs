use crate::api::error::AppError;
use crate::services::progress::TransferStatus;
use crate::utils::validation::validate_folder_name;
use axum::{
    Form, Json,
    extract::{Path as AxumPath, State},
};
use tracing::info;
use uuid::Uuid;

use super::types::{SimpleResponse, TransferRequest, TransferStartResponse};

#[utoipa::path(
    post,
    path = "/transfer",
    request_body(content = TransferRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Background transfer started", body = TransferStartResponse),
        (status = 404, description = "Split folder not found")
    ),
    tag = "transfer"
)]
pub async fn start_transfer(
    State(state): State<crate::AppState>,
    Form(request): Form<TransferRequest>,
) -> Result<Json<TransferStartResponse>, AppError> {
    validate_folder_name(&request.folder_name)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let folder = state.config.split_root.join(&request.folder_name);
    if !tokio::fs::try_exists(&folder).await.unwrap_or(false) {
        return Err(AppError::NotFound("Folder not found".to_string()));
    }

    let task_id = state.transfers.begin(folder, request.filename);
    info!("Started transfer task {task_id} for folder {}", request.folder_name);

    Ok(Json(TransferStartResponse {
        success: true,
        task_id,
    }))
}

#[utoipa::path(
    get,
    path = "/transfer/{task_id}",
    params(
        ("task_id" = Uuid, Path, description = "Transfer task id")
    ),
    responses(
        (status = 200, description = "Current task status", body = TransferStatus),
        (status = 404, description = "Unknown task id")
    ),
    tag = "transfer"
)]
pub async fn transfer_status(
    State(state): State<crate::AppState>,
    AxumPath(task_id): AxumPath<Uuid>,
) -> Result<Json<TransferStatus>, AppError> {
    state
        .transfers
        .status(task_id)
        .map(Json)
        .ok_or(AppError::NotFound("Transfer task not found".to_string()))
}

#[utoipa::path(
    post,
    path = "/transfer/{task_id}/cancel",
    params(
        ("task_id" = Uuid, Path, description = "Transfer task id")
    ),
    responses(
        (status = 200, description = "Cancellation requested", body = SimpleResponse),
        (status = 404, description = "Unknown task id"),
        (status = 400, description = "Task already finished")
    ),
    tag = "transfer"
)]
pub async fn cancel_transfer(
    State(state): State<crate::AppState>,
    AxumPath(task_id): AxumPath<Uuid>,
) -> Result<Json<SimpleResponse>, AppError> {
    if state.transfers.status(task_id).is_none() {
        return Err(AppError::NotFound("Transfer task not found".to_string()));
    }
    if !state.transfers.cancel(task_id) {
        return Err(AppError::BadRequest(
            "Transfer task already finished".to_string(),
        ));
    }
    Ok(Json(SimpleResponse::ok()))
}
