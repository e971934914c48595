use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub upload_root: String,
    pub split_root: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<crate::AppState>) -> impl IntoResponse {
    let upload_root = if tokio::fs::try_exists(&state.config.upload_root)
        .await
        .unwrap_or(false)
    {
        "writable"
    } else {
        "missing"
    };
    let split_root = if tokio::fs::try_exists(&state.config.split_root)
        .await
        .unwrap_or(false)
    {
        "writable"
    } else {
        "missing"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        upload_root: upload_root.to_string(),
        split_root: split_root.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
