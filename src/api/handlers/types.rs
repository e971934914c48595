use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ProcessRequest {
    pub filename: String,
}

#[derive(Serialize, ToSchema)]
pub struct ProcessResponse {
    pub success: bool,
    pub filename: String,
    pub split_files: Vec<String>,
    pub output_folder: String,
    pub folder_name: String,
}

#[derive(Serialize, ToSchema)]
pub struct SplitProgressResponse {
    pub progress: f64,
}

#[derive(Deserialize, ToSchema)]
pub struct TransferRequest {
    pub filename: String,
    pub folder_name: String,
}

#[derive(Serialize, ToSchema)]
pub struct TransferStartResponse {
    pub success: bool,
    pub task_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct SimpleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SimpleResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }
}
