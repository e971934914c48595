pub mod api;
pub mod config;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::ledger::ArtifactLedger;
use crate::services::progress::ProgressRegistry;
use crate::services::reaper::SessionReaper;
use crate::services::splitter::Splitter;
use crate::services::transfer::{TransferManager, create_transfer_client};
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_file,
        api::handlers::process::process_file,
        api::handlers::process::split_progress,
        api::handlers::transfer::start_transfer,
        api::handlers::transfer::transfer_status,
        api::handlers::transfer::cancel_transfer,
        api::handlers::download::download_zip,
        api::handlers::download::download_separate,
        api::handlers::cleanup::cleanup_session,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::types::UploadResponse,
            api::handlers::types::ProcessRequest,
            api::handlers::types::ProcessResponse,
            api::handlers::types::SplitProgressResponse,
            api::handlers::types::TransferRequest,
            api::handlers::types::TransferStartResponse,
            api::handlers::types::SimpleResponse,
            api::handlers::health::HealthResponse,
            services::progress::TransferStatus,
        )
    ),
    tags(
        (name = "pipeline", description = "Upload and split endpoints"),
        (name = "transfer", description = "Background transfer endpoints"),
        (name = "download", description = "Part download endpoints"),
        (name = "session", description = "Session lifecycle endpoints"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub ledger: Arc<ArtifactLedger>,
    pub progress: Arc<ProgressRegistry>,
    pub splitter: Splitter,
    pub transfers: Arc<TransferManager>,
    pub reaper: Arc<SessionReaper>,
}

impl AppState {
    /// Wires the service graph from configuration.
    pub fn from_config(config: AppConfig) -> Self {
        let ledger = Arc::new(ArtifactLedger::new());
        let progress = Arc::new(ProgressRegistry::new());
        let splitter = Splitter::new(config.ffmpeg_bin.clone(), config.ffprobe_bin.clone());
        let client = create_transfer_client(&config);
        let transfers = Arc::new(TransferManager::new(client, progress.clone()));
        let reaper = Arc::new(SessionReaper::new(
            ledger.clone(),
            config.upload_root.clone(),
            config.split_root.clone(),
        ));

        Self {
            config,
            ledger,
            progress,
            splitter,
            transfers,
            reaper,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::handlers::index))
        .route("/health", get(api::handlers::health_check))
        .route(
            "/upload",
            post(api::handlers::upload_file).layer(axum::extract::DefaultBodyLimit::max(
                state.config.max_upload_size + 10 * 1024 * 1024, // multipart overhead buffer
            )),
        )
        .route("/process", post(api::handlers::process_file))
        .route("/progress/:filename", get(api::handlers::split_progress))
        .route("/transfer", post(api::handlers::start_transfer))
        .route("/transfer/:task_id", get(api::handlers::transfer_status))
        .route(
            "/transfer/:task_id/cancel",
            post(api::handlers::cancel_transfer),
        )
        .route("/download/zip/:folder_name", get(api::handlers::download_zip))
        .route(
            "/download/separate/:folder_name/:filename",
            get(api::handlers::download_separate),
        )
        .route("/cleanup", post(api::handlers::cleanup_session))
        .layer(from_fn(api::middleware::session::session_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
