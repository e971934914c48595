use crate::api::middleware::session::SessionId;
use axum::{Extension, Json, extract::State, response::Html};

use super::types::SimpleResponse;

#[utoipa::path(
    post,
    path = "/cleanup",
    responses(
        (status = 200, description = "Session artifacts removed", body = SimpleResponse)
    ),
    tag = "session"
)]
pub async fn cleanup_session(
    State(state): State<crate::AppState>,
    Extension(session): Extension<SessionId>,
) -> Json<SimpleResponse> {
    state.reaper.reap_session(&session.0).await;
    Json(SimpleResponse::with_message("Session files cleaned"))
}

/// Landing route. A fresh page load means the client abandoned whatever the
/// session was holding, so it is reaped here before anything else. The web
/// UI itself is served separately.
pub async fn index(
    State(state): State<crate::AppState>,
    Extension(session): Extension<SessionId>,
) -> Html<&'static str> {
    state.reaper.reap_session(&session.0).await;
    Html(
        "<!doctype html><title>media-split-backend</title>\
         <p>media-split-backend is running. API docs at <a href=\"/swagger-ui\">/swagger-ui</a>.</p>",
    )
}
