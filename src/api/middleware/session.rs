use axum::{
    extract::Request,
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use rand::RngCore;
use std::fmt::Write as _;
use tracing::info;

pub const SESSION_COOKIE: &str = "msb_session";

/// Opaque per-browser session identifier, passed explicitly to the core
/// services instead of living in ambient request state.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Get-or-create session boundary: reuses the cookie token when present,
/// otherwise mints a fresh one and sets the cookie on the response. Every
/// handler downstream sees a `SessionId` extension.
pub async fn session_middleware(mut request: Request, next: Next) -> Response {
    let existing = request
        .headers()
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(session_from_cookies);

    let (session_id, is_new) = match existing {
        Some(token) => (token, false),
        None => {
            let token = generate_token();
            info!("New session started: {}", token);
            (token, true)
        }
    };

    request
        .extensions_mut()
        .insert(SessionId(session_id.clone()));

    let mut response = next.run(request).await;

    if is_new {
        let cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}

fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(32), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn session_from_cookies(header_value: &str) -> Option<String> {
    header_value.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}
