use crate::models::ApiError;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode, header::HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::{convert::Infallible, env, sync::Arc};
use tracing::{info, warn};

pub const SESSION_COOKIE: &str = "dn_sess";
const SESSION_VALUE: &str = "ok";

#[derive(Clone)]
pub struct SessionState {
    credentials: Option<Arc<DemoCredentials>>,
    required: bool,
}

struct DemoCredentials {
    username: String,
    password: String,
}

impl SessionState {
    pub fn from_env() -> Self {
        let username = env::var("DEMO_USERNAME").ok().filter(|v| !v.is_empty());
        let password = env::var("DEMO_PASSWORD").ok().filter(|v| !v.is_empty());
        let credentials = match (username, password) {
            (Some(username), Some(password)) => Some((username, password)),
            (Some(_), None) | (None, Some(_)) => {
                warn!(
                    target = "valuation.api",
                    "DEMO_USERNAME and DEMO_PASSWORD must both be set; login disabled"
                );
                None
            }
            (None, None) => None,
        };
        let required = env::var("SESSION_REQUIRED")
            .ok()
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(credentials.is_some());
        info!(
            target = "valuation.api",
            login_enabled = credentials.is_some(),
            session_required = required,
            "session settings loaded"
        );
        Self::new(credentials, required)
    }

    pub fn new(credentials: Option<(String, String)>, required: bool) -> Self {
        Self {
            credentials: credentials
                .map(|(username, password)| Arc::new(DemoCredentials { username, password })),
            required,
        }
    }

    fn check(&self, username: &str, password: &str) -> bool {
        self.credentials
            .as_ref()
            .is_some_and(|c| c.username == username && c.password == password)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    u: String,
    #[serde(default)]
    p: String,
}

/// Exchange demo credentials for a session cookie.
///
/// - Method: `POST`
/// - Path: `/api/session`
/// - Body: `{"u": "...", "p": "..."}`
pub async fn login(State(state): State<SessionState>, Json(req): Json<LoginRequest>) -> Response {
    if !state.check(&req.u, &req.p) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"ok": false}))).into_response();
    }
    let mut response = Json(json!({"ok": true})).into_response();
    let cookie = format!("{SESSION_COOKIE}={SESSION_VALUE}; HttpOnly; Secure; SameSite=Lax; Path=/");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(http::header::SET_COOKIE, value);
    }
    response
}

pub async fn require_session(
    State(state): State<SessionState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    if !state.required || has_session(request.headers()) {
        return Ok(next.run(request).await);
    }
    let payload = ApiError {
        error: "unauthorized".to_string(),
        detail: Some("sign in via /api/session first".to_string()),
    };
    Ok((StatusCode::UNAUTHORIZED, Json(payload)).into_response())
}

fn has_session(headers: &http::HeaderMap) -> bool {
    headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| name == SESSION_COOKIE && value == SESSION_VALUE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::COOKIE,
            HeaderValue::from_static("theme=dark; dn_sess=ok; lang=en"),
        );
        assert!(has_session(&headers));
    }

    #[test]
    fn wrong_or_missing_cookie_is_rejected() {
        let mut headers = http::HeaderMap::new();
        assert!(!has_session(&headers));
        headers.insert(http::header::COOKIE, HeaderValue::from_static("dn_sess=nope"));
        assert!(!has_session(&headers));
    }

    #[test]
    fn unconfigured_login_never_succeeds() {
        let state = SessionState::new(None, false);
        assert!(!state.check("", ""));
        let state = SessionState::new(Some(("demo".into(), "pw".into())), true);
        assert!(state.check("demo", "pw"));
        assert!(!state.check("demo", "PW"));
    }
}
