//! axum middleware placing the [`Gate`](super::Gate) in front of routes.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use super::gate::GateDecision;
use crate::api::AppState;
use crate::error::GateRejection;

/// Admit the request or answer it directly.
///
/// Admitted requests carry their [`Identity`](super::Identity) as a request
/// extension.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.gate.admit(request.headers()).await {
        GateDecision::Admit(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        GateDecision::Reject(reason) => {
            reject_response(reason, request.headers(), state.config.login_url.as_deref())
        }
    }
}

/// Browsers are redirected to the login page when one is configured and
/// logging in can help; everything else gets a JSON error.
pub fn reject_response(
    reason: GateRejection,
    headers: &HeaderMap,
    login_url: Option<&str>,
) -> Response {
    match login_url {
        Some(url) if reason.is_recoverable_by_login() && accepts_html(headers) => {
            Redirect::to(url).into_response()
        }
        _ => reason.into_response(),
    }
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}
