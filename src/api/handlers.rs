//! HTTP API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Extension, Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::auth::{Gate, Identity, TokenValidator, UserInfoValidator};
use crate::config::Config;
use crate::error::{ApiError, AppError};
use crate::runner::{self, Action, CommandRunner};
use crate::stream::{AutoFlushWriter, ChunkSink};

/// Flushed chunks allowed to queue for a slow client.
const CHUNK_BACKLOG: usize = 32;

static SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+$").expect("segment pattern is valid")
});

/// Application state shared with handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Read-only configuration.
    pub config: Arc<Config>,
    /// Authentication gate.
    pub gate: Gate,
    /// Command runner for streamed endpoints.
    pub runner: Arc<CommandRunner>,
}

impl AppState {
    /// Create app state with an explicit validator.
    pub fn new(config: Config, validator: Arc<dyn TokenValidator>) -> Self {
        let gate = Gate::new(validator, config.auth_cookie.as_str());
        let runner = Arc::new(CommandRunner::new(&config));
        Self {
            config: Arc::new(config),
            gate,
            runner,
        }
    }

    /// Create app state validating tokens against the configured user-info
    /// endpoint.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let validator = UserInfoValidator::new(&config)?;
        Ok(Self::new(config, Arc::new(validator)))
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Current user handler - always returns 200.
///
/// Answers `null` instead of 401 when the request is not authenticated.
pub async fn current_user(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    Json(state.gate.admit(&headers).await.identity())
}

/// Status handler - streams the status command for one or all projects.
pub async fn status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    project: Option<Path<String>>,
) -> Result<Response, ApiError> {
    let project = project.map(|Path(p)| p);
    debug!(user = identity.display_name().unwrap_or("-"), ?project, "status requested");
    stream_action(&state, Action::Status, project, None).await
}

/// Containers handler - streams the container listing for one or all
/// projects.
pub async fn containers(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    project: Option<Path<String>>,
) -> Result<Response, ApiError> {
    let project = project.map(|Path(p)| p);
    debug!(user = identity.display_name().unwrap_or("-"), ?project, "containers requested");
    stream_action(&state, Action::Containers, project, None).await
}

/// Deploy handler - streams deployment output as it is produced.
pub async fn deploy(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((project, environment)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    info!(
        user = identity.display_name().unwrap_or("-"),
        %project,
        %environment,
        "deploy requested"
    );
    stream_action(&state, Action::Deploy, Some(project), Some(environment)).await
}

fn checked_segment(field: &'static str, value: Option<String>) -> Result<String, ApiError> {
    match value {
        None => Ok(String::new()),
        Some(value) if SEGMENT.is_match(&value) => Ok(value),
        Some(value) => Err(ApiError::InvalidSegment { field, value }),
    }
}

/// Start `action` and answer with a body fed by an auto-flushing writer.
///
/// The writer is handed to a task that closes it once the command exits.
async fn stream_action(
    state: &AppState,
    action: Action,
    project: Option<String>,
    environment: Option<String>,
) -> Result<Response, ApiError> {
    let project = checked_segment("project", project)?;
    let environment = checked_segment("environment", environment)?;

    let (sink, body) = ChunkSink::channel(CHUNK_BACKLOG);
    let sink = sink.with_send_timeout(state.config.client_stall_timeout());
    let writer = AutoFlushWriter::spawn(sink, state.config.flush_period())?;

    let child = match state.runner.spawn(action, &project, &environment) {
        Ok(child) => child,
        Err(e) => {
            writer.close().await;
            return Err(ApiError::Spawn(e));
        }
    };

    tokio::spawn(runner::stream_output(action, child, writer));

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        body,
    )
        .into_response())
}
