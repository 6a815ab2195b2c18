use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conform_dispatch::{CounterSnapshot, DispatchResult};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Status ────────────────────────────────────────────────────────

pub async fn status(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, CounterSnapshot>> {
    Json(state.dispatcher.status_snapshot())
}

// ── Validate ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ValidateParams {
    /// Counter bucket for this caller. Names not listed in
    /// `dispatch.sources` are counted as `other`.
    pub source: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: message })).into_response()
}

/// Validate one raw event. Runs on the blocking pool since model lookups may
/// block on HTTP.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValidateParams>,
    body: String,
) -> Response {
    let source = params.source.unwrap_or_else(|| "http".to_string());
    let dispatcher = state.dispatcher.clone();

    let outcome = tokio::task::spawn_blocking(move || dispatcher.execute(&body, &source)).await;

    match outcome {
        Ok(DispatchResult {
            results,
            error: Some(e),
        }) if results.is_empty() => error_response(e),
        Ok(DispatchResult { results, .. }) => Json(results).into_response(),
        Err(e) => {
            error!(error = %e, "validation task failed");
            error_response(format!("validation task failed: {e}"))
        }
    }
}
