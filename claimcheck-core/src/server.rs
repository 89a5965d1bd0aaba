//! HTTP façade over the analysis pipeline.
//!
//! - `GET /?text=...` runs one analysis and returns the [`AnalysisResponse`]
//! - `GET /health` answers `{"status":"ok"}`

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::error::Error;
use crate::pipeline::{AnalysisResponse, Pipeline};

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub text: Option<String>,
}

/// Build the application router.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/", get(analyze))
        .route("/health", get(health))
        .with_state(AppState { pipeline })
}

async fn analyze(
    State(state): State<AppState>,
    params: Result<Query<AnalyzeParams>, QueryRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Query(params) =
        params.map_err(|rejection| Error::InvalidInput(rejection.body_text()))?;
    let text = params
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::InvalidInput("query parameter 'text' is required".to_string()))?;

    let response = state.pipeline.analyze(&text).await?;
    Ok(Json(response))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// An [`Error`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            e if e.is_upstream() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "analysis failed");
        } else {
            warn!(kind = self.0.kind(), error = %self.0, "request rejected");
        }
        let body = json!({ "error": self.0.to_string(), "kind": self.0.kind() });
        (status, Json(body)).into_response()
    }
}
