//! Health check endpoint

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

/// GET /health - Check that the local FHIR store answers and return server health status
pub async fn check(State(state): State<AppState>) -> impl IntoResponse {
    let version = state.config.version_string.clone();
    match state.store.metadata().await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                version,
                reason: None,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, store = state.store.base_url(), "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    version,
                    reason: Some(format!("FHIR store unreachable: {}", e)),
                }),
            )
        }
    }
}
