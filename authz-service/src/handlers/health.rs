use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::services::Deadline;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: String,
    pub environment: String,
    pub store: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let deadline = Deadline::after(state.config.request_timeout);
    let store = match state.registry.ping(&deadline).await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::error!(error = %e, "Health check failed to reach the store");
            "unavailable"
        }
    };
    let status = if store == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if status == StatusCode::OK { "healthy" } else { "unhealthy" },
            service: state.config.service_name.clone(),
            version: state.config.service_version.clone(),
            environment: state.config.environment.to_string(),
            store,
        }),
    )
}
