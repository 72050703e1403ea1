use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not authenticated: {0}")]
    NotAuthenticated(anyhow::Error),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(anyhow::Error),

    #[error("Permission denied: {0}")]
    PermissionDenied(anyhow::Error),

    #[error("Resource closed: {0}")]
    ResourceClosed(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(anyhow::Error),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

/// JSON problem document returned for every error.
#[derive(Debug, Serialize)]
pub struct ProblemDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: &'static str,
    pub title: &'static str,
    pub status: u16,
    pub detail: String,
    pub instance: String,
}

impl AppError {
    /// Machine readable error code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) => "invalid",
            AppError::NotAuthenticated(_) => "not_authenticated",
            AppError::AuthenticationFailed(_) => "authentication_failed",
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::ResourceClosed(_) => "resource_closed",
            AppError::NotFound(_) => "not_found",
            AppError::MethodNotAllowed => "method_not_allowed",
            AppError::Conflict(_) => "conflict",
            AppError::ServiceUnavailable(_) => "service_unavailable",
            AppError::DeadlineExceeded => "deadline_exceeded",
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                "error"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotAuthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::AuthenticationFailed(_)
            | AppError::PermissionDenied(_)
            | AppError::ResourceClosed(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) | AppError::DeadlineExceeded => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn title(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) => "Invalid input",
            AppError::NotAuthenticated(_) => "Authentication credentials were not provided",
            AppError::AuthenticationFailed(_) => "Incorrect authentication credentials",
            AppError::PermissionDenied(_) => "You do not have permission to perform this action",
            AppError::ResourceClosed(_) => "The resource is closed",
            AppError::NotFound(_) => "Not found",
            AppError::MethodNotAllowed => "Method not allowed",
            AppError::Conflict(_) => "Conflict",
            AppError::ServiceUnavailable(_) => "Service unavailable",
            AppError::DeadlineExceeded => "Deadline exceeded",
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                "Internal server error"
            }
        }
    }

    fn detail(&self) -> String {
        match self {
            AppError::ValidationError(err) => err.to_string(),
            AppError::BadRequest(err)
            | AppError::NotAuthenticated(err)
            | AppError::AuthenticationFailed(err)
            | AppError::PermissionDenied(err)
            | AppError::ResourceClosed(err)
            | AppError::NotFound(err)
            | AppError::Conflict(err)
            | AppError::ServiceUnavailable(err) => err.to_string(),
            AppError::MethodNotAllowed => "Method not allowed".to_string(),
            AppError::DeadlineExceeded => "The request did not complete in time".to_string(),
            // internal failures never leak their cause to the caller
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                "An unexpected error occurred".to_string()
            }
        }
    }

    pub fn to_problem(&self) -> ProblemDocument {
        let code = self.code();
        ProblemDocument {
            kind: format!("/ref/errors/{}/", code),
            code,
            title: self.title(),
            status: self.status().as_u16(),
            detail: self.detail(),
            instance: format!("urn:uuid:{}", Uuid::new_v4()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        }

        let mut res = (status, Json(self.to_problem())).into_response();
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PROBLEM_CONTENT_TYPE),
        );
        res
    }
}
