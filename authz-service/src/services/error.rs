use service_core::error::AppError;
use thiserror::Error;

/// Failure kinds of the authorization pipeline and its storage.
#[derive(Error, Debug)]
pub enum AuthzError {
    #[error("Authentication credentials were not provided")]
    MissingCredentials,

    #[error("Authorization header must be of the form 'Bearer <token>'")]
    MalformedHeader,

    #[error("Algorithm {0} is not allowed")]
    AlgorithmNotAllowed(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Unknown client '{0}'")]
    UnknownClient(String),

    #[error("Token signature is invalid")]
    BadSignature,

    #[error("Issuer '{iss}' does not match client '{client_id}'")]
    IssuerMismatch { iss: String, client_id: String },

    #[error("No application is registered for client '{0}'")]
    UnknownApplication(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    ResourceClosed(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),
}

impl AuthzError {
    /// Short label used for metrics and log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthzError::MissingCredentials => "missing_credentials",
            AuthzError::MalformedHeader => "malformed_header",
            AuthzError::AlgorithmNotAllowed(_) => "algorithm_not_allowed",
            AuthzError::MalformedToken(_) => "malformed_token",
            AuthzError::UnknownClient(_) => "unknown_client",
            AuthzError::BadSignature => "bad_signature",
            AuthzError::IssuerMismatch { .. } => "issuer_mismatch",
            AuthzError::UnknownApplication(_) => "unknown_application",
            AuthzError::PermissionDenied(_) => "permission_denied",
            AuthzError::ResourceClosed(_) => "resource_closed",
            AuthzError::NotFound(_) => "not_found",
            AuthzError::Conflict(_) => "conflict",
            AuthzError::Validation(_) => "invalid",
            AuthzError::ServiceUnavailable(_) => "service_unavailable",
            AuthzError::DeadlineExceeded => "deadline_exceeded",
            AuthzError::Storage(_) => "storage",
        }
    }

    pub fn denied(detail: impl Into<String>) -> Self {
        AuthzError::PermissionDenied(detail.into())
    }
}

impl From<sqlx::Error> for AuthzError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => AuthzError::ServiceUnavailable(err.to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AuthzError::Conflict(db_err.message().to_string())
            }
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AuthzError::Validation(db_err.message().to_string())
            }
            other => AuthzError::Storage(anyhow::Error::new(other)),
        }
    }
}

impl From<validator::ValidationErrors> for AuthzError {
    fn from(err: validator::ValidationErrors) -> Self {
        AuthzError::Validation(err.to_string())
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::MissingCredentials => AppError::NotAuthenticated(anyhow::anyhow!(
                "Authentication credentials were not provided"
            )),
            AuthzError::MalformedHeader
            | AuthzError::AlgorithmNotAllowed(_)
            | AuthzError::MalformedToken(_)
            | AuthzError::UnknownClient(_)
            | AuthzError::BadSignature
            | AuthzError::IssuerMismatch { .. } => {
                AppError::AuthenticationFailed(anyhow::anyhow!(err.to_string()))
            }
            AuthzError::UnknownApplication(_) | AuthzError::PermissionDenied(_) => {
                AppError::PermissionDenied(anyhow::anyhow!(err.to_string()))
            }
            AuthzError::ResourceClosed(detail) => AppError::ResourceClosed(anyhow::anyhow!(detail)),
            AuthzError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            AuthzError::Conflict(detail) => AppError::Conflict(anyhow::anyhow!(detail)),
            AuthzError::Validation(detail) => AppError::BadRequest(anyhow::anyhow!(detail)),
            AuthzError::ServiceUnavailable(detail) => {
                AppError::ServiceUnavailable(anyhow::anyhow!(detail))
            }
            AuthzError::DeadlineExceeded => AppError::DeadlineExceeded,
            AuthzError::Storage(e) => AppError::DatabaseError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn missing_header_is_401_and_failed_verification_403() {
        let missing: AppError = AuthzError::MissingCredentials.into();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(missing.code(), "not_authenticated");

        for err in [
            AuthzError::AlgorithmNotAllowed("HS384".into()),
            AuthzError::BadSignature,
            AuthzError::UnknownClient("x".into()),
            AuthzError::IssuerMismatch {
                iss: "a".into(),
                client_id: "b".into(),
            },
        ] {
            let app: AppError = err.into();
            assert_eq!(app.status(), StatusCode::FORBIDDEN);
            assert_eq!(app.code(), "authentication_failed");
        }
    }

    #[test]
    fn closed_keeps_its_own_code() {
        let app: AppError = AuthzError::ResourceClosed("closed".into()).into();
        assert_eq!(app.code(), "resource_closed");
        let app: AppError = AuthzError::UnknownApplication("demo".into()).into();
        assert_eq!(app.code(), "permission_denied");
    }

    #[test]
    fn connection_failures_are_unavailable() {
        assert!(matches!(
            AuthzError::from(sqlx::Error::PoolTimedOut),
            AuthzError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            AuthzError::from(sqlx::Error::PoolClosed),
            AuthzError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            AuthzError::from(sqlx::Error::RowNotFound),
            AuthzError::Storage(_)
        ));
        let app: AppError = AuthzError::DeadlineExceeded.into();
        assert_eq!(app.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
