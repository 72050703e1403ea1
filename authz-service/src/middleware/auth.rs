use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::services::{Deadline, VerifiedIdentity};
use crate::AppState;

/// Verify the bearer token and attach the caller plus the request deadline.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let deadline = Deadline::after(state.config.request_timeout);
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default());

    let identity = state.gate.identify(header, &deadline).await?;

    tracing::Span::current().record("client_id", identity.client_id.as_str());
    req.extensions_mut().insert(identity);
    req.extensions_mut().insert(deadline);
    Ok(next.run(req).await)
}

/// The verified caller of a request that passed [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: VerifiedIdentity,
    pub deadline: Deadline,
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<VerifiedIdentity>()
            .cloned()
            .ok_or_else(|| {
                AppError::NotAuthenticated(anyhow::anyhow!(
                    "Authentication credentials were not provided"
                ))
            })?;
        let deadline = parts.extensions.get::<Deadline>().cloned().unwrap_or_default();
        Ok(Caller { identity, deadline })
    }
}
