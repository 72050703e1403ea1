use async_trait::async_trait;

use super::AuthzError;

/// Read-only `client_id -> secret` lookup used to verify token signatures.
///
/// A missing client is `Ok(None)`; the verifier decides what that means.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup(&self, client_id: &str) -> Result<Option<String>, AuthzError>;
}
