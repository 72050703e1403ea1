use jsonwebtoken::{
    decode, decode_header, errors::ErrorKind, Algorithm, DecodingKey, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{metrics, AuthzError, CredentialStore, Deadline};

/// Payload every client token carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer, must equal `client_id`
    pub iss: String,
    /// Issued at, Unix seconds. Any JSON number is accepted, fractions
    /// included; the value is not bounded.
    pub iat: f64,
    pub client_id: String,
    pub user_id: String,
    pub user_representation: String,
}

/// Caller identity established from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub client_id: String,
    pub user_id: String,
    pub user_representation: String,
}

/// Verifies HS256 client tokens against the credential store.
#[derive(Clone)]
pub struct TokenVerifier {
    credentials: Arc<dyn CredentialStore>,
}

impl TokenVerifier {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }

    /// Extract the token from an `Authorization` header value.
    pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthzError> {
        let header = header.ok_or(AuthzError::MissingCredentials)?;
        let (scheme, token) = header
            .trim()
            .split_once(' ')
            .ok_or(AuthzError::MalformedHeader)?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return Err(AuthzError::MalformedHeader);
        }
        Ok(token)
    }

    pub async fn verify_header(
        &self,
        header: Option<&str>,
        deadline: &Deadline,
    ) -> Result<VerifiedIdentity, AuthzError> {
        let token = Self::bearer_token(header)?;
        self.verify(token, deadline).await
    }

    pub async fn verify(
        &self,
        token: &str,
        deadline: &Deadline,
    ) -> Result<VerifiedIdentity, AuthzError> {
        let result = self.verify_token(token, deadline).await;
        metrics::record_token_verification(result.as_ref().map(|_| ()));
        match &result {
            Ok(identity) => debug!(client_id = %identity.client_id, "Token verified"),
            Err(e) => warn!(reason = e.reason(), error = %e, "Token verification failed"),
        }
        result
    }

    async fn verify_token(
        &self,
        token: &str,
        deadline: &Deadline,
    ) -> Result<VerifiedIdentity, AuthzError> {
        let header =
            decode_header(token).map_err(|e| AuthzError::MalformedToken(e.to_string()))?;
        if header.alg != Algorithm::HS256 {
            return Err(AuthzError::AlgorithmNotAllowed(format!("{:?}", header.alg)));
        }

        // Read the claims before the signature can be checked; the secret
        // depends on the client_id inside them.
        let mut unverified = Self::validation();
        unverified.insecure_disable_signature_validation();
        let claims = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &unverified)
            .map_err(|e| AuthzError::MalformedToken(e.to_string()))?
            .claims;

        let secret = deadline
            .run(self.credentials.lookup(&claims.client_id))
            .await?
            .ok_or_else(|| AuthzError::UnknownClient(claims.client_id.clone()))?;

        let claims = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Self::validation(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AuthzError::BadSignature,
            _ => AuthzError::MalformedToken(e.to_string()),
        })?
        .claims;

        if claims.iss != claims.client_id {
            return Err(AuthzError::IssuerMismatch {
                iss: claims.iss,
                client_id: claims.client_id,
            });
        }

        Ok(VerifiedIdentity {
            client_id: claims.client_id,
            user_id: claims.user_id,
            user_representation: claims.user_representation,
        })
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation
    }
}
