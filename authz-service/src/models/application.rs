use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Shared secret a client signs its tokens with.
#[derive(Clone, Deserialize, FromRow)]
pub struct Credential {
    pub client_id: String,
    pub secret: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Consumer identity; either unrestricted or bound to authorization rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub application_id: Uuid,
    pub client_ids: Vec<String>,
    pub label: String,
    pub unrestricted: bool,
    pub created_utc: DateTime<Utc>,
}

impl Application {
    pub fn has_client(&self, client_id: &str) -> bool {
        self.client_ids.iter().any(|c| c == client_id)
    }
}
