use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Confidentiality, ProtectedResource, TypeRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    pub case_id: Uuid,
    pub identification: String,
    pub case_type: TypeRef,
    pub confidentiality: Confidentiality,
    /// Set by a final status, cleared when the case is re-opened.
    pub end_date: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Case {
    pub fn is_closed(&self) -> bool {
        self.end_date.is_some()
    }
}

impl ProtectedResource for Case {
    fn type_ref(&self) -> &TypeRef {
        &self.case_type
    }

    fn confidentiality(&self) -> Option<Confidentiality> {
        Some(self.confidentiality)
    }
}

#[derive(Debug, Clone)]
pub struct NewCase {
    pub identification: String,
    pub case_type: TypeRef,
    pub confidentiality: Confidentiality,
}

/// Mutable case fields; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct CasePatch {
    pub identification: Option<String>,
    pub confidentiality: Option<Confidentiality>,
}

impl CasePatch {
    pub fn apply(&self, case: &mut Case) {
        if let Some(identification) = &self.identification {
            case.identification = identification.clone();
        }
        if let Some(confidentiality) = self.confidentiality {
            case.confidentiality = confidentiality;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CaseStatus {
    pub status_id: Uuid,
    pub case_id: Uuid,
    pub status_type_url: String,
    pub is_final: bool,
    pub set_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCaseStatus {
    pub case_id: Uuid,
    pub status_type_url: String,
    pub is_final: bool,
}
