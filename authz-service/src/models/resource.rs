use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::{Component, Confidentiality};

/// Reference from a protected resource to the type classifying it.
///
/// Exactly one of the two storage columns is populated, mirrored here as a
/// tagged variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Local(Uuid),
    External(String),
}

impl TypeRef {
    /// Rebuild the reference from its two storage columns. `None` when the
    /// row violates the exactly-one rule.
    pub fn from_columns(local: Option<Uuid>, external: Option<String>) -> Option<Self> {
        match (local, external) {
            (Some(id), None) => Some(TypeRef::Local(id)),
            (None, Some(url)) => Some(TypeRef::External(url)),
            _ => None,
        }
    }

    pub fn local_id(&self) -> Option<Uuid> {
        match self {
            TypeRef::Local(id) => Some(*id),
            TypeRef::External(_) => None,
        }
    }

    pub fn external_url(&self) -> Option<&str> {
        match self {
            TypeRef::Local(_) => None,
            TypeRef::External(url) => Some(url),
        }
    }
}

/// Anything whose visibility depends on authorization rows.
pub trait ProtectedResource {
    fn type_ref(&self) -> &TypeRef;

    /// `None` for components without confidentiality.
    fn confidentiality(&self) -> Option<Confidentiality>;
}

/// Column names a protected table exposes to the query authorizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceColumns {
    pub local_type: &'static str,
    pub external_type: &'static str,
    pub confidentiality: Option<&'static str>,
}

pub const CASE_COLUMNS: ResourceColumns = ResourceColumns {
    local_type: "case_type_id",
    external_type: "case_type_url",
    confidentiality: Some("confidentiality"),
};

/// A resource-type held in the local catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ResourceType {
    pub type_id: Uuid,
    pub component: Component,
    pub catalogue_id: Option<Uuid>,
    pub identification: String,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewResourceType {
    pub component: Component,
    pub catalogue_id: Option<Uuid>,
    #[validate(length(min = 1, max = 80))]
    pub identification: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_ref_requires_exactly_one_column() {
        let id = Uuid::new_v4();
        assert_eq!(TypeRef::from_columns(Some(id), None), Some(TypeRef::Local(id)));
        assert_eq!(
            TypeRef::from_columns(None, Some("https://ext/types/1".into())),
            Some(TypeRef::External("https://ext/types/1".into()))
        );
        assert_eq!(TypeRef::from_columns(None, None), None);
        assert_eq!(
            TypeRef::from_columns(Some(id), Some("https://ext/types/1".into())),
            None
        );
    }
}
