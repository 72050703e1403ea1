use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::{Component, Confidentiality};
use crate::scopes::Scope;

/// A grant of scopes over one resource-type of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub authorization_id: Uuid,
    pub application_id: Uuid,
    pub component: Component,
    pub scopes: BTreeSet<String>,
    /// Empty for components without type scoping.
    pub type_url: String,
    pub max_confidentiality: Option<Confidentiality>,
}

impl Authorization {
    pub fn grants(&self, required: &Scope) -> bool {
        required.is_contained_in(&self.scopes)
    }
}

/// Wildcard rule producing an authorization row for every local
/// resource-type of the component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationSpec {
    pub application_id: Uuid,
    pub component: Component,
    pub scopes: BTreeSet<String>,
    pub max_confidentiality: Option<Confidentiality>,
}

impl AuthorizationSpec {
    /// Row this spec implies for the given type URL.
    pub fn row_for(&self, type_url: String) -> Authorization {
        Authorization {
            authorization_id: Uuid::new_v4(),
            application_id: self.application_id,
            component: self.component,
            scopes: self.scopes.clone(),
            type_url,
            max_confidentiality: self.max_confidentiality,
        }
    }

    /// Whether an existing row already carries what this spec grants.
    pub fn agrees_with(&self, row: &Authorization) -> bool {
        row.scopes == self.scopes && row.max_confidentiality == self.max_confidentiality
    }
}

/// Grant over every resource-type of a component within one catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueAuthorization {
    pub application_id: Uuid,
    pub component: Component,
    pub catalogue_id: Uuid,
    pub scopes: BTreeSet<String>,
    pub max_confidentiality: Option<Confidentiality>,
}

impl CatalogueAuthorization {
    pub fn row_for(&self, type_url: String) -> Authorization {
        Authorization {
            authorization_id: Uuid::new_v4(),
            application_id: self.application_id,
            component: self.component,
            scopes: self.scopes.clone(),
            type_url,
            max_confidentiality: self.max_confidentiality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> AuthorizationSpec {
        AuthorizationSpec {
            application_id: Uuid::new_v4(),
            component: Component::Cases,
            scopes: ["cases.read".to_string()].into_iter().collect(),
            max_confidentiality: Some(Confidentiality::Internal),
        }
    }

    #[test]
    fn spec_rows_copy_scopes_and_ceiling() {
        let spec = spec();
        let row = spec.row_for("https://local/case-types/1".into());
        assert_eq!(row.application_id, spec.application_id);
        assert_eq!(row.type_url, "https://local/case-types/1");
        assert!(spec.agrees_with(&row));
    }

    #[test]
    fn spec_disagrees_on_ceiling_change() {
        let spec = spec();
        let mut row = spec.row_for("https://local/case-types/1".into());
        row.max_confidentiality = Some(Confidentiality::Secret);
        assert!(!spec.agrees_with(&row));
    }
}
