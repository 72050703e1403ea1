use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level API area an authorization applies to.
///
/// The stored (and serialized) value is the short component code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "varchar")]
pub enum Component {
    #[serde(rename = "zrc")]
    #[sqlx(rename = "zrc")]
    Cases,
    #[serde(rename = "drc")]
    #[sqlx(rename = "drc")]
    Documents,
    #[serde(rename = "brc")]
    #[sqlx(rename = "brc")]
    Decisions,
    #[serde(rename = "ztc")]
    #[sqlx(rename = "ztc")]
    Catalogues,
    #[serde(rename = "ac")]
    #[sqlx(rename = "ac")]
    Meta,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::Cases,
        Component::Documents,
        Component::Decisions,
        Component::Catalogues,
        Component::Meta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Cases => "zrc",
            Component::Documents => "drc",
            Component::Decisions => "brc",
            Component::Catalogues => "ztc",
            Component::Meta => "ac",
        }
    }

    /// Whether resources of this component carry a confidentiality level
    /// that is compared against the authorization ceiling.
    pub fn uses_confidentiality(&self) -> bool {
        matches!(self, Component::Cases | Component::Documents)
    }

    /// Whether authorizations of this component are bound to a resource-type.
    pub fn uses_type_scoping(&self) -> bool {
        self.type_collection().is_some()
    }

    /// Path segment of the catalogue collection holding this component's
    /// resource-types.
    pub fn type_collection(&self) -> Option<&'static str> {
        match self {
            Component::Cases => Some("case-types"),
            Component::Documents => Some("document-types"),
            Component::Decisions => Some("decision-types"),
            Component::Catalogues | Component::Meta => None,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zrc" => Ok(Component::Cases),
            "drc" => Ok(Component::Documents),
            "brc" => Ok(Component::Decisions),
            "ztc" => Ok(Component::Catalogues),
            "ac" => Ok(Component::Meta),
            other => Err(format!("Invalid component: {}", other)),
        }
    }
}
