use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Confidentiality ladder attached to cases and documents.
///
/// Levels are compared through [`Confidentiality::order`], never through
/// their string encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
pub enum Confidentiality {
    #[serde(rename = "openbaar")]
    #[sqlx(rename = "openbaar")]
    Public,
    #[serde(rename = "beperkt_openbaar")]
    #[sqlx(rename = "beperkt_openbaar")]
    LimitedPublic,
    #[serde(rename = "intern")]
    #[sqlx(rename = "intern")]
    Internal,
    #[serde(rename = "zaakvertrouwelijk")]
    #[sqlx(rename = "zaakvertrouwelijk")]
    CaseConfidential,
    #[serde(rename = "vertrouwelijk")]
    #[sqlx(rename = "vertrouwelijk")]
    Confidential,
    #[serde(rename = "confidentieel")]
    #[sqlx(rename = "confidentieel")]
    HighlyConfidential,
    #[serde(rename = "geheim")]
    #[sqlx(rename = "geheim")]
    Secret,
    #[serde(rename = "zeer_geheim")]
    #[sqlx(rename = "zeer_geheim")]
    TopSecret,
}

impl Confidentiality {
    /// All levels, least restrictive first.
    pub const LADDER: [Confidentiality; 8] = [
        Confidentiality::Public,
        Confidentiality::LimitedPublic,
        Confidentiality::Internal,
        Confidentiality::CaseConfidential,
        Confidentiality::Confidential,
        Confidentiality::HighlyConfidential,
        Confidentiality::Secret,
        Confidentiality::TopSecret,
    ];

    pub fn order(&self) -> i32 {
        match self {
            Confidentiality::Public => 0,
            Confidentiality::LimitedPublic => 1,
            Confidentiality::Internal => 2,
            Confidentiality::CaseConfidential => 3,
            Confidentiality::Confidential => 4,
            Confidentiality::HighlyConfidential => 5,
            Confidentiality::Secret => 6,
            Confidentiality::TopSecret => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidentiality::Public => "openbaar",
            Confidentiality::LimitedPublic => "beperkt_openbaar",
            Confidentiality::Internal => "intern",
            Confidentiality::CaseConfidential => "zaakvertrouwelijk",
            Confidentiality::Confidential => "vertrouwelijk",
            Confidentiality::HighlyConfidential => "confidentieel",
            Confidentiality::Secret => "geheim",
            Confidentiality::TopSecret => "zeer_geheim",
        }
    }

    /// `true` when a resource at `self` may be seen under `ceiling`.
    pub fn within(&self, ceiling: Confidentiality) -> bool {
        self.order() <= ceiling.order()
    }
}

impl PartialOrd for Confidentiality {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Confidentiality {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order().cmp(&other.order())
    }
}

impl fmt::Display for Confidentiality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidentiality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Confidentiality::LADDER
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| format!("Invalid confidentiality: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_follows_ladder_position() {
        for (position, level) in Confidentiality::LADDER.iter().enumerate() {
            assert_eq!(level.order(), position as i32);
        }
    }

    #[test]
    fn ordering_is_not_lexicographic() {
        // "geheim" < "openbaar" as strings, but secret outranks public
        assert!(Confidentiality::Secret > Confidentiality::Public);
        assert!(Confidentiality::Public.within(Confidentiality::Secret));
        assert!(!Confidentiality::TopSecret.within(Confidentiality::HighlyConfidential));
        assert!(Confidentiality::HighlyConfidential.within(Confidentiality::HighlyConfidential));
    }

    #[test]
    fn parses_wire_strings() {
        assert_eq!(
            "beperkt_openbaar".parse::<Confidentiality>(),
            Ok(Confidentiality::LimitedPublic)
        );
        assert!("PUBLIC".parse::<Confidentiality>().is_err());
        assert_eq!(
            serde_json::to_string(&Confidentiality::TopSecret).unwrap(),
            "\"zeer_geheim\""
        );
    }
}
