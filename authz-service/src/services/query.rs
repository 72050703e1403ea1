//! Query authorizer: turns the caller's authorization rows into a predicate
//! over a protected table.
//!
//! The same [`QueryFilter`] renders to SQL (pushed into the list query) and
//! evaluates in memory (detail and object checks), so list and detail can
//! never disagree about visibility.

use sqlx::{Postgres, QueryBuilder};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;
use uuid::Uuid;

use super::references::{ReferenceResolver, ResolvedReference};
use super::AuthContext;
use crate::models::{Confidentiality, ProtectedResource, ResourceColumns, TypeRef};
use crate::scopes::Scope;

/// Visibility rule for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    /// Every row is visible.
    Unrestricted,
    /// No row is visible.
    Nothing,
    Restricted(AuthorizationFilter),
}

/// Allowed resource-types with the highest ceiling granted for each.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationFilter {
    local: BTreeMap<Uuid, Option<Confidentiality>>,
    external: BTreeMap<String, Option<Confidentiality>>,
    uses_confidentiality: bool,
    columns: ResourceColumns,
    join_prefix: Option<String>,
}

pub struct QueryAuthorizer<'a> {
    references: &'a ReferenceResolver,
}

impl<'a> QueryAuthorizer<'a> {
    pub fn new(references: &'a ReferenceResolver) -> Self {
        Self { references }
    }

    pub fn build(&self, ctx: &AuthContext, required: &Scope, columns: ResourceColumns) -> QueryFilter {
        if ctx.unrestricted {
            return QueryFilter::Unrestricted;
        }
        let granting: Vec<_> = ctx.rows.iter().filter(|row| row.grants(required)).collect();
        if granting.is_empty() {
            return QueryFilter::Nothing;
        }
        if !ctx.component.uses_type_scoping() {
            return QueryFilter::Unrestricted;
        }

        let uses_confidentiality = ctx.component.uses_confidentiality();
        let mut local = BTreeMap::new();
        let mut external = BTreeMap::new();
        for row in granting {
            if uses_confidentiality && row.max_confidentiality.is_none() {
                warn!(
                    authorization_id = %row.authorization_id,
                    type_url = %row.type_url,
                    "Authorization has no confidentiality ceiling, skipped"
                );
                continue;
            }
            let ceiling = if uses_confidentiality {
                row.max_confidentiality
            } else {
                None
            };
            match self.references.classify(ctx.component, &row.type_url) {
                ResolvedReference::Local(id) => merge_ceiling(&mut local, id, ceiling),
                ResolvedReference::External(url) => merge_ceiling(&mut external, url, ceiling),
                ResolvedReference::Unresolvable(reason) => warn!(
                    authorization_id = %row.authorization_id,
                    type_url = %row.type_url,
                    reason = %reason,
                    "Local type URL does not resolve, skipped"
                ),
            }
        }

        if local.is_empty() && external.is_empty() {
            return QueryFilter::Nothing;
        }
        QueryFilter::Restricted(AuthorizationFilter {
            local,
            external,
            uses_confidentiality,
            columns,
            join_prefix: None,
        })
    }

    /// Union of the scopes of every row that covers `resource`, ignoring what
    /// the current action requires.
    pub fn scopes_for(&self, ctx: &AuthContext, resource: &impl ProtectedResource) -> BTreeSet<String> {
        let uses_confidentiality = ctx.component.uses_confidentiality();
        ctx.rows
            .iter()
            .filter(|row| {
                if !ctx.component.uses_type_scoping() {
                    return true;
                }
                let type_matches = match (
                    self.references.classify(ctx.component, &row.type_url),
                    resource.type_ref(),
                ) {
                    (ResolvedReference::Local(id), TypeRef::Local(own)) => id == *own,
                    (ResolvedReference::External(url), TypeRef::External(own)) => url == *own,
                    _ => false,
                };
                type_matches
                    && (!uses_confidentiality
                        || within_ceiling(resource.confidentiality(), row.max_confidentiality))
            })
            .flat_map(|row| row.scopes.iter().cloned())
            .collect()
    }
}

// More than one row for the same type: the highest ceiling wins.
fn merge_ceiling<K: Ord>(
    map: &mut BTreeMap<K, Option<Confidentiality>>,
    key: K,
    ceiling: Option<Confidentiality>,
) {
    let entry = map.entry(key).or_insert(ceiling);
    if ceiling > *entry {
        *entry = ceiling;
    }
}

fn within_ceiling(level: Option<Confidentiality>, ceiling: Option<Confidentiality>) -> bool {
    match (level, ceiling) {
        (Some(level), Some(ceiling)) => level.within(ceiling),
        _ => false,
    }
}

impl QueryFilter {
    /// Apply the filter to a related table reached through `prefix`, a dotted
    /// path such as `case` or `document.case`.
    pub fn with_join_prefix(self, prefix: &str) -> Self {
        match self {
            QueryFilter::Restricted(mut filter) => {
                filter.join_prefix = Some(prefix.to_string());
                QueryFilter::Restricted(filter)
            }
            other => other,
        }
    }

    pub fn matches(&self, resource: &impl ProtectedResource) -> bool {
        match self {
            QueryFilter::Unrestricted => true,
            QueryFilter::Nothing => false,
            QueryFilter::Restricted(filter) => filter.matches(resource),
        }
    }

    /// The SQL expression this filter renders to.
    pub fn predicate(&self) -> SqlPredicate {
        match self {
            QueryFilter::Unrestricted => SqlPredicate::Const(true),
            QueryFilter::Nothing => SqlPredicate::Const(false),
            QueryFilter::Restricted(filter) => filter.predicate(),
        }
    }

    /// Push the predicate as a boolean SQL expression.
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        self.predicate().push(qb);
    }
}

/// Boolean SQL expression over a protected table. Column names are already
/// qualified by the join prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlPredicate {
    Const(bool),
    /// Conjunction inside one pair of parentheses.
    All(Vec<SqlPredicate>),
    TypeIn(TypeMatch),
    /// Ordinal of the confidentiality column is at most the ceiling of the
    /// first matching type group, or -1 when none matches.
    WithinCeiling {
        column: String,
        ceilings: Vec<(TypeMatch, i32)>,
    },
}

/// `local = ANY(..) OR external = ANY(..)`; an empty side is left out.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMatch {
    pub local: Option<(String, Vec<Uuid>)>,
    pub external: Option<(String, Vec<String>)>,
}

impl SqlPredicate {
    pub fn push(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            SqlPredicate::Const(true) => {
                qb.push("TRUE");
            }
            SqlPredicate::Const(false) => {
                qb.push("FALSE");
            }
            SqlPredicate::All(parts) => {
                qb.push("(");
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        qb.push(" AND ");
                    }
                    part.push(qb);
                }
                qb.push(")");
            }
            SqlPredicate::TypeIn(types) => types.push(qb),
            SqlPredicate::WithinCeiling { column, ceilings } => {
                qb.push("(CASE ");
                qb.push(column);
                for level in Confidentiality::LADDER {
                    qb.push(format!(" WHEN '{}' THEN {}", level.as_str(), level.order()));
                }
                qb.push(" ELSE 99 END) <= (CASE");
                for (types, ceiling) in ceilings {
                    qb.push(" WHEN ");
                    types.push(qb);
                    qb.push(format!(" THEN {}", ceiling));
                }
                qb.push(" ELSE -1 END)");
            }
        }
    }
}

impl TypeMatch {
    fn push(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push("(");
        if let Some((column, ids)) = &self.local {
            qb.push(column);
            qb.push(" = ANY(");
            qb.push_bind(ids.clone());
            qb.push(")");
        }
        if let Some((column, urls)) = &self.external {
            if self.local.is_some() {
                qb.push(" OR ");
            }
            qb.push(column);
            qb.push(" = ANY(");
            qb.push_bind(urls.clone());
            qb.push(")");
        }
        qb.push(")");
    }
}

impl AuthorizationFilter {
    pub fn matches(&self, resource: &impl ProtectedResource) -> bool {
        let ceiling = match resource.type_ref() {
            TypeRef::Local(id) => self.local.get(id),
            TypeRef::External(url) => self.external.get(url),
        };
        match ceiling {
            None => false,
            Some(_) if !self.uses_confidentiality => true,
            Some(ceiling) => within_ceiling(resource.confidentiality(), *ceiling),
        }
    }

    fn column(&self, name: &str) -> String {
        match &self.join_prefix {
            Some(prefix) => format!("\"{}\".{}", prefix.replace('.', "__"), name),
            None => name.to_string(),
        }
    }

    fn type_match(&self, local: Vec<Uuid>, external: Vec<String>) -> TypeMatch {
        TypeMatch {
            local: (!local.is_empty()).then(|| (self.column(self.columns.local_type), local)),
            external: (!external.is_empty())
                .then(|| (self.column(self.columns.external_type), external)),
        }
    }

    fn predicate(&self) -> SqlPredicate {
        let mut parts = vec![SqlPredicate::TypeIn(self.type_match(
            self.local.keys().copied().collect(),
            self.external.keys().cloned().collect(),
        ))];

        if let (true, Some(conf_column)) = (self.uses_confidentiality, self.columns.confidentiality)
        {
            let mut by_ceiling: BTreeMap<Confidentiality, (Vec<Uuid>, Vec<String>)> =
                BTreeMap::new();
            for (id, ceiling) in &self.local {
                if let Some(ceiling) = ceiling {
                    by_ceiling.entry(*ceiling).or_default().0.push(*id);
                }
            }
            for (url, ceiling) in &self.external {
                if let Some(ceiling) = ceiling {
                    by_ceiling.entry(*ceiling).or_default().1.push(url.clone());
                }
            }
            // CASE takes the first matching WHEN: highest ceiling first
            let ceilings = by_ceiling
                .into_iter()
                .rev()
                .map(|(ceiling, (local, external))| {
                    (self.type_match(local, external), ceiling.order())
                })
                .collect();
            parts.push(SqlPredicate::WithinCeiling {
                column: self.column(conf_column),
                ceilings,
            });
        }
        SqlPredicate::All(parts)
    }
}
