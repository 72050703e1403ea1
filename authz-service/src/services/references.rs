//! Classification of resource-type URLs into local entities and external
//! identifiers.

use url::Url;
use uuid::Uuid;

use crate::models::{Component, TypeRef};

/// Host patterns considered local: `*`, `.suffix` (the domain and all its
/// subdomains) or an exact host. Matching ignores case and port.
#[derive(Debug, Clone, Default)]
pub struct HostAllowList {
    patterns: Vec<String>,
}

impl HostAllowList {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Parse a comma separated list such as `localhost,.example.org`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn allows(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.patterns.iter().any(|pattern| {
            if pattern == "*" {
                true
            } else if let Some(domain) = pattern.strip_prefix('.') {
                host == domain || host.ends_with(pattern.as_str())
            } else {
                *pattern == host
            }
        })
    }
}

/// Outcome of classifying an authorization's type URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedReference {
    Local(Uuid),
    External(String),
    /// Local host but no resolvable entity behind it.
    Unresolvable(String),
}

#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    allowed_hosts: HostAllowList,
    base_url: String,
}

impl ReferenceResolver {
    pub fn new(allowed_hosts: HostAllowList, base_url: &Url) -> Self {
        Self {
            allowed_hosts,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        }
    }

    pub fn is_local(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| self.allowed_hosts.allows(host))
            .unwrap_or(false)
    }

    /// Classify `type_url` for `component`. A local URL resolves only when its
    /// path ends in `/<type collection>/<uuid>`.
    pub fn classify(&self, component: Component, type_url: &str) -> ResolvedReference {
        let url = match Url::parse(type_url) {
            Ok(url) => url,
            Err(e) => return ResolvedReference::Unresolvable(format!("invalid URL: {}", e)),
        };
        if !self.is_local(&url) {
            return ResolvedReference::External(type_url.to_string());
        }
        let Some(collection) = component.type_collection() else {
            return ResolvedReference::Unresolvable(format!(
                "component {} has no resource-types",
                component
            ));
        };

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            [.., parent, last] if *parent == collection => match Uuid::parse_str(last) {
                Ok(id) => ResolvedReference::Local(id),
                Err(_) => ResolvedReference::Unresolvable(format!("'{}' is not an id", last)),
            },
            _ => ResolvedReference::Unresolvable(format!("path is not a {} resource", collection)),
        }
    }

    /// Resolve a client supplied type URL into a reference to store.
    pub fn to_type_ref(&self, component: Component, type_url: &str) -> Option<TypeRef> {
        match self.classify(component, type_url) {
            ResolvedReference::Local(id) => Some(TypeRef::Local(id)),
            ResolvedReference::External(url) => Some(TypeRef::External(url)),
            ResolvedReference::Unresolvable(_) => None,
        }
    }

    /// Canonical URL of a local resource-type.
    pub fn local_type_url(&self, component: Component, type_id: Uuid) -> Option<String> {
        component
            .type_collection()
            .map(|collection| format!("{}/{}/{}", self.base_url, collection, type_id))
    }

    pub fn render(&self, component: Component, type_ref: &TypeRef) -> String {
        match type_ref {
            TypeRef::Local(id) => self
                .local_type_url(component, *id)
                .unwrap_or_else(|| id.to_string()),
            TypeRef::External(url) => url.clone(),
        }
    }
}
