//! Authorization registry: applications, credentials and authorization rows.
//!
//! [`RegistryStore`] is the storage seam; [`AuthorizationRegistry`] adds the
//! per-process caches, write validation and deadline handling on top of it.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;
use validator::Validate;

use super::cache::TtlCache;
use super::references::{ReferenceResolver, ResolvedReference};
use super::{AuthzError, CredentialStore, Deadline};
use crate::models::{
    Application, Authorization, AuthorizationSpec, CatalogueAuthorization, Component, Credential,
    NewResourceType, ResourceType,
};
use crate::scopes::is_valid_scope_id;

#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn credential_secret(&self, client_id: &str) -> Result<Option<String>, AuthzError>;
    async fn save_credential(&self, credential: &Credential) -> Result<(), AuthzError>;
    async fn delete_credential(&self, client_id: &str) -> Result<bool, AuthzError>;

    /// Every application listing `client_id`.
    async fn applications_for(&self, client_id: &str) -> Result<Vec<Application>, AuthzError>;
    async fn application(&self, application_id: Uuid) -> Result<Option<Application>, AuthzError>;
    async fn list_applications(&self) -> Result<Vec<Application>, AuthzError>;
    /// Insert or replace the application together with all of its rows.
    async fn save_application(
        &self,
        application: &Application,
        rows: &[Authorization],
    ) -> Result<(), AuthzError>;
    async fn delete_application(&self, application_id: Uuid) -> Result<bool, AuthzError>;

    async fn authorizations_of(
        &self,
        application_id: Uuid,
        component: Component,
    ) -> Result<Vec<Authorization>, AuthzError>;
    async fn all_authorizations_of(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<Authorization>, AuthzError>;

    async fn catalogue_authorizations_of(
        &self,
        application_id: Uuid,
        component: Component,
    ) -> Result<Vec<CatalogueAuthorization>, AuthzError>;
    async fn save_catalogue_authorization(
        &self,
        grant: &CatalogueAuthorization,
    ) -> Result<(), AuthzError>;

    async fn resource_type(&self, type_id: Uuid) -> Result<Option<ResourceType>, AuthzError>;
    async fn types_in_catalogue(
        &self,
        catalogue_id: Uuid,
        component: Component,
    ) -> Result<Vec<ResourceType>, AuthzError>;
    /// Insert the type and, in the same transaction, the rows every
    /// authorization spec of its component implies.
    async fn create_resource_type(
        &self,
        resource_type: &ResourceType,
        references: &ReferenceResolver,
    ) -> Result<(), AuthzError>;

    /// Store the spec, backfilling rows for existing local types and
    /// replacing diverging ones, in one transaction. Returns the rows written.
    async fn save_authorization_spec(
        &self,
        spec: &AuthorizationSpec,
        references: &ReferenceResolver,
    ) -> Result<usize, AuthzError>;

    async fn ping(&self) -> Result<(), AuthzError>;
}

/// Rows `spec` implies for `types`, given the application's current rows of
/// that component. Rows that already agree are left out; rows that diverge
/// keep their id and type URL.
pub fn plan_spec_rows(
    spec: &AuthorizationSpec,
    existing: &[Authorization],
    types: &[ResourceType],
    references: &ReferenceResolver,
) -> Vec<Authorization> {
    types
        .iter()
        .filter(|t| t.component == spec.component)
        .filter_map(|t| {
            let current = existing.iter().find(|row| {
                row.component == spec.component
                    && references.classify(spec.component, &row.type_url)
                        == ResolvedReference::Local(t.type_id)
            });
            match current {
                Some(row) if spec.agrees_with(row) => None,
                Some(row) => Some(Authorization {
                    scopes: spec.scopes.clone(),
                    max_confidentiality: spec.max_confidentiality,
                    ..row.clone()
                }),
                None => references
                    .local_type_url(spec.component, t.type_id)
                    .map(|url| spec.row_for(url)),
            }
        })
        .collect()
}

fn validate_scopes<'a>(scopes: impl IntoIterator<Item = &'a String>) -> Result<(), AuthzError> {
    let mut any = false;
    for scope in scopes {
        any = true;
        if !is_valid_scope_id(scope) {
            return Err(AuthzError::Validation(format!(
                "'{}' is not a valid scope",
                scope
            )));
        }
    }
    if !any {
        return Err(AuthzError::Validation("at least one scope is required".into()));
    }
    Ok(())
}

fn validate_type_scoped(component: Component) -> Result<(), AuthzError> {
    if !component.uses_type_scoping() {
        return Err(AuthzError::Validation(format!(
            "component {} has no resource-types",
            component
        )));
    }
    Ok(())
}

/// Checks an application and its rows before they are stored.
pub fn validate_application(
    application: &Application,
    rows: &[Authorization],
) -> Result<(), AuthzError> {
    if application.label.trim().is_empty() {
        return Err(AuthzError::Validation("label must not be empty".into()));
    }
    let mut clients = HashSet::new();
    for client_id in &application.client_ids {
        if client_id.trim().is_empty() {
            return Err(AuthzError::Validation("client_id must not be empty".into()));
        }
        if !clients.insert(client_id) {
            return Err(AuthzError::Validation(format!(
                "client_id '{}' listed twice",
                client_id
            )));
        }
    }

    let mut seen = HashSet::new();
    for row in rows {
        if row.application_id != application.application_id {
            return Err(AuthzError::Validation(
                "authorization belongs to another application".into(),
            ));
        }
        validate_scopes(&row.scopes)?;
        if row.component.uses_type_scoping() {
            if Url::parse(&row.type_url).is_err() {
                return Err(AuthzError::Validation(format!(
                    "type_url '{}' must be an absolute URL",
                    row.type_url
                )));
            }
        } else if !row.type_url.is_empty() {
            return Err(AuthzError::Validation(format!(
                "component {} does not take a type_url",
                row.component
            )));
        }
        if !seen.insert((row.component, row.type_url.as_str())) {
            return Err(AuthzError::Validation(format!(
                "duplicate authorization for {} {}",
                row.component, row.type_url
            )));
        }
    }
    Ok(())
}

/// Catalogue grant plus the local types it currently covers.
#[derive(Debug, Clone)]
pub struct CatalogueGrant {
    pub grant: CatalogueAuthorization,
    pub type_ids: Vec<Uuid>,
}

/// Cached, validated access to a [`RegistryStore`].
pub struct AuthorizationRegistry {
    store: Arc<dyn RegistryStore>,
    references: ReferenceResolver,
    applications: TtlCache<String, Vec<Application>>,
    rows: TtlCache<(Uuid, Component), Vec<Authorization>>,
    catalogue_grants: TtlCache<(Uuid, Component), Vec<CatalogueGrant>>,
    secrets: TtlCache<String, Option<String>>,
}

impl AuthorizationRegistry {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        references: ReferenceResolver,
        cache_ttl: Duration,
        cache_max_entries: usize,
    ) -> Self {
        Self {
            store,
            references,
            applications: TtlCache::new("applications", cache_ttl, cache_max_entries),
            rows: TtlCache::new("authorizations", cache_ttl, cache_max_entries),
            catalogue_grants: TtlCache::new("catalogue_authorizations", cache_ttl, cache_max_entries),
            secrets: TtlCache::new("credentials", cache_ttl, cache_max_entries),
        }
    }

    pub fn references(&self) -> &ReferenceResolver {
        &self.references
    }

    pub async fn applications_for(
        &self,
        client_id: &str,
        deadline: &Deadline,
    ) -> Result<Vec<Application>, AuthzError> {
        let key = client_id.to_string();
        if let Some(apps) = self.applications.get(&key) {
            return Ok(apps);
        }
        let generation = self.applications.generation();
        let apps = deadline.run(self.store.applications_for(client_id)).await?;
        self.applications.insert_read_at(generation, key, apps.clone());
        Ok(apps)
    }

    /// Rows of the application for `component`; empty for unrestricted
    /// applications.
    pub async fn authorizations_of(
        &self,
        application: &Application,
        component: Component,
        deadline: &Deadline,
    ) -> Result<Vec<Authorization>, AuthzError> {
        if application.unrestricted {
            return Ok(Vec::new());
        }
        let key = (application.application_id, component);
        if let Some(rows) = self.rows.get(&key) {
            return Ok(rows);
        }
        let generation = self.rows.generation();
        let rows = deadline
            .run(self.store.authorizations_of(application.application_id, component))
            .await?;
        self.rows.insert_read_at(generation, key, rows.clone());
        Ok(rows)
    }

    pub async fn catalogue_grants_of(
        &self,
        application: &Application,
        component: Component,
        deadline: &Deadline,
    ) -> Result<Vec<CatalogueGrant>, AuthzError> {
        if application.unrestricted || !component.uses_type_scoping() {
            return Ok(Vec::new());
        }
        let key = (application.application_id, component);
        if let Some(grants) = self.catalogue_grants.get(&key) {
            return Ok(grants);
        }
        let generation = self.catalogue_grants.generation();
        let grants = deadline
            .run(async {
                let mut out = Vec::new();
                for grant in self
                    .store
                    .catalogue_authorizations_of(application.application_id, component)
                    .await?
                {
                    let type_ids = self
                        .store
                        .types_in_catalogue(grant.catalogue_id, component)
                        .await?
                        .into_iter()
                        .map(|t| t.type_id)
                        .collect();
                    out.push(CatalogueGrant { grant, type_ids });
                }
                Ok::<_, AuthzError>(out)
            })
            .await?;
        self.catalogue_grants
            .insert_read_at(generation, key, grants.clone());
        Ok(grants)
    }

    pub async fn resource_type(
        &self,
        type_id: Uuid,
        deadline: &Deadline,
    ) -> Result<Option<ResourceType>, AuthzError> {
        deadline.run(self.store.resource_type(type_id)).await
    }

    pub async fn list_applications(
        &self,
        deadline: &Deadline,
    ) -> Result<Vec<Application>, AuthzError> {
        deadline.run(self.store.list_applications()).await
    }

    pub async fn application_detail(
        &self,
        application_id: Uuid,
        deadline: &Deadline,
    ) -> Result<(Application, Vec<Authorization>), AuthzError> {
        deadline
            .run(async {
                let application = self
                    .store
                    .application(application_id)
                    .await?
                    .ok_or_else(|| AuthzError::NotFound(format!("Application {}", application_id)))?;
                let rows = self.store.all_authorizations_of(application_id).await?;
                Ok::<_, AuthzError>((application, rows))
            })
            .await
    }

    #[instrument(skip(self, rows, deadline), fields(application_id = %application.application_id))]
    pub async fn save_application(
        &self,
        application: &Application,
        rows: &[Authorization],
        deadline: &Deadline,
    ) -> Result<(), AuthzError> {
        validate_application(application, rows)?;
        deadline
            .run(self.store.save_application(application, rows))
            .await?;
        self.invalidate();
        info!(rows = rows.len(), "Application saved");
        Ok(())
    }

    #[instrument(skip(self, deadline))]
    pub async fn delete_application(
        &self,
        application_id: Uuid,
        deadline: &Deadline,
    ) -> Result<(), AuthzError> {
        let deleted = deadline
            .run(self.store.delete_application(application_id))
            .await?;
        self.invalidate();
        if !deleted {
            return Err(AuthzError::NotFound(format!("Application {}", application_id)));
        }
        info!("Application deleted");
        Ok(())
    }

    #[instrument(skip(self, credential, deadline), fields(client_id = %credential.client_id))]
    pub async fn save_credential(
        &self,
        credential: &Credential,
        deadline: &Deadline,
    ) -> Result<(), AuthzError> {
        if credential.client_id.trim().is_empty() || credential.secret.is_empty() {
            return Err(AuthzError::Validation(
                "client_id and secret must not be empty".into(),
            ));
        }
        deadline.run(self.store.save_credential(credential)).await?;
        self.invalidate();
        info!("Credential saved");
        Ok(())
    }

    #[instrument(skip(self, deadline))]
    pub async fn delete_credential(
        &self,
        client_id: &str,
        deadline: &Deadline,
    ) -> Result<(), AuthzError> {
        let deleted = deadline.run(self.store.delete_credential(client_id)).await?;
        self.invalidate();
        if !deleted {
            return Err(AuthzError::NotFound(format!("Credential {}", client_id)));
        }
        Ok(())
    }

    #[instrument(skip(self, spec, deadline), fields(application_id = %spec.application_id, component = %spec.component))]
    pub async fn save_authorization_spec(
        &self,
        spec: &AuthorizationSpec,
        deadline: &Deadline,
    ) -> Result<usize, AuthzError> {
        validate_type_scoped(spec.component)?;
        validate_scopes(&spec.scopes)?;
        let written = deadline
            .run(self.store.save_authorization_spec(spec, &self.references))
            .await?;
        self.invalidate();
        info!(rows = written, "Authorization spec applied");
        Ok(written)
    }

    #[instrument(skip(self, grant, deadline), fields(application_id = %grant.application_id, catalogue_id = %grant.catalogue_id))]
    pub async fn save_catalogue_authorization(
        &self,
        grant: &CatalogueAuthorization,
        deadline: &Deadline,
    ) -> Result<(), AuthzError> {
        validate_type_scoped(grant.component)?;
        validate_scopes(&grant.scopes)?;
        deadline
            .run(self.store.save_catalogue_authorization(grant))
            .await?;
        self.invalidate();
        Ok(())
    }

    #[instrument(skip(self, input, deadline), fields(component = %input.component))]
    pub async fn create_resource_type(
        &self,
        input: &NewResourceType,
        deadline: &Deadline,
    ) -> Result<ResourceType, AuthzError> {
        input.validate()?;
        validate_type_scoped(input.component)?;
        let resource_type = ResourceType {
            type_id: Uuid::new_v4(),
            component: input.component,
            catalogue_id: input.catalogue_id,
            identification: input.identification.clone(),
            created_utc: Utc::now(),
        };
        deadline
            .run(
                self.store
                    .create_resource_type(&resource_type, &self.references),
            )
            .await?;
        self.invalidate();
        info!(type_id = %resource_type.type_id, "Resource type created");
        Ok(resource_type)
    }

    pub async fn ping(&self, deadline: &Deadline) -> Result<(), AuthzError> {
        deadline.run(self.store.ping()).await
    }

    /// Drop every cached read; called after each successful write.
    pub fn invalidate(&self) {
        self.applications.invalidate_all();
        self.rows.invalidate_all();
        self.catalogue_grants.invalidate_all();
        self.secrets.invalidate_all();
    }
}

#[async_trait]
impl CredentialStore for AuthorizationRegistry {
    async fn lookup(&self, client_id: &str) -> Result<Option<String>, AuthzError> {
        let key = client_id.to_string();
        if let Some(secret) = self.secrets.get(&key) {
            return Ok(secret);
        }
        let generation = self.secrets.generation();
        let secret = self.store.credential_secret(client_id).await.map_err(|e| {
            warn!(client_id, error = %e, "Credential lookup failed");
            e
        })?;
        self.secrets.insert_read_at(generation, key, secret.clone());
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Confidentiality;
    use crate::services::references::HostAllowList;

    fn references() -> ReferenceResolver {
        ReferenceResolver::new(
            HostAllowList::parse("local"),
            &Url::parse("https://local").unwrap(),
        )
    }

    fn resource_type(component: Component) -> ResourceType {
        ResourceType {
            type_id: Uuid::new_v4(),
            component,
            catalogue_id: None,
            identification: "T".into(),
            created_utc: Utc::now(),
        }
    }

    fn app() -> Application {
        Application {
            application_id: Uuid::new_v4(),
            client_ids: vec!["demo".into()],
            label: "Demo".into(),
            unrestricted: false,
            created_utc: Utc::now(),
        }
    }

    fn row(app: &Application, component: Component, type_url: &str) -> Authorization {
        Authorization {
            authorization_id: Uuid::new_v4(),
            application_id: app.application_id,
            component,
            scopes: ["cases.read".to_string()].into_iter().collect(),
            type_url: type_url.into(),
            max_confidentiality: Some(Confidentiality::Internal),
        }
    }

    #[test]
    fn spec_plan_backfills_and_replaces_only_diverging_rows() {
        let refs = references();
        let app = app();
        let spec = AuthorizationSpec {
            application_id: app.application_id,
            component: Component::Cases,
            scopes: ["cases.read".to_string()].into_iter().collect(),
            max_confidentiality: Some(Confidentiality::Internal),
        };
        let agreeing = resource_type(Component::Cases);
        let diverging = resource_type(Component::Cases);
        let missing = resource_type(Component::Cases);
        let other_component = resource_type(Component::Decisions);

        let mut stale = row(
            &app,
            Component::Cases,
            &refs.local_type_url(Component::Cases, diverging.type_id).unwrap(),
        );
        stale.max_confidentiality = Some(Confidentiality::Secret);
        let existing = vec![
            row(
                &app,
                Component::Cases,
                &refs.local_type_url(Component::Cases, agreeing.type_id).unwrap(),
            ),
            stale.clone(),
        ];

        let planned = plan_spec_rows(
            &spec,
            &existing,
            &[agreeing, diverging, missing.clone(), other_component],
            &refs,
        );

        assert_eq!(planned.len(), 2);
        let replaced = planned
            .iter()
            .find(|r| r.authorization_id == stale.authorization_id)
            .unwrap();
        assert_eq!(replaced.max_confidentiality, Some(Confidentiality::Internal));
        assert!(planned.iter().any(|r| r.type_url
            == refs.local_type_url(Component::Cases, missing.type_id).unwrap()));
    }

    #[test]
    fn application_validation() {
        let app = app();
        assert!(validate_application(&app, &[row(&app, Component::Cases, "https://x/case-types/1")]).is_ok());

        let relative = row(&app, Component::Cases, "case-types/1");
        assert!(matches!(
            validate_application(&app, &[relative]),
            Err(AuthzError::Validation(_))
        ));

        let dup = row(&app, Component::Cases, "https://x/case-types/1");
        assert!(validate_application(&app, &[dup.clone(), dup]).is_err());

        let mut bad_scope = row(&app, Component::Cases, "https://x/case-types/1");
        bad_scope.scopes = ["Cases Read".to_string()].into_iter().collect();
        assert!(validate_application(&app, &[bad_scope]).is_err());

        let catalogue_with_url = row(&app, Component::Catalogues, "https://x/catalogues/1");
        assert!(validate_application(&app, &[catalogue_with_url]).is_err());
        assert!(validate_application(&app, &[row(&app, Component::Catalogues, "")]).is_ok());

        let mut twice = app.clone();
        twice.client_ids = vec!["a".into(), "a".into()];
        assert!(validate_application(&twice, &[]).is_err());
    }
}
