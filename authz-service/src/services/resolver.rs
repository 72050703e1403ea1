use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::registry::AuthorizationRegistry;
use super::{AuthzError, Deadline, VerifiedIdentity};
use crate::models::{Authorization, Component};

/// Authorization state of one caller for one component.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: VerifiedIdentity,
    pub component: Component,
    pub application_ids: Vec<Uuid>,
    pub unrestricted: bool,
    /// Empty when unrestricted.
    pub rows: Vec<Authorization>,
}

/// Collects the authorization rows applying to a caller.
#[derive(Clone)]
pub struct AuthorizationResolver {
    registry: Arc<AuthorizationRegistry>,
}

impl AuthorizationResolver {
    pub fn new(registry: Arc<AuthorizationRegistry>) -> Self {
        Self { registry }
    }

    /// Union the rows of every application registered for the caller's
    /// client id. Catalogue grants are expanded to one row per local type.
    pub async fn resolve(
        &self,
        identity: VerifiedIdentity,
        component: Component,
        deadline: &Deadline,
    ) -> Result<AuthContext, AuthzError> {
        let applications = self
            .registry
            .applications_for(&identity.client_id, deadline)
            .await?;
        if applications.is_empty() {
            warn!(client_id = %identity.client_id, "No application for client");
            return Err(AuthzError::UnknownApplication(identity.client_id));
        }

        let application_ids = applications.iter().map(|a| a.application_id).collect();
        if applications.iter().any(|a| a.unrestricted) {
            debug!(client_id = %identity.client_id, %component, "Unrestricted application");
            return Ok(AuthContext {
                identity,
                component,
                application_ids,
                unrestricted: true,
                rows: Vec::new(),
            });
        }

        let references = self.registry.references();
        let mut rows = Vec::new();
        for application in &applications {
            rows.extend(
                self.registry
                    .authorizations_of(application, component, deadline)
                    .await?,
            );
            for grant in self
                .registry
                .catalogue_grants_of(application, component, deadline)
                .await?
            {
                rows.extend(grant.type_ids.iter().filter_map(|type_id| {
                    references
                        .local_type_url(component, *type_id)
                        .map(|url| grant.grant.row_for(url))
                }));
            }
        }

        debug!(
            client_id = %identity.client_id,
            %component,
            rows = rows.len(),
            "Authorizations resolved"
        );
        Ok(AuthContext {
            identity,
            component,
            application_ids,
            unrestricted: false,
            rows,
        })
    }
}
