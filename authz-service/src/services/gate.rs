//! Action gate: the per-request authorization pipeline.
//!
//! Each step consumes the previous step's output, so a handler can only reach
//! an [`ActionPermit`] through identification, application resolution and the
//! action check, in that order.

use std::collections::BTreeSet;
use tracing::warn;

use super::query::{QueryAuthorizer, QueryFilter};
use super::references::ReferenceResolver;
use super::{metrics, AuthContext, AuthorizationResolver, AuthzError, Deadline, TokenVerifier, VerifiedIdentity};
use crate::models::{Case, Component, Confidentiality, ProtectedResource, ResourceColumns, TypeRef};
use crate::scopes::known::{CASES_FORCE_UPDATE, CASES_REOPEN, CASE_REOPEN, STATUS_ADD};
use crate::scopes::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    List,
    Update,
    PartialUpdate,
    Destroy,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::List => "list",
            Action::Update => "update",
            Action::PartialUpdate => "partial_update",
            Action::Destroy => "destroy",
        }
    }
}

/// Composite scope each action of an endpoint requires.
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    component: Component,
    requirements: Vec<(Action, Scope)>,
}

impl EndpointPolicy {
    pub fn new(component: Component) -> Self {
        Self {
            component,
            requirements: Vec::new(),
        }
    }

    pub fn require(mut self, actions: &[Action], scope: &Scope) -> Self {
        for action in actions {
            self.requirements.push((*action, scope.clone()));
        }
        self
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn required(&self, action: Action) -> Option<&Scope> {
        self.requirements
            .iter()
            .find(|(a, _)| *a == action)
            .map(|(_, scope)| scope)
    }
}

#[derive(Clone)]
pub struct ActionGate {
    verifier: TokenVerifier,
    resolver: AuthorizationResolver,
    references: ReferenceResolver,
}

impl ActionGate {
    pub fn new(
        verifier: TokenVerifier,
        resolver: AuthorizationResolver,
        references: ReferenceResolver,
    ) -> Self {
        Self {
            verifier,
            resolver,
            references,
        }
    }

    /// Verify the bearer token of an `Authorization` header.
    pub async fn identify(
        &self,
        header: Option<&str>,
        deadline: &Deadline,
    ) -> Result<VerifiedIdentity, AuthzError> {
        self.verifier.verify_header(header, deadline).await
    }

    pub async fn resolve(
        &self,
        identity: VerifiedIdentity,
        component: Component,
        deadline: &Deadline,
    ) -> Result<AuthContext, AuthzError> {
        self.resolver.resolve(identity, component, deadline).await
    }

    /// Require at least one row whose scopes contain what `action` needs.
    pub fn check_action(
        &self,
        ctx: AuthContext,
        policy: &EndpointPolicy,
        action: Action,
    ) -> Result<ActionPermit, AuthzError> {
        let component = policy.component();
        let Some(required) = policy.required(action).cloned() else {
            metrics::record_decision(component.as_str(), action.as_str(), "deny");
            return Err(AuthzError::denied(format!(
                "Action {} is not available on this endpoint",
                action.as_str()
            )));
        };

        if !ctx.unrestricted && !ctx.rows.iter().any(|row| row.grants(&required)) {
            warn!(
                client_id = %ctx.identity.client_id,
                %component,
                action = action.as_str(),
                required = %required,
                "Action denied"
            );
            metrics::record_decision(component.as_str(), action.as_str(), "deny");
            return Err(AuthzError::denied(format!(
                "Missing scope {} for {}",
                required,
                action.as_str()
            )));
        }

        metrics::record_decision(component.as_str(), action.as_str(), "permit");
        Ok(ActionPermit {
            ctx,
            action,
            required,
            references: self.references.clone(),
        })
    }

    /// Resolve the caller's application and check the action in one step.
    pub async fn authorize(
        &self,
        identity: &VerifiedIdentity,
        policy: &EndpointPolicy,
        action: Action,
        deadline: &Deadline,
    ) -> Result<ActionPermit, AuthzError> {
        let ctx = self
            .resolve(identity.clone(), policy.component(), deadline)
            .await?;
        self.check_action(ctx, policy, action)
    }
}

/// Proof that the caller passed the action check; carries what is needed
/// for the object level checks that follow.
#[derive(Debug, Clone)]
pub struct ActionPermit {
    ctx: AuthContext,
    action: Action,
    required: Scope,
    references: ReferenceResolver,
}

impl ActionPermit {
    pub fn identity(&self) -> &VerifiedIdentity {
        &self.ctx.identity
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn is_unrestricted(&self) -> bool {
        self.ctx.unrestricted
    }

    pub fn query_filter(&self, columns: ResourceColumns) -> QueryFilter {
        QueryAuthorizer::new(&self.references).build(&self.ctx, &self.required, columns)
    }

    fn deny(&self, outcome: &'static str, err: AuthzError) -> AuthzError {
        warn!(
            client_id = %self.ctx.identity.client_id,
            component = %self.ctx.component,
            action = self.action.as_str(),
            reason = err.reason(),
            "Object access denied"
        );
        metrics::record_decision(self.ctx.component.as_str(), self.action.as_str(), outcome);
        err
    }

    /// The loaded object must satisfy the same rule the list filter applies.
    pub fn check_object(
        &self,
        resource: &impl ProtectedResource,
        columns: ResourceColumns,
    ) -> Result<(), AuthzError> {
        if self.query_filter(columns).matches(resource) {
            return Ok(());
        }
        Err(self.deny(
            "deny",
            AuthzError::denied("You do not have permission to access this object"),
        ))
    }

    /// A new object may only reference a type (and level) the caller is
    /// authorized for.
    pub fn check_create(
        &self,
        type_ref: &TypeRef,
        confidentiality: Option<Confidentiality>,
        columns: ResourceColumns,
    ) -> Result<(), AuthzError> {
        struct Candidate<'a> {
            type_ref: &'a TypeRef,
            confidentiality: Option<Confidentiality>,
        }
        impl ProtectedResource for Candidate<'_> {
            fn type_ref(&self) -> &TypeRef {
                self.type_ref
            }
            fn confidentiality(&self) -> Option<Confidentiality> {
                self.confidentiality
            }
        }

        let candidate = Candidate {
            type_ref,
            confidentiality,
        };
        if self.query_filter(columns).matches(&candidate) {
            return Ok(());
        }
        Err(self.deny(
            "deny",
            AuthzError::denied("You are not authorized for this resource type"),
        ))
    }

    fn scopes_for(&self, resource: &impl ProtectedResource) -> BTreeSet<String> {
        QueryAuthorizer::new(&self.references).scopes_for(&self.ctx, resource)
    }

    /// Object check plus the closed-case override.
    pub fn check_mutation(&self, case: &Case, columns: ResourceColumns) -> Result<(), AuthzError> {
        self.check_object(case, columns)?;
        if case.is_closed()
            && !self.ctx.unrestricted
            && !self.scopes_for(case).contains(CASES_FORCE_UPDATE)
        {
            return Err(self.deny(
                "closed",
                AuthzError::ResourceClosed(format!(
                    "The case is closed; changing it requires {}",
                    CASES_FORCE_UPDATE
                )),
            ));
        }
        Ok(())
    }

    /// Rules for adding a status to `case`, which already has statuses when
    /// `has_statuses` is set.
    pub fn check_status_create(
        &self,
        case: &Case,
        has_statuses: bool,
        columns: ResourceColumns,
    ) -> Result<(), AuthzError> {
        self.check_object(case, columns)?;
        if self.ctx.unrestricted {
            return Ok(());
        }
        let granted = self.scopes_for(case);
        if case.is_closed() && !CASE_REOPEN.is_contained_in(&granted) {
            return Err(self.deny(
                "deny",
                AuthzError::denied(format!(
                    "Re-opening a closed case requires {}",
                    CASES_REOPEN
                )),
            ));
        }
        if has_statuses && !STATUS_ADD.is_contained_in(&granted) {
            return Err(self.deny(
                "deny",
                AuthzError::denied(format!(
                    "Only the initial status may be set without {}",
                    *STATUS_ADD
                )),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Application, Authorization, CASE_COLUMNS};
    use crate::scopes::known::{CASE_READ, CASE_UPDATE, STATUS_CREATE};
    use crate::services::references::HostAllowList;
    use crate::services::{AuthorizationRegistry, MemoryStore, RegistryStore};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use url::Url;
    use uuid::Uuid;

    fn references() -> ReferenceResolver {
        ReferenceResolver::new(
            HostAllowList::parse("local"),
            &Url::parse("https://local").unwrap(),
        )
    }

    fn policy() -> EndpointPolicy {
        EndpointPolicy::new(Component::Cases)
            .require(&[Action::List, Action::Read], &CASE_READ)
            .require(&[Action::Update, Action::PartialUpdate], &CASE_UPDATE)
            .require(&[Action::Create], &STATUS_CREATE)
    }

    fn identity() -> VerifiedIdentity {
        VerifiedIdentity {
            client_id: "demo".into(),
            user_id: "u-1".into(),
            user_representation: "U".into(),
        }
    }

    async fn gate_with(unrestricted: bool, grants: &[(Uuid, Vec<&str>)]) -> ActionGate {
        let store = Arc::new(MemoryStore::new());
        let app = Application {
            application_id: Uuid::new_v4(),
            client_ids: vec!["demo".into()],
            label: "Demo".into(),
            unrestricted,
            created_utc: Utc::now(),
        };
        let rows: Vec<_> = grants
            .iter()
            .map(|(type_id, scopes)| Authorization {
                authorization_id: Uuid::new_v4(),
                application_id: app.application_id,
                component: Component::Cases,
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
                type_url: format!("https://local/case-types/{}", type_id),
                max_confidentiality: Some(Confidentiality::Secret),
            })
            .collect();
        store.save_application(&app, &rows).await.unwrap();

        let registry = Arc::new(AuthorizationRegistry::new(
            store,
            references(),
            Duration::from_secs(60),
            100,
        ));
        ActionGate::new(
            TokenVerifier::new(registry.clone()),
            AuthorizationResolver::new(registry),
            references(),
        )
    }

    fn case(type_id: Uuid, closed: bool) -> Case {
        Case {
            case_id: Uuid::new_v4(),
            identification: "ZAAK-1".into(),
            case_type: TypeRef::Local(type_id),
            confidentiality: Confidentiality::Internal,
            end_date: closed.then(Utc::now),
            created_utc: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unknown_application_is_denied() {
        let gate = gate_with(false, &[]).await;
        let stranger = VerifiedIdentity {
            client_id: "stranger".into(),
            ..identity()
        };
        let err = gate
            .authorize(&stranger, &policy(), Action::List, &Deadline::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnknownApplication(c) if c == "stranger"));
    }

    #[tokio::test]
    async fn action_requires_a_granting_row() {
        let type_id = Uuid::new_v4();
        let gate = gate_with(false, &[(type_id, vec!["cases.read"])]).await;
        let deadline = Deadline::default();

        assert!(gate
            .authorize(&identity(), &policy(), Action::Read, &deadline)
            .await
            .is_ok());
        assert!(matches!(
            gate.authorize(&identity(), &policy(), Action::Update, &deadline)
                .await,
            Err(AuthzError::PermissionDenied(_))
        ));
        assert!(matches!(
            gate.authorize(&identity(), &policy(), Action::Destroy, &deadline)
                .await,
            Err(AuthzError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn unrestricted_passes_every_check() {
        let gate = gate_with(true, &[]).await;
        let permit = gate
            .authorize(&identity(), &policy(), Action::Update, &Deadline::default())
            .await
            .unwrap();
        assert!(permit.is_unrestricted());
        assert!(permit
            .check_mutation(&case(Uuid::new_v4(), true), CASE_COLUMNS)
            .is_ok());
    }

    #[tokio::test]
    async fn closed_case_needs_force_update_for_that_type() {
        let plain = Uuid::new_v4();
        let forced = Uuid::new_v4();
        let gate = gate_with(
            false,
            &[
                (plain, vec!["cases.update"]),
                (forced, vec!["cases.update", "cases.force_update"]),
            ],
        )
        .await;
        let permit = gate
            .authorize(&identity(), &policy(), Action::PartialUpdate, &Deadline::default())
            .await
            .unwrap();

        assert!(permit.check_mutation(&case(plain, false), CASE_COLUMNS).is_ok());
        assert!(matches!(
            permit.check_mutation(&case(plain, true), CASE_COLUMNS),
            Err(AuthzError::ResourceClosed(_))
        ));
        assert!(permit.check_mutation(&case(forced, true), CASE_COLUMNS).is_ok());
        assert!(matches!(
            permit.check_mutation(&case(Uuid::new_v4(), false), CASE_COLUMNS),
            Err(AuthzError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn status_rules() {
        let initial_only = Uuid::new_v4();
        let adder = Uuid::new_v4();
        let reopener = Uuid::new_v4();
        let gate = gate_with(
            false,
            &[
                (initial_only, vec!["cases.create"]),
                (adder, vec!["cases.add_status"]),
                (reopener, vec!["cases.reopen"]),
            ],
        )
        .await;
        let permit = gate
            .authorize(&identity(), &policy(), Action::Create, &Deadline::default())
            .await
            .unwrap();

        assert!(permit
            .check_status_create(&case(initial_only, false), false, CASE_COLUMNS)
            .is_ok());
        assert!(permit
            .check_status_create(&case(initial_only, false), true, CASE_COLUMNS)
            .is_err());
        assert!(permit
            .check_status_create(&case(adder, false), true, CASE_COLUMNS)
            .is_ok());
        let reopen_denied = permit
            .check_status_create(&case(adder, true), true, CASE_COLUMNS)
            .unwrap_err();
        assert!(reopen_denied.to_string().contains("cases.reopen"));
        assert!(permit
            .check_status_create(&case(reopener, true), true, CASE_COLUMNS)
            .is_ok());
    }

    #[tokio::test]
    async fn create_is_limited_to_authorized_types() {
        let type_id = Uuid::new_v4();
        let gate = gate_with(false, &[(type_id, vec!["cases.create"])]).await;
        let permit = gate
            .authorize(&identity(), &policy(), Action::Create, &Deadline::default())
            .await
            .unwrap();

        assert!(permit
            .check_create(
                &TypeRef::Local(type_id),
                Some(Confidentiality::Secret),
                CASE_COLUMNS
            )
            .is_ok());
        assert!(permit
            .check_create(
                &TypeRef::Local(type_id),
                Some(Confidentiality::TopSecret),
                CASE_COLUMNS
            )
            .is_err());
        assert!(permit
            .check_create(
                &TypeRef::External("https://elsewhere/case-types/1".into()),
                Some(Confidentiality::Public),
                CASE_COLUMNS
            )
            .is_err());
    }
}
