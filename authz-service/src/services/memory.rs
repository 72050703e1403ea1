//! In-process store used for local development and tests.
//!
//! One mutex guards all state, so every operation behaves like a
//! serializable transaction.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::cases::{CaseCheck, CaseStore, Page, StatusCheck};
use super::query::QueryFilter;
use super::references::ReferenceResolver;
use super::registry::{plan_spec_rows, RegistryStore};
use super::AuthzError;
use crate::models::{
    Application, Authorization, AuthorizationSpec, Case, CasePatch, CaseStatus,
    CatalogueAuthorization, Component, Credential, NewCase, NewCaseStatus, ResourceType, TypeRef,
};

#[derive(Default)]
struct State {
    credentials: HashMap<String, String>,
    applications: BTreeMap<Uuid, Application>,
    authorizations: Vec<Authorization>,
    specs: Vec<AuthorizationSpec>,
    catalogue_grants: Vec<CatalogueAuthorization>,
    resource_types: BTreeMap<Uuid, ResourceType>,
    cases: Vec<Case>,
    statuses: Vec<CaseStatus>,
}

impl State {
    fn upsert_authorization(&mut self, row: Authorization) {
        match self.authorizations.iter_mut().find(|r| {
            r.application_id == row.application_id
                && r.component == row.component
                && r.type_url == row.type_url
        }) {
            Some(existing) => {
                existing.scopes = row.scopes;
                existing.max_confidentiality = row.max_confidentiality;
            }
            None => self.authorizations.push(row),
        }
    }

    fn case_mut(&mut self, case_id: Uuid) -> Result<&mut Case, AuthzError> {
        self.cases
            .iter_mut()
            .find(|c| c.case_id == case_id)
            .ok_or_else(|| AuthzError::NotFound(format!("Case {}", case_id)))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, AuthzError> {
        self.state
            .lock()
            .map_err(|e| AuthzError::Storage(anyhow::anyhow!("Memory store mutex poisoned: {}", e)))
    }
}

fn paginate<T: Clone>(items: Vec<&T>, page: Page) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    let items = items
        .into_iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect();
    (items, total)
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn credential_secret(&self, client_id: &str) -> Result<Option<String>, AuthzError> {
        Ok(self.state()?.credentials.get(client_id).cloned())
    }

    async fn save_credential(&self, credential: &Credential) -> Result<(), AuthzError> {
        self.state()?
            .credentials
            .insert(credential.client_id.clone(), credential.secret.clone());
        Ok(())
    }

    async fn delete_credential(&self, client_id: &str) -> Result<bool, AuthzError> {
        Ok(self.state()?.credentials.remove(client_id).is_some())
    }

    async fn applications_for(&self, client_id: &str) -> Result<Vec<Application>, AuthzError> {
        Ok(self
            .state()?
            .applications
            .values()
            .filter(|a| a.has_client(client_id))
            .cloned()
            .collect())
    }

    async fn application(&self, application_id: Uuid) -> Result<Option<Application>, AuthzError> {
        Ok(self.state()?.applications.get(&application_id).cloned())
    }

    async fn list_applications(&self) -> Result<Vec<Application>, AuthzError> {
        let mut apps: Vec<_> = self.state()?.applications.values().cloned().collect();
        apps.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(apps)
    }

    async fn save_application(
        &self,
        application: &Application,
        rows: &[Authorization],
    ) -> Result<(), AuthzError> {
        let mut state = self.state()?;
        if let Some(other) = state.applications.values().find(|a| {
            a.application_id != application.application_id
                && application.client_ids.iter().any(|c| a.has_client(c))
        }) {
            return Err(AuthzError::Conflict(format!(
                "client_id already used by application {}",
                other.application_id
            )));
        }
        let mut stored = application.clone();
        if let Some(existing) = state.applications.get(&application.application_id) {
            stored.created_utc = existing.created_utc;
        }
        state.applications.insert(application.application_id, stored);
        state
            .authorizations
            .retain(|r| r.application_id != application.application_id);
        state.authorizations.extend(rows.iter().cloned());
        Ok(())
    }

    async fn delete_application(&self, application_id: Uuid) -> Result<bool, AuthzError> {
        let mut state = self.state()?;
        let removed = state.applications.remove(&application_id).is_some();
        state.authorizations.retain(|r| r.application_id != application_id);
        state.specs.retain(|s| s.application_id != application_id);
        state
            .catalogue_grants
            .retain(|g| g.application_id != application_id);
        Ok(removed)
    }

    async fn authorizations_of(
        &self,
        application_id: Uuid,
        component: Component,
    ) -> Result<Vec<Authorization>, AuthzError> {
        Ok(self
            .state()?
            .authorizations
            .iter()
            .filter(|r| r.application_id == application_id && r.component == component)
            .cloned()
            .collect())
    }

    async fn all_authorizations_of(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<Authorization>, AuthzError> {
        Ok(self
            .state()?
            .authorizations
            .iter()
            .filter(|r| r.application_id == application_id)
            .cloned()
            .collect())
    }

    async fn catalogue_authorizations_of(
        &self,
        application_id: Uuid,
        component: Component,
    ) -> Result<Vec<CatalogueAuthorization>, AuthzError> {
        Ok(self
            .state()?
            .catalogue_grants
            .iter()
            .filter(|g| g.application_id == application_id && g.component == component)
            .cloned()
            .collect())
    }

    async fn save_catalogue_authorization(
        &self,
        grant: &CatalogueAuthorization,
    ) -> Result<(), AuthzError> {
        let mut state = self.state()?;
        if !state.applications.contains_key(&grant.application_id) {
            return Err(AuthzError::Validation(format!(
                "Application {} does not exist",
                grant.application_id
            )));
        }
        state.catalogue_grants.retain(|g| {
            !(g.application_id == grant.application_id
                && g.component == grant.component
                && g.catalogue_id == grant.catalogue_id)
        });
        state.catalogue_grants.push(grant.clone());
        Ok(())
    }

    async fn resource_type(&self, type_id: Uuid) -> Result<Option<ResourceType>, AuthzError> {
        Ok(self.state()?.resource_types.get(&type_id).cloned())
    }

    async fn types_in_catalogue(
        &self,
        catalogue_id: Uuid,
        component: Component,
    ) -> Result<Vec<ResourceType>, AuthzError> {
        Ok(self
            .state()?
            .resource_types
            .values()
            .filter(|t| t.catalogue_id == Some(catalogue_id) && t.component == component)
            .cloned()
            .collect())
    }

    async fn create_resource_type(
        &self,
        resource_type: &ResourceType,
        references: &ReferenceResolver,
    ) -> Result<(), AuthzError> {
        let mut state = self.state()?;
        let mut rows = Vec::new();
        for spec in state
            .specs
            .iter()
            .filter(|s| s.component == resource_type.component)
        {
            let existing: Vec<_> = state
                .authorizations
                .iter()
                .filter(|r| r.application_id == spec.application_id)
                .cloned()
                .collect();
            rows.extend(plan_spec_rows(
                spec,
                &existing,
                std::slice::from_ref(resource_type),
                references,
            ));
        }
        state
            .resource_types
            .insert(resource_type.type_id, resource_type.clone());
        for row in rows {
            state.upsert_authorization(row);
        }
        Ok(())
    }

    async fn save_authorization_spec(
        &self,
        spec: &AuthorizationSpec,
        references: &ReferenceResolver,
    ) -> Result<usize, AuthzError> {
        let mut state = self.state()?;
        if !state.applications.contains_key(&spec.application_id) {
            return Err(AuthzError::Validation(format!(
                "Application {} does not exist",
                spec.application_id
            )));
        }
        let types: Vec<_> = state.resource_types.values().cloned().collect();
        let existing: Vec<_> = state
            .authorizations
            .iter()
            .filter(|r| r.application_id == spec.application_id)
            .cloned()
            .collect();
        let rows = plan_spec_rows(spec, &existing, &types, references);
        let written = rows.len();

        state
            .specs
            .retain(|s| !(s.application_id == spec.application_id && s.component == spec.component));
        state.specs.push(spec.clone());
        for row in rows {
            state.upsert_authorization(row);
        }
        Ok(written)
    }

    async fn ping(&self) -> Result<(), AuthzError> {
        self.state().map(|_| ())
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn list_cases(
        &self,
        filter: &QueryFilter,
        case_type: Option<&TypeRef>,
        page: Page,
    ) -> Result<(Vec<Case>, u64), AuthzError> {
        let state = self.state()?;
        let visible = state
            .cases
            .iter()
            .filter(|c| filter.matches(*c))
            .filter(|c| case_type.map_or(true, |t| c.case_type == *t))
            .collect();
        Ok(paginate(visible, page))
    }

    async fn get_case(&self, case_id: Uuid) -> Result<Option<Case>, AuthzError> {
        Ok(self
            .state()?
            .cases
            .iter()
            .find(|c| c.case_id == case_id)
            .cloned())
    }

    async fn create_case(&self, new: &NewCase) -> Result<Case, AuthzError> {
        let mut state = self.state()?;
        if let TypeRef::Local(type_id) = &new.case_type {
            if !state.resource_types.contains_key(type_id) {
                return Err(AuthzError::Validation(format!(
                    "Case type {} does not exist",
                    type_id
                )));
            }
        }
        let case = Case {
            case_id: Uuid::new_v4(),
            identification: new.identification.clone(),
            case_type: new.case_type.clone(),
            confidentiality: new.confidentiality,
            end_date: None,
            created_utc: Utc::now(),
        };
        state.cases.push(case.clone());
        Ok(case)
    }

    async fn update_case(
        &self,
        case_id: Uuid,
        patch: &CasePatch,
        check: CaseCheck<'_>,
    ) -> Result<Case, AuthzError> {
        let mut state = self.state()?;
        let case = state.case_mut(case_id)?;
        check(case)?;
        patch.apply(case);
        Ok(case.clone())
    }

    async fn delete_case(&self, case_id: Uuid, check: CaseCheck<'_>) -> Result<(), AuthzError> {
        let mut state = self.state()?;
        check(state.case_mut(case_id)?)?;
        state.cases.retain(|c| c.case_id != case_id);
        state.statuses.retain(|s| s.case_id != case_id);
        Ok(())
    }

    async fn list_statuses(
        &self,
        filter: &QueryFilter,
        case_id: Option<Uuid>,
        page: Page,
    ) -> Result<(Vec<CaseStatus>, u64), AuthzError> {
        let state = self.state()?;
        let visible = state
            .statuses
            .iter()
            .filter(|s| case_id.map_or(true, |id| s.case_id == id))
            .filter(|s| {
                state
                    .cases
                    .iter()
                    .find(|c| c.case_id == s.case_id)
                    .map_or(false, |c| filter.matches(c))
            })
            .collect();
        Ok(paginate(visible, page))
    }

    async fn get_status(&self, status_id: Uuid) -> Result<Option<CaseStatus>, AuthzError> {
        Ok(self
            .state()?
            .statuses
            .iter()
            .find(|s| s.status_id == status_id)
            .cloned())
    }

    async fn add_status(
        &self,
        new: &NewCaseStatus,
        check: StatusCheck<'_>,
    ) -> Result<CaseStatus, AuthzError> {
        let mut state = self.state()?;
        let has_statuses = state.statuses.iter().any(|s| s.case_id == new.case_id);
        let now = Utc::now();
        let case = state.case_mut(new.case_id)?;
        check(case, has_statuses)?;
        case.end_date = new.is_final.then_some(now);

        let status = CaseStatus {
            status_id: Uuid::new_v4(),
            case_id: new.case_id,
            status_type_url: new.status_type_url.clone(),
            is_final: new.is_final,
            set_utc: now,
        };
        state.statuses.push(status.clone());
        Ok(status)
    }
}
