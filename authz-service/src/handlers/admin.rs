//! Registry administration: applications, credentials and the grants that
//! produce authorization rows.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::BTreeSet;
use uuid::Uuid;
use validator::Validate;

use super::policies::REGISTRY;
use crate::middleware::Caller;
use crate::models::{
    Application, Authorization, AuthorizationSpec, CatalogueAuthorization, Component,
    Confidentiality, Credential, NewResourceType, ResourceType,
};
use crate::services::{Action, ActionPermit};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthorizationRequest {
    pub component: Component,
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub type_url: String,
    pub max_confidentiality: Option<Confidentiality>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplicationRequest {
    #[validate(length(min = 1, max = 100, message = "label must be 1-100 characters"))]
    pub label: String,
    #[validate(length(min = 1, message = "at least one client_id is required"))]
    pub client_ids: Vec<String>,
    #[serde(default)]
    pub unrestricted: bool,
    #[serde(default)]
    pub authorizations: Vec<AuthorizationRequest>,
}

impl ApplicationRequest {
    fn into_records(
        self,
        application_id: Uuid,
        created_utc: DateTime<Utc>,
    ) -> (Application, Vec<Authorization>) {
        let rows = self
            .authorizations
            .into_iter()
            .map(|a| Authorization {
                authorization_id: Uuid::new_v4(),
                application_id,
                component: a.component,
                scopes: a.scopes,
                type_url: a.type_url,
                max_confidentiality: a.max_confidentiality,
            })
            .collect();
        let application = Application {
            application_id,
            client_ids: self.client_ids,
            label: self.label,
            unrestricted: self.unrestricted,
            created_utc,
        };
        (application, rows)
    }
}

#[derive(Debug, Serialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    pub authorizations: Vec<Authorization>,
}

#[derive(Debug, Serialize)]
pub struct SpecResponse {
    pub rows_written: usize,
}

#[derive(Debug, Serialize)]
pub struct ResourceTypeResponse {
    #[serde(flatten)]
    pub resource_type: ResourceType,
    pub url: Option<String>,
}

async fn permit(state: &AppState, caller: &Caller, action: Action) -> Result<ActionPermit, AppError> {
    Ok(state
        .gate
        .authorize(&caller.identity, &REGISTRY, action, &caller.deadline)
        .await?)
}

pub async fn list_applications(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    permit(&state, &caller, Action::List).await?;
    let applications = state.registry.list_applications(&caller.deadline).await?;
    Ok(Json(applications))
}

pub async fn create_application(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<ApplicationRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    permit(&state, &caller, Action::Create).await?;

    let (application, rows) = req.into_records(Uuid::new_v4(), Utc::now());
    state
        .registry
        .save_application(&application, &rows, &caller.deadline)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApplicationDetail {
            application,
            authorizations: rows,
        }),
    ))
}

pub async fn get_application(
    State(state): State<AppState>,
    caller: Caller,
    Path(application_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    permit(&state, &caller, Action::Read).await?;
    let (application, authorizations) = state
        .registry
        .application_detail(application_id, &caller.deadline)
        .await?;
    Ok(Json(ApplicationDetail {
        application,
        authorizations,
    }))
}

/// Replace an application and its authorization rows.
pub async fn update_application(
    State(state): State<AppState>,
    caller: Caller,
    Path(application_id): Path<Uuid>,
    Json(req): Json<ApplicationRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    permit(&state, &caller, Action::Update).await?;

    let (current, _) = state
        .registry
        .application_detail(application_id, &caller.deadline)
        .await?;
    let (application, rows) = req.into_records(application_id, current.created_utc);
    state
        .registry
        .save_application(&application, &rows, &caller.deadline)
        .await?;

    Ok(Json(ApplicationDetail {
        application,
        authorizations: rows,
    }))
}

pub async fn delete_application(
    State(state): State<AppState>,
    caller: Caller,
    Path(application_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    permit(&state, &caller, Action::Destroy).await?;
    state
        .registry
        .delete_application(application_id, &caller.deadline)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn save_credential(
    State(state): State<AppState>,
    caller: Caller,
    Json(credential): Json<Credential>,
) -> Result<impl IntoResponse, AppError> {
    permit(&state, &caller, Action::Update).await?;
    state
        .registry
        .save_credential(&credential, &caller.deadline)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_credential(
    State(state): State<AppState>,
    caller: Caller,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    permit(&state, &caller, Action::Destroy).await?;
    state
        .registry
        .delete_credential(&client_id, &caller.deadline)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn save_authorization_spec(
    State(state): State<AppState>,
    caller: Caller,
    Json(spec): Json<AuthorizationSpec>,
) -> Result<impl IntoResponse, AppError> {
    permit(&state, &caller, Action::Update).await?;
    let rows_written = state
        .registry
        .save_authorization_spec(&spec, &caller.deadline)
        .await?;
    Ok(Json(SpecResponse { rows_written }))
}

pub async fn save_catalogue_authorization(
    State(state): State<AppState>,
    caller: Caller,
    Json(grant): Json<CatalogueAuthorization>,
) -> Result<impl IntoResponse, AppError> {
    permit(&state, &caller, Action::Update).await?;
    state
        .registry
        .save_catalogue_authorization(&grant, &caller.deadline)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_resource_type(
    State(state): State<AppState>,
    caller: Caller,
    Json(input): Json<NewResourceType>,
) -> Result<impl IntoResponse, AppError> {
    permit(&state, &caller, Action::Create).await?;
    let resource_type = state
        .registry
        .create_resource_type(&input, &caller.deadline)
        .await?;
    let url = state
        .references
        .local_type_url(resource_type.component, resource_type.type_id);

    Ok((
        StatusCode::CREATED,
        Json(ResourceTypeResponse {
            resource_type,
            url,
        }),
    ))
}
