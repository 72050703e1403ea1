use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use super::policies::CASES;
use super::{page_of, PageResponse};
use crate::middleware::Caller;
use crate::models::{
    Case, CasePatch, Component, Confidentiality, NewCase, TypeRef, CASE_COLUMNS,
};
use crate::services::{Action, ActionPermit, AuthzError};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CaseResponse {
    pub case_id: Uuid,
    pub identification: String,
    pub case_type: String,
    pub confidentiality: Confidentiality,
    pub end_date: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl CaseResponse {
    fn new(state: &AppState, case: Case) -> Self {
        Self {
            case_type: state.references.render(Component::Cases, &case.case_type),
            case_id: case.case_id,
            identification: case.identification,
            confidentiality: case.confidentiality,
            end_date: case.end_date,
            created_utc: case.created_utc,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CaseListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub case_type: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCaseRequest {
    #[validate(length(min = 1, max = 40, message = "identification must be 1-40 characters"))]
    pub identification: String,
    #[validate(url(message = "case_type must be an absolute URL"))]
    pub case_type: String,
    pub confidentiality: Confidentiality,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCaseRequest {
    #[validate(length(min = 1, max = 40, message = "identification must be 1-40 characters"))]
    pub identification: String,
    pub confidentiality: Confidentiality,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PatchCaseRequest {
    #[validate(length(min = 1, max = 40, message = "identification must be 1-40 characters"))]
    pub identification: Option<String>,
    pub confidentiality: Option<Confidentiality>,
}

/// Map a client supplied case type URL onto a stored reference. Local types
/// must exist and belong to the cases component.
async fn resolve_case_type(
    state: &AppState,
    caller: &Caller,
    case_type: &str,
) -> Result<TypeRef, AppError> {
    let type_ref = state
        .references
        .to_type_ref(Component::Cases, case_type)
        .ok_or_else(|| {
            AuthzError::Validation(format!("'{}' is not a case type reference", case_type))
        })?;
    if let TypeRef::Local(type_id) = &type_ref {
        let known = state
            .registry
            .resource_type(*type_id, &caller.deadline)
            .await?
            .is_some_and(|t| t.component == Component::Cases);
        if !known {
            return Err(AuthzError::Validation(format!("Case type {} does not exist", type_id)).into());
        }
    }
    Ok(type_ref)
}

async fn permit(state: &AppState, caller: &Caller, action: Action) -> Result<ActionPermit, AppError> {
    Ok(state
        .gate
        .authorize(&caller.identity, &CASES, action, &caller.deadline)
        .await?)
}

pub async fn list_cases(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<CaseListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let permit = permit(&state, &caller, Action::List).await?;
    let case_type = match &query.case_type {
        Some(url) => Some(resolve_case_type(&state, &caller, url).await?),
        None => None,
    };
    let page = page_of(query.page, query.page_size);
    let filter = permit.query_filter(CASE_COLUMNS);

    let (cases, count) = caller
        .deadline
        .run(state.cases.list_cases(&filter, case_type.as_ref(), page))
        .await?;

    Ok(Json(PageResponse {
        count,
        page: page.page,
        results: cases
            .into_iter()
            .map(|case| CaseResponse::new(&state, case))
            .collect::<Vec<_>>(),
    }))
}

pub async fn create_case(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateCaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let permit = permit(&state, &caller, Action::Create).await?;
    let case_type = resolve_case_type(&state, &caller, &req.case_type).await?;
    permit.check_create(&case_type, Some(req.confidentiality), CASE_COLUMNS)?;

    let case = caller
        .deadline
        .run(state.cases.create_case(&NewCase {
            identification: req.identification,
            case_type,
            confidentiality: req.confidentiality,
        }))
        .await?;

    tracing::info!(
        case_id = %case.case_id,
        client_id = %caller.identity.client_id,
        "Case created"
    );
    Ok((StatusCode::CREATED, Json(CaseResponse::new(&state, case))))
}

pub async fn get_case(
    State(state): State<AppState>,
    caller: Caller,
    Path(case_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let permit = permit(&state, &caller, Action::Read).await?;
    let case = caller
        .deadline
        .run(state.cases.get_case(case_id))
        .await?
        .ok_or_else(|| AuthzError::NotFound(format!("Case {}", case_id)))?;
    permit.check_object(&case, CASE_COLUMNS)?;
    Ok(Json(CaseResponse::new(&state, case)))
}

async fn apply_patch(
    state: &AppState,
    caller: &Caller,
    action: Action,
    case_id: Uuid,
    patch: CasePatch,
) -> Result<Json<CaseResponse>, AppError> {
    let permit = permit(state, caller, action).await?;
    let check = |case: &Case| {
        permit.check_mutation(case, CASE_COLUMNS)?;
        // the changed case must stay within what the caller may see
        let mut next = case.clone();
        patch.apply(&mut next);
        permit.check_object(&next, CASE_COLUMNS)
    };

    let case = caller
        .deadline
        .run(state.cases.update_case(case_id, &patch, &check))
        .await?;
    tracing::info!(case_id = %case_id, action = action.as_str(), "Case updated");
    Ok(Json(CaseResponse::new(state, case)))
}

pub async fn update_case(
    State(state): State<AppState>,
    caller: Caller,
    Path(case_id): Path<Uuid>,
    Json(req): Json<UpdateCaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let patch = CasePatch {
        identification: Some(req.identification),
        confidentiality: Some(req.confidentiality),
    };
    apply_patch(&state, &caller, Action::Update, case_id, patch).await
}

pub async fn partial_update_case(
    State(state): State<AppState>,
    caller: Caller,
    Path(case_id): Path<Uuid>,
    Json(req): Json<PatchCaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let patch = CasePatch {
        identification: req.identification,
        confidentiality: req.confidentiality,
    };
    apply_patch(&state, &caller, Action::PartialUpdate, case_id, patch).await
}

pub async fn delete_case(
    State(state): State<AppState>,
    caller: Caller,
    Path(case_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let permit = permit(&state, &caller, Action::Destroy).await?;
    let check = |case: &Case| permit.check_mutation(case, CASE_COLUMNS);
    caller
        .deadline
        .run(state.cases.delete_case(case_id, &check))
        .await?;
    tracing::info!(case_id = %case_id, "Case deleted");
    Ok(StatusCode::NO_CONTENT)
}
