use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use super::policies::STATUSES;
use super::{page_of, PageResponse};
use crate::middleware::Caller;
use crate::models::{Case, CaseStatus, NewCaseStatus, CASE_COLUMNS};
use crate::services::database::STATUS_CASE_ALIAS;
use crate::services::{Action, AuthzError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusListQuery {
    pub case: Option<Uuid>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStatusRequest {
    pub case: Uuid,
    #[validate(url(message = "status_type must be an absolute URL"))]
    pub status_type: String,
    #[serde(default)]
    pub is_final: bool,
}

pub async fn list_statuses(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<StatusListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let permit = state
        .gate
        .authorize(&caller.identity, &STATUSES, Action::List, &caller.deadline)
        .await?;
    let filter = permit
        .query_filter(CASE_COLUMNS)
        .with_join_prefix(STATUS_CASE_ALIAS);
    let page = page_of(query.page, query.page_size);

    let (statuses, count) = caller
        .deadline
        .run(state.cases.list_statuses(&filter, query.case, page))
        .await?;

    Ok(Json(PageResponse {
        count,
        page: page.page,
        results: statuses,
    }))
}

pub async fn get_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(status_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let permit = state
        .gate
        .authorize(&caller.identity, &STATUSES, Action::Read, &caller.deadline)
        .await?;
    let (status, case) = caller
        .deadline
        .run(async {
            let status = state
                .cases
                .get_status(status_id)
                .await?
                .ok_or_else(|| AuthzError::NotFound(format!("Status {}", status_id)))?;
            let case = state
                .cases
                .get_case(status.case_id)
                .await?
                .ok_or_else(|| AuthzError::NotFound(format!("Case {}", status.case_id)))?;
            Ok::<_, AuthzError>((status, case))
        })
        .await?;

    permit.check_object(&case, CASE_COLUMNS)?;
    Ok(Json::<CaseStatus>(status))
}

pub async fn create_status(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let permit = state
        .gate
        .authorize(&caller.identity, &STATUSES, Action::Create, &caller.deadline)
        .await?;
    let check = |case: &Case, has_statuses: bool| {
        permit.check_status_create(case, has_statuses, CASE_COLUMNS)
    };

    let status = caller
        .deadline
        .run(state.cases.add_status(
            &NewCaseStatus {
                case_id: req.case,
                status_type_url: req.status_type,
                is_final: req.is_final,
            },
            &check,
        ))
        .await?;

    tracing::info!(
        case_id = %status.case_id,
        status_id = %status.status_id,
        is_final = status.is_final,
        "Case status set"
    );
    Ok((StatusCode::CREATED, Json(status)))
}
