use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use super::Database;
use crate::models::{
    Case, CasePatch, CaseStatus, Confidentiality, NewCase, NewCaseStatus, TypeRef,
};
use crate::services::cases::{CaseCheck, CaseStore, Page, StatusCheck};
use crate::services::metrics::QueryTimer;
use crate::services::query::QueryFilter;
use crate::services::AuthzError;

/// Alias the statuses query gives the joined cases table.
pub const STATUS_CASE_ALIAS: &str = "case";

const CASE_COLUMNS: &str =
    "case_id, identification, case_type_id, case_type_url, confidentiality, end_date, created_utc";

#[derive(FromRow)]
struct CaseRow {
    case_id: Uuid,
    identification: String,
    case_type_id: Option<Uuid>,
    case_type_url: Option<String>,
    confidentiality: Confidentiality,
    end_date: Option<DateTime<Utc>>,
    created_utc: DateTime<Utc>,
}

impl TryFrom<CaseRow> for Case {
    type Error = AuthzError;

    fn try_from(row: CaseRow) -> Result<Self, Self::Error> {
        let case_type = TypeRef::from_columns(row.case_type_id, row.case_type_url).ok_or_else(
            || {
                AuthzError::Storage(anyhow::anyhow!(
                    "case {} must have exactly one case type column set",
                    row.case_id
                ))
            },
        )?;
        Ok(Case {
            case_id: row.case_id,
            identification: row.identification,
            case_type,
            confidentiality: row.confidentiality,
            end_date: row.end_date,
            created_utc: row.created_utc,
        })
    }
}

fn push_case_conditions(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &QueryFilter,
    case_type: Option<&TypeRef>,
) {
    qb.push(" WHERE ");
    filter.push_sql(qb);
    match case_type {
        Some(TypeRef::Local(id)) => {
            qb.push(" AND case_type_id = ").push_bind(*id);
        }
        Some(TypeRef::External(url)) => {
            qb.push(" AND case_type_url = ").push_bind(url.clone());
        }
        None => {}
    }
}

fn push_status_conditions(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &QueryFilter,
    case_id: Option<Uuid>,
) {
    filter.push_sql(qb);
    if let Some(case_id) = case_id {
        qb.push(" AND s.case_id = ").push_bind(case_id);
    }
}

async fn lock_case(conn: &mut PgConnection, case_id: Uuid) -> Result<Case, AuthzError> {
    let row = sqlx::query_as::<_, CaseRow>(&format!(
        "SELECT {} FROM cases WHERE case_id = $1 FOR UPDATE",
        CASE_COLUMNS
    ))
    .bind(case_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AuthzError::NotFound(format!("Case {}", case_id)))?;
    Case::try_from(row)
}

#[async_trait]
impl CaseStore for Database {
    #[instrument(skip(self, filter))]
    async fn list_cases(
        &self,
        filter: &QueryFilter,
        case_type: Option<&TypeRef>,
        page: Page,
    ) -> Result<(Vec<Case>, u64), AuthzError> {
        let _timer = QueryTimer::start("list_cases");

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM cases");
        push_case_conditions(&mut count, filter, case_type);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM cases", CASE_COLUMNS));
        push_case_conditions(&mut qb, filter, case_type);
        qb.push(" ORDER BY created_utc, case_id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = qb.build_query_as::<CaseRow>().fetch_all(&self.pool).await?;

        let cases = rows
            .into_iter()
            .map(Case::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((cases, u64::try_from(total).unwrap_or(0)))
    }

    #[instrument(skip(self))]
    async fn get_case(&self, case_id: Uuid) -> Result<Option<Case>, AuthzError> {
        let _timer = QueryTimer::start("get_case");
        sqlx::query_as::<_, CaseRow>(&format!(
            "SELECT {} FROM cases WHERE case_id = $1",
            CASE_COLUMNS
        ))
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Case::try_from)
        .transpose()
    }

    #[instrument(skip(self, new), fields(identification = %new.identification))]
    async fn create_case(&self, new: &NewCase) -> Result<Case, AuthzError> {
        let _timer = QueryTimer::start("create_case");
        let row = sqlx::query_as::<_, CaseRow>(&format!(
            "INSERT INTO cases ({}) VALUES ($1, $2, $3, $4, $5, NULL, NOW()) RETURNING {}",
            CASE_COLUMNS, CASE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new.identification)
        .bind(new.case_type.local_id())
        .bind(new.case_type.external_url())
        .bind(new.confidentiality)
        .fetch_one(&self.pool)
        .await?;
        Case::try_from(row)
    }

    #[instrument(skip(self, patch, check))]
    async fn update_case(
        &self,
        case_id: Uuid,
        patch: &CasePatch,
        check: CaseCheck<'_>,
    ) -> Result<Case, AuthzError> {
        let _timer = QueryTimer::start("update_case");
        let mut tx = self.pool.begin().await?;

        let mut case = lock_case(&mut tx, case_id).await?;
        check(&case)?;
        patch.apply(&mut case);

        sqlx::query("UPDATE cases SET identification = $2, confidentiality = $3 WHERE case_id = $1")
            .bind(case_id)
            .bind(&case.identification)
            .bind(case.confidentiality)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(case)
    }

    #[instrument(skip(self, check))]
    async fn delete_case(&self, case_id: Uuid, check: CaseCheck<'_>) -> Result<(), AuthzError> {
        let _timer = QueryTimer::start("delete_case");
        let mut tx = self.pool.begin().await?;

        let case = lock_case(&mut tx, case_id).await?;
        check(&case)?;

        sqlx::query("DELETE FROM cases WHERE case_id = $1")
            .bind(case_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, filter))]
    async fn list_statuses(
        &self,
        filter: &QueryFilter,
        case_id: Option<Uuid>,
        page: Page,
    ) -> Result<(Vec<CaseStatus>, u64), AuthzError> {
        let _timer = QueryTimer::start("list_statuses");
        let from = format!(
            " FROM case_statuses s JOIN cases AS \"{alias}\" ON \"{alias}\".case_id = s.case_id WHERE ",
            alias = STATUS_CASE_ALIAS
        );

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT COUNT(*){}", from));
        push_status_conditions(&mut count, filter, case_id);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT s.status_id, s.case_id, s.status_type_url, s.is_final, s.set_utc{}",
            from
        ));
        push_status_conditions(&mut qb, filter, case_id);
        qb.push(" ORDER BY s.set_utc, s.status_id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let statuses = qb
            .build_query_as::<CaseStatus>()
            .fetch_all(&self.pool)
            .await?;

        Ok((statuses, u64::try_from(total).unwrap_or(0)))
    }

    #[instrument(skip(self))]
    async fn get_status(&self, status_id: Uuid) -> Result<Option<CaseStatus>, AuthzError> {
        let status = sqlx::query_as::<_, CaseStatus>(
            "SELECT status_id, case_id, status_type_url, is_final, set_utc \
             FROM case_statuses WHERE status_id = $1",
        )
        .bind(status_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    #[instrument(skip(self, new, check), fields(case_id = %new.case_id, is_final = new.is_final))]
    async fn add_status(
        &self,
        new: &NewCaseStatus,
        check: StatusCheck<'_>,
    ) -> Result<CaseStatus, AuthzError> {
        let _timer = QueryTimer::start("add_status");
        let mut tx = self.pool.begin().await?;

        let case = lock_case(&mut tx, new.case_id).await?;
        let has_statuses = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM case_statuses WHERE case_id = $1)",
        )
        .bind(new.case_id)
        .fetch_one(&mut *tx)
        .await?;
        check(&case, has_statuses)?;

        let status = sqlx::query_as::<_, CaseStatus>(
            r#"
            INSERT INTO case_statuses (status_id, case_id, status_type_url, is_final, set_utc)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING status_id, case_id, status_type_url, is_final, set_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.case_id)
        .bind(&new.status_type_url)
        .bind(new.is_final)
        .fetch_one(&mut *tx)
        .await?;

        let end_date = new.is_final.then_some(status.set_utc);
        sqlx::query("UPDATE cases SET end_date = $2 WHERE case_id = $1")
            .bind(new.case_id)
            .bind(end_date)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(status)
    }
}
