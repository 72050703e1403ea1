use async_trait::async_trait;
use uuid::Uuid;

use super::query::QueryFilter;
use super::AuthzError;
use crate::models::{Case, CasePatch, CaseStatus, NewCase, NewCaseStatus, TypeRef};

/// Check run against the current case inside the mutation's transaction.
pub type CaseCheck<'a> = &'a (dyn Fn(&Case) -> Result<(), AuthzError> + Send + Sync);

/// Check run before a status is added; the flag tells whether the case
/// already has statuses.
pub type StatusCheck<'a> = &'a (dyn Fn(&Case, bool) -> Result<(), AuthzError> + Send + Sync);

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 500;

/// One-based page of a list result.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size.clamp(1, MAX_PAGE_SIZE))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * self.limit()
    }
}

/// Storage for cases and their statuses. List queries take the caller's
/// [`QueryFilter`] and must apply it before paginating.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn list_cases(
        &self,
        filter: &QueryFilter,
        case_type: Option<&TypeRef>,
        page: Page,
    ) -> Result<(Vec<Case>, u64), AuthzError>;

    async fn get_case(&self, case_id: Uuid) -> Result<Option<Case>, AuthzError>;

    async fn create_case(&self, new: &NewCase) -> Result<Case, AuthzError>;

    async fn update_case(
        &self,
        case_id: Uuid,
        patch: &CasePatch,
        check: CaseCheck<'_>,
    ) -> Result<Case, AuthzError>;

    async fn delete_case(&self, case_id: Uuid, check: CaseCheck<'_>) -> Result<(), AuthzError>;

    /// Statuses whose case passes `filter`.
    async fn list_statuses(
        &self,
        filter: &QueryFilter,
        case_id: Option<Uuid>,
        page: Page,
    ) -> Result<(Vec<CaseStatus>, u64), AuthzError>;

    async fn get_status(&self, status_id: Uuid) -> Result<Option<CaseStatus>, AuthzError>;

    /// Add a status; a final one closes the case, a non-final one on a closed
    /// case re-opens it.
    async fn add_status(
        &self,
        new: &NewCaseStatus,
        check: StatusCheck<'_>,
    ) -> Result<CaseStatus, AuthzError>;
}
