//! Scope identifiers issued by the registry and the composite requirements
//! of each endpoint, compiled once per process.

use once_cell::sync::Lazy;

use super::Scope;

pub const CASES_READ: &str = "cases.read";
pub const CASES_CREATE: &str = "cases.create";
pub const CASES_UPDATE: &str = "cases.update";
pub const CASES_FORCE_UPDATE: &str = "cases.force_update";
pub const CASES_ADD_STATUS: &str = "cases.add_status";
pub const CASES_REOPEN: &str = "cases.reopen";
pub const CASES_DELETE: &str = "cases.delete";

pub const AUTHORIZATIONS_READ: &str = "authorizations.read";
pub const AUTHORIZATIONS_WRITE: &str = "authorizations.write";

pub static CASE_READ: Lazy<Scope> = Lazy::new(|| Scope::leaf(CASES_READ));
pub static CASE_CREATE: Lazy<Scope> = Lazy::new(|| Scope::leaf(CASES_CREATE));
pub static CASE_UPDATE: Lazy<Scope> =
    Lazy::new(|| Scope::leaf(CASES_UPDATE) | Scope::leaf(CASES_FORCE_UPDATE));
pub static CASE_DELETE: Lazy<Scope> = Lazy::new(|| Scope::leaf(CASES_DELETE));

pub static STATUS_CREATE: Lazy<Scope> = Lazy::new(|| {
    Scope::leaf(CASES_CREATE) | Scope::leaf(CASES_ADD_STATUS) | Scope::leaf(CASES_REOPEN)
});
pub static STATUS_ADD: Lazy<Scope> =
    Lazy::new(|| Scope::leaf(CASES_ADD_STATUS) | Scope::leaf(CASES_REOPEN));
pub static CASE_REOPEN: Lazy<Scope> = Lazy::new(|| Scope::leaf(CASES_REOPEN));

pub static REGISTRY_READ: Lazy<Scope> = Lazy::new(|| Scope::leaf(AUTHORIZATIONS_READ));
pub static REGISTRY_WRITE: Lazy<Scope> = Lazy::new(|| Scope::leaf(AUTHORIZATIONS_WRITE));
