//! Domain models for authz-service.

mod application;
mod authorization;
mod case;
mod component;
mod confidentiality;
mod resource;

pub use application::{Application, Credential};
pub use authorization::{Authorization, AuthorizationSpec, CatalogueAuthorization};
pub use case::{Case, CasePatch, CaseStatus, NewCase, NewCaseStatus};
pub use component::Component;
pub use confidentiality::Confidentiality;
pub use resource::{
    NewResourceType, ProtectedResource, ResourceColumns, ResourceType, TypeRef, CASE_COLUMNS,
};
