//! Services layer for authz-service.
//!
//! Token verification, registry access, authorization resolution, query
//! filtering and the action gate, plus the storage adapters behind them.

pub mod cache;
pub mod cases;
mod credentials;
pub mod database;
mod deadline;
pub mod error;
pub mod gate;
pub mod memory;
pub mod metrics;
pub mod query;
pub mod references;
pub mod registry;
mod resolver;
mod token;

pub use cases::{CaseStore, Page};
pub use credentials::CredentialStore;
pub use database::Database;
pub use deadline::Deadline;
pub use error::AuthzError;
pub use gate::{Action, ActionGate, ActionPermit, EndpointPolicy};
pub use memory::MemoryStore;
pub use query::{QueryAuthorizer, QueryFilter, SqlPredicate, TypeMatch};
pub use references::{HostAllowList, ReferenceResolver};
pub use registry::{AuthorizationRegistry, RegistryStore};
pub use resolver::{AuthContext, AuthorizationResolver};
pub use token::{TokenClaims, TokenVerifier, VerifiedIdentity};
