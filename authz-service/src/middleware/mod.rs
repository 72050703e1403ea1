pub mod auth;
pub mod problem;

pub use auth::{auth_middleware, Caller};
pub use problem::method_not_allowed_middleware;
