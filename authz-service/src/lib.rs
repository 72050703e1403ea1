//! Authorization and scope enforcement for the case registry APIs.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod scopes;
pub mod services;
pub mod startup;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::AuthzConfig;
use crate::services::{
    ActionGate, AuthorizationRegistry, AuthorizationResolver, CaseStore, ReferenceResolver,
    RegistryStore, TokenVerifier,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AuthzConfig,
    pub registry: Arc<AuthorizationRegistry>,
    pub gate: ActionGate,
    pub cases: Arc<dyn CaseStore>,
    pub references: ReferenceResolver,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Wire the registry, the token verifier and the gate over the given
    /// stores.
    pub fn new(
        config: AuthzConfig,
        registry_store: Arc<dyn RegistryStore>,
        cases: Arc<dyn CaseStore>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let references = ReferenceResolver::new(
            config.references.allowed_hosts.clone(),
            &config.references.local_base_url,
        );
        let registry = Arc::new(AuthorizationRegistry::new(
            registry_store,
            references.clone(),
            config.cache.ttl,
            config.cache.max_entries,
        ));
        let gate = ActionGate::new(
            TokenVerifier::new(registry.clone()),
            AuthorizationResolver::new(registry.clone()),
            references.clone(),
        );

        Self {
            config,
            registry,
            gate,
            cases,
            references,
            metrics_handle,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    use handlers::{admin, cases, statuses};

    let protected = Router::new()
        .route("/cases", get(cases::list_cases).post(cases::create_case))
        .route(
            "/cases/:case_id",
            get(cases::get_case)
                .put(cases::update_case)
                .patch(cases::partial_update_case)
                .delete(cases::delete_case),
        )
        .route(
            "/statuses",
            get(statuses::list_statuses).post(statuses::create_status),
        )
        .route("/statuses/:status_id", get(statuses::get_status))
        .route(
            "/admin/applications",
            get(admin::list_applications).post(admin::create_application),
        )
        .route(
            "/admin/applications/:application_id",
            get(admin::get_application)
                .put(admin::update_application)
                .delete(admin::delete_application),
        )
        .route("/admin/credentials", put(admin::save_credential))
        .route(
            "/admin/credentials/:client_id",
            delete(admin::delete_credential),
        )
        .route(
            "/admin/authorization-specs",
            put(admin::save_authorization_spec),
        )
        .route(
            "/admin/catalogue-authorizations",
            put(admin::save_catalogue_authorization),
        )
        .route("/admin/resource-types", post(admin::create_resource_type))
        // route_layer keeps 405 answers ahead of authentication
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .merge(protected)
        .fallback(|| async { AppError::NotFound(anyhow::anyhow!("No such endpoint")) })
        .with_state(state)
        .layer(from_fn(middleware::method_not_allowed_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    client_id = tracing::field::Empty,
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}
