//! Common utilities for authz-service integration tests.
//!
//! Tests drive the router in-process with `oneshot` over the in-memory store.

#![allow(dead_code)]

use authz_service::config::AuthzConfig;
use authz_service::models::{
    Application, Authorization, Case, Component, Confidentiality, Credential, NewCase,
    NewCaseStatus, NewResourceType, TypeRef,
};
use authz_service::services::{CaseStore, Deadline, MemoryStore, TokenClaims};
use authz_service::{build_router, AppState};
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use service_core::config::Config as CommonConfig;
use std::collections::HashMap;
use std::sync::{Arc, Once};
use tower::ServiceExt;
use uuid::Uuid;

static INIT: Once = Once::new();

pub const LOCAL_BASE: &str = "https://local";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,authz_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn test_config(overrides: &[(&str, &str)]) -> AuthzConfig {
    let mut vars: HashMap<String, String> = [
        ("STORAGE_BACKEND", "memory"),
        ("ALLOWED_HOSTS", "local"),
        ("LOCAL_BASE_URL", LOCAL_BASE),
        ("SERVICE_NAME", "authz-service-test"),
        ("SERVICE_VERSION", "test"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    AuthzConfig::from_source(CommonConfig::default(), |key| vars.get(key).cloned())
        .expect("test configuration is valid")
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(&[])
}

pub fn spawn_app_with(overrides: &[(&str, &str)]) -> TestApp {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(
        test_config(overrides),
        store.clone(),
        store.clone(),
        service_core::observability::init_metrics(),
    );
    TestApp {
        router: build_router(state.clone()),
        state,
        store,
    }
}

/// One authorization row to seed: component, scopes, type URL, ceiling.
pub struct Grant<'a> {
    pub component: Component,
    pub scopes: &'a [&'a str],
    pub type_url: String,
    pub max_confidentiality: Option<Confidentiality>,
}

impl<'a> Grant<'a> {
    pub fn cases(scopes: &'a [&'a str], type_url: &str, ceiling: Confidentiality) -> Self {
        Self {
            component: Component::Cases,
            scopes,
            type_url: type_url.to_string(),
            max_confidentiality: Some(ceiling),
        }
    }

    pub fn meta(scopes: &'a [&'a str]) -> Self {
        Self {
            component: Component::Meta,
            scopes,
            type_url: String::new(),
            max_confidentiality: None,
        }
    }
}

pub fn mint(claims: &TokenClaims, alg: Algorithm, secret: &str) -> String {
    encode(
        &Header::new(alg),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token encodes")
}

pub fn claims_for(client_id: &str) -> TokenClaims {
    TokenClaims {
        iss: client_id.to_string(),
        iat: Utc::now().timestamp() as f64,
        client_id: client_id.to_string(),
        user_id: "tester".to_string(),
        user_representation: "Test User".to_string(),
    }
}

pub fn token_for(client_id: &str, secret: &str) -> String {
    mint(&claims_for(client_id), Algorithm::HS256, secret)
}

impl TestApp {
    /// Register a credential only, with no application behind it.
    pub async fn register_credential(&self, client_id: &str, secret: &str) {
        self.state
            .registry
            .save_credential(
                &Credential {
                    client_id: client_id.to_string(),
                    secret: secret.to_string(),
                },
                &Deadline::default(),
            )
            .await
            .expect("credential saved");
    }

    /// Register a credential plus an application and return a valid token.
    pub async fn register_client(
        &self,
        client_id: &str,
        unrestricted: bool,
        grants: &[Grant<'_>],
    ) -> (Application, String) {
        let secret = format!("{}-secret", client_id);
        self.register_credential(client_id, &secret).await;

        let application = Application {
            application_id: Uuid::new_v4(),
            client_ids: vec![client_id.to_string()],
            label: format!("{} application", client_id),
            unrestricted,
            created_utc: Utc::now(),
        };
        let rows: Vec<Authorization> = grants
            .iter()
            .map(|g| Authorization {
                authorization_id: Uuid::new_v4(),
                application_id: application.application_id,
                component: g.component,
                scopes: g.scopes.iter().map(|s| s.to_string()).collect(),
                type_url: g.type_url.clone(),
                max_confidentiality: g.max_confidentiality,
            })
            .collect();
        self.state
            .registry
            .save_application(&application, &rows, &Deadline::default())
            .await
            .expect("application saved");

        (application, token_for(client_id, &secret))
    }

    /// Create a local case type and return its id and canonical URL.
    pub async fn case_type(&self, identification: &str) -> (Uuid, String) {
        self.case_type_in(identification, None).await
    }

    pub async fn case_type_in(
        &self,
        identification: &str,
        catalogue_id: Option<Uuid>,
    ) -> (Uuid, String) {
        let resource_type = self
            .state
            .registry
            .create_resource_type(
                &NewResourceType {
                    component: Component::Cases,
                    catalogue_id,
                    identification: identification.to_string(),
                },
                &Deadline::default(),
            )
            .await
            .expect("resource type created");
        let url = self
            .state
            .references
            .local_type_url(Component::Cases, resource_type.type_id)
            .expect("cases have a type collection");
        (resource_type.type_id, url)
    }

    pub async fn seed_case(&self, case_type: TypeRef, confidentiality: Confidentiality) -> Case {
        self.store
            .create_case(&NewCase {
                identification: format!("ZAAK-{}", &Uuid::new_v4().simple().to_string()[..8]),
                case_type,
                confidentiality,
            })
            .await
            .expect("case created")
    }

    pub async fn close_case(&self, case_id: Uuid) {
        self.store
            .add_status(
                &NewCaseStatus {
                    case_id,
                    status_type_url: "https://catalogue.example/status-types/closed".into(),
                    is_final: true,
                },
                &|_, _| Ok(()),
            )
            .await
            .expect("final status added");
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        send_to(&self.router, method, uri, token, body).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.send(Method::GET, uri, Some(token), None).await
    }
}

/// Drive one request through a router and collect the JSON answer.
pub async fn send_to(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request builds");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router answers");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body reads")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }

    /// Ids of the `results` of a list response.
    pub fn result_ids(&self, field: &str) -> Vec<String> {
        let mut ids: Vec<String> = self.body["results"]
            .as_array()
            .expect("list response")
            .iter()
            .map(|r| r[field].as_str().unwrap_or_default().to_string())
            .collect();
        ids.sort();
        ids
    }
}

pub fn sorted_ids(cases: &[&Case]) -> Vec<String> {
    let mut ids: Vec<String> = cases.iter().map(|c| c.case_id.to_string()).collect();
    ids.sort();
    ids
}
