use axum::Router;
use service_core::error::AppError;
use service_core::observability::init_metrics;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::{AuthzConfig, StorageBackend};
use crate::services::{CaseStore, Database, MemoryStore, RegistryStore};
use crate::{build_router, AppState};

/// Registry and case storage selected by configuration.
pub async fn connect_stores(
    config: &AuthzConfig,
) -> Result<(Arc<dyn RegistryStore>, Arc<dyn CaseStore>), AppError> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; nothing survives a restart");
            let store = Arc::new(MemoryStore::new());
            let registry: Arc<dyn RegistryStore> = store.clone();
            let cases: Arc<dyn CaseStore> = store;
            Ok((registry, cases))
        }
        StorageBackend::Postgres => {
            let url = config.storage.database_url.as_deref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required for postgres"))
            })?;
            let db = Database::new(
                url,
                config.storage.max_connections,
                config.storage.min_connections,
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to PostgreSQL: {}", e);
                e
            })?;
            db.run_migrations().await?;
            let db = Arc::new(db);
            let registry: Arc<dyn RegistryStore> = db.clone();
            let cases: Arc<dyn CaseStore> = db;
            Ok((registry, cases))
        }
    }
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    pub async fn build(config: AuthzConfig) -> Result<Self, AppError> {
        let (registry_store, case_store) = connect_stores(&config).await?;
        let state = AppState::new(config.clone(), registry_store, case_store, init_metrics());
        let router = build_router(state.clone());

        let addr: SocketAddr = config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, "Listening");

        Ok(Self {
            port,
            listener,
            router,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
