use crate::{
    config::ServerConfig,
    coordinator::CoordinatorLifecycle,
    error::{Result, StagehandError},
    routing::RouteGate,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use super::handlers::{
    check_handler, health_handler, route_handler, snapshot_handler, stop_handler, wake_handler,
};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ApiState {
    pub(crate) lifecycle: Arc<CoordinatorLifecycle>,
    pub(crate) gate: Arc<RouteGate>,
}

impl ApiState {
    pub fn new(lifecycle: Arc<CoordinatorLifecycle>, gate: RouteGate) -> Self {
        Self {
            lifecycle,
            gate: Arc::new(gate),
        }
    }
}

/// Routes served to the browser panel
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/coordinator", get(snapshot_handler))
        .route("/api/coordinator/check", post(check_handler))
        .route("/api/coordinator/wake", post(wake_handler))
        .route("/api/coordinator/stop", post(stop_handler))
        .route("/api/route", get(route_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Local HTTP API over a coordinator lifecycle
pub struct ApiServer {
    config: ServerConfig,
    state: ApiState,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: ApiState) -> Self {
        Self { config, state }
    }

    pub fn builder() -> ApiServerBuilder {
        ApiServerBuilder::new()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = self.address();
        TcpListener::bind(&address)
            .await
            .map_err(|source| StagehandError::Bind { address, source })
    }

    /// Serve on an already bound listener until `shutdown` is cancelled
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!("Coordinator API listening on {}", local_addr);

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| StagehandError::system(format!("API server error: {}", e)))?;

        info!("Coordinator API on {} stopped", local_addr);
        Ok(())
    }

    /// Bind and serve
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }
}

/// Builder for [`ApiServer`]
pub struct ApiServerBuilder {
    config: Option<ServerConfig>,
    lifecycle: Option<Arc<CoordinatorLifecycle>>,
    gate: Option<RouteGate>,
}

impl ApiServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            lifecycle: None,
            gate: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn lifecycle(mut self, lifecycle: Arc<CoordinatorLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Route gate; defaults to the built-in prefix table
    pub fn gate(mut self, gate: RouteGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn build(self) -> Result<ApiServer> {
        let lifecycle = self
            .lifecycle
            .ok_or_else(|| StagehandError::system("Coordinator lifecycle is required"))?;

        Ok(ApiServer::new(
            self.config.unwrap_or_default(),
            ApiState::new(lifecycle, self.gate.unwrap_or_default()),
        ))
    }
}

impl Default for ApiServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
