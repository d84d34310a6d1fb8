use std::sync::Arc;

use cask_store::ObjectStore;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::handler::AppState;
use crate::router::build_router;

/// HTTP gateway in front of one object store.
pub struct GatewayServer {
    config: GatewayConfig,
    store: Arc<dyn ObjectStore>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState {
            store: Arc::clone(&self.store),
            config: Arc::new(self.config.clone()),
        })
    }

    /// Start serving requests.
    pub async fn serve(self) -> GatewayResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!("cask gateway listening on {}", self.config.bind_addr);
        axum::serve(listener, app)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))
    }
}
