use crate::{handlers, websocket};
use axum::{
    routing::{get, post},
    Router,
};
use position_guard_orchestrator::AccountRegistry;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct ApiServer {
    registry: Arc<AccountRegistry>,
}

impl ApiServer {
    #[must_use]
    pub const fn new(registry: Arc<AccountRegistry>) -> Self {
        Self { registry }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/accounts", get(handlers::list_accounts))
            .route("/api/accounts/:account_id", get(handlers::get_account_status))
            .route("/api/accounts/:account_id/start", post(handlers::start_account))
            .route("/api/accounts/:account_id/stop", post(handlers::stop_account))
            .route("/api/accounts/:account_id/refresh", post(handlers::refresh_account))
            .route("/api/accounts/:account_id/tick", post(handlers::tick_account))
            .route("/api/accounts/:account_id/events", post(handlers::ingest_events))
            .route("/ws", get(websocket::websocket_handler))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.registry.clone())
    }

    /// Starts the web server listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web API listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
