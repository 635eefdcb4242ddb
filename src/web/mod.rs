//! HTTP surface for the outreach relay.
//!
//! Thin axum handlers over the job store and processor: the submission
//! entry point, the polling/operator endpoints, and the confirmation
//! webhook the extension bridge calls when the provider acknowledges a
//! send after the fact.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;

use crate::{config::Config, database::Database, services::JobProcessor};

pub mod api;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub config: Config,
    pub processor: JobProcessor,
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: Config, database: Database, processor: JobProcessor) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        let app = create_router(AppState {
            database,
            config,
            processor,
        });

        Ok(Self { app, addr })
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Web server listening on {}", self.addr);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        Self::run(listener, self.app).await
    }

    async fn run(listener: tokio::net::TcpListener, app: Router) -> Result<()> {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

/// Build the application router. Exposed so route tests can drive the app
/// without binding a socket.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/v1/jobs", post(api::queue_job))
        .route("/api/v1/jobs/:id", get(api::get_job))
        .route("/api/v1/jobs/:id/audit", get(api::get_job_audit))
        .route("/api/v1/jobs/:id/retry", post(api::retry_dead_letter_job))
        .route(
            "/api/v1/users/:user_id/jobs/dead-letter",
            get(api::list_dead_letter_jobs),
        )
        .route("/api/v1/users/:user_id/jobs/stats", get(api::get_job_stats))
        .route("/api/v1/users/:user_id/quota", get(api::get_quota))
        .route("/api/v1/confirmations", post(api::receive_confirmation))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::errors::{SessionError, SessionSendError};
    use crate::session::{DispatchOutcome, SessionClient, SessionHealth};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct IdleClient;

    #[async_trait]
    impl SessionClient for IdleClient {
        async fn health(&self, _user_id: &str) -> Result<SessionHealth, SessionError> {
            Ok(SessionHealth::disconnected())
        }

        async fn send_connection_request(
            &self,
            _user_id: &str,
            _profile_url: &str,
            _note: Option<&str>,
        ) -> Result<DispatchOutcome, SessionSendError> {
            Err(SessionSendError::api("unused"))
        }

        async fn send_direct_message(
            &self,
            _user_id: &str,
            _profile_url: &str,
            _message: &str,
        ) -> Result<DispatchOutcome, SessionSendError> {
            Err(SessionSendError::api("unused"))
        }
    }

    #[tokio::test]
    async fn test_run_serves_bound_listener() {
        let config = Config::default();
        let database = Database::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: Some(1),
        })
        .await
        .unwrap();
        database.migrate().await.unwrap();
        let processor =
            JobProcessor::new(database.clone(), Arc::new(IdleClient), config.quota.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(AppState {
            database,
            config,
            processor,
        });
        tokio::spawn(WebServer::run(listener, app));

        let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
    }
}
