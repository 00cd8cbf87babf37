//! Application startup and lifecycle management.
//!
//! Builds the billing provider and the invoice request handler from
//! configuration, binds the HTTP listener and serves the trigger, health and
//! metrics endpoints until a shutdown signal arrives.

use crate::config::InvoiceSenderConfig;
use crate::handlers::{self, trigger::receive_trigger};
use crate::services::{BillingProvider, InvoiceRequestHandler, MockBillingProvider, StripeClient};
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::config::is_production;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{request_id_middleware, RequestId},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: InvoiceSenderConfig,
    pub handler: InvoiceRequestHandler,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application, choosing the billing provider from configuration.
    pub async fn build(config: InvoiceSenderConfig) -> Result<Self, AppError> {
        let provider = billing_provider(&config)?;
        Self::build_with_provider(config, provider).await
    }

    /// Build the application around an already constructed billing provider.
    pub async fn build_with_provider(
        config: InvoiceSenderConfig,
        provider: Arc<dyn BillingProvider>,
    ) -> Result<Self, AppError> {
        let handler = InvoiceRequestHandler::new(provider, &config.invoice);

        if config.trigger.signing_secret.is_none() {
            tracing::warn!("TRIGGER_SIGNING_SECRET not set - trigger deliveries are not verified");
        }

        // Port 0 = random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port = port,
            billing_provider = handler.provider_name(),
            failure_policy = ?config.trigger.failure_policy,
            "Invoice sender service configured"
        );

        Ok(Self {
            port,
            listener,
            state: AppState { config, handler },
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until a shutdown signal is received.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = router(self.state);

        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/triggers/invoice-requests", post(receive_trigger))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .extensions()
                    .get::<RequestId>()
                    .map(|id| id.0.as_str())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Outermost so the id exists before the span is made
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

fn billing_provider(config: &InvoiceSenderConfig) -> Result<Arc<dyn BillingProvider>, AppError> {
    let stripe = StripeClient::new(config.stripe.clone());
    if stripe.is_configured() {
        tracing::info!(
            api_version = %config.stripe.api_version,
            "Stripe billing provider initialized"
        );
        return Ok(Arc::new(stripe));
    }

    if is_production() {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "STRIPE_SECRET_KEY must be set in production"
        )));
    }

    tracing::warn!("Stripe credentials not configured, using mock billing provider");
    Ok(Arc::new(MockBillingProvider::fallback()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
