//! API server — HTTP entitlement endpoint plus operational probes.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use entitlement_core::config::AppConfig;
use entitlement_licensing::{EntitlementResolver, TelemetrySink};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    resolver: Arc<EntitlementResolver>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        resolver: Arc<EntitlementResolver>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            config,
            resolver,
            telemetry,
        }
    }

    /// Build the router with all routes and middleware attached.
    pub fn router(&self) -> Router {
        let state = AppState {
            resolver: self.resolver.clone(),
            telemetry: self.telemetry.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/v1/entitlements", post(rest::handle_entitlement))
            .route("/v1/tiers", get(rest::list_tiers))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP server. Runs until the listener fails.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the Prometheus exporter on its own port when enabled.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        if !self.config.metrics.enabled {
            return Ok(());
        }

        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
