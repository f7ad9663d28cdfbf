//! Prometheus metrics and the optional exposition endpoint.

use axum::{routing::get, Router};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::watch;
use tracing::info;

/// Metrics shared by the subscriber and the engine.
#[derive(Clone, Default)]
pub struct Metrics {
    /// Checkpoints processed that carried signature data.
    pub checkpoints: Counter,
    /// Times the event stream was reopened after a disconnect.
    pub resubscribes: Counter,
    /// Committee reload attempts that failed.
    pub reload_failures: Counter,
    /// Size of the current committee.
    pub committee_size: Gauge,
    /// Voting power that signed the last processed checkpoint.
    pub signed_power: Gauge,
    /// Voting power of the full committee.
    pub total_power: Gauge,
}

impl Metrics {
    /// Creates a new set of metrics, registered with the given registry.
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "checkpoints",
            "Checkpoints processed that carried signature data",
            metrics.checkpoints.clone(),
        );
        registry.register(
            "resubscribes",
            "Times the event stream was reopened after a disconnect",
            metrics.resubscribes.clone(),
        );
        registry.register(
            "reload_failures",
            "Committee reload attempts that failed",
            metrics.reload_failures.clone(),
        );
        registry.register(
            "committee_size",
            "Size of the current committee",
            metrics.committee_size.clone(),
        );
        registry.register(
            "signed_power",
            "Voting power that signed the last processed checkpoint",
            metrics.signed_power.clone(),
        );
        registry.register(
            "total_power",
            "Voting power of the full committee",
            metrics.total_power.clone(),
        );
        metrics
    }
}

/// Serves the registry at `/metrics` until the shutdown signal fires.
pub async fn serve(
    registry: Arc<Registry>,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let registry = registry.clone();
            async move {
                let mut buffer = String::new();
                let _ = encode(&mut buffer, &registry);
                buffer
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "serving metrics");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}
