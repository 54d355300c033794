// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub const METRICS_ROUTE: &str = "/metrics";

#[derive(Clone, Debug)]
pub struct InteropMetrics {
    pub(crate) verification_cache_hit: IntCounterVec,
    pub(crate) verification_cache_miss: IntCounterVec,
    pub(crate) remote_calls: IntCounterVec,
    pub(crate) messages_submitted: IntCounterVec,
    pub(crate) ledger_write_failures: IntCounter,
    pub(crate) messages_timed_out: IntCounter,
    pub(crate) messages_evicted: IntCounter,
    pub(crate) registered_chains: IntGauge,
}

impl InteropMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            verification_cache_hit: register_int_counter_vec_with_registry!(
                "interop_verification_cache_hit",
                "Total number of verification requests served from cache",
                &["verifier"],
                registry,
            )
            .unwrap(),
            verification_cache_miss: register_int_counter_vec_with_registry!(
                "interop_verification_cache_miss",
                "Total number of verification requests that reached the remote chain",
                &["verifier"],
                registry,
            )
            .unwrap(),
            remote_calls: register_int_counter_vec_with_registry!(
                "interop_remote_calls",
                "Remote chain API calls by protocol, operation and outcome",
                &["protocol", "operation", "outcome"],
                registry,
            )
            .unwrap(),
            messages_submitted: register_int_counter_vec_with_registry!(
                "interop_messages_submitted",
                "Cross-chain messages accepted by the remote chain",
                &["protocol"],
                registry,
            )
            .unwrap(),
            ledger_write_failures: register_int_counter_with_registry!(
                "interop_ledger_write_failures",
                "Local ledger writes that failed and were skipped",
                registry,
            )
            .unwrap(),
            messages_timed_out: register_int_counter_with_registry!(
                "interop_messages_timed_out",
                "Messages moved to timed_out by the sweep",
                registry,
            )
            .unwrap(),
            messages_evicted: register_int_counter_with_registry!(
                "interop_messages_evicted",
                "Terminal messages dropped after the retention period",
                registry,
            )
            .unwrap(),
            registered_chains: register_int_gauge_with_registry!(
                "interop_registered_chains",
                "Number of registered external chains",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}

/// Serves `registry` in the Prometheus text format on `{address}/metrics`.
pub fn start_metrics_server(address: SocketAddr, registry: Registry) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind metrics server to {}: {}", address, e);
                return;
            }
        };
        info!("Prometheus metrics server listening on http://{}", address);
        let router = Router::new()
            .route(METRICS_ROUTE, get(metrics_handler))
            .with_state(registry);
        if let Err(e) = axum::serve(listener, router).await {
            error!("Metrics server stopped: {}", e);
        }
    })
}

async fn metrics_handler(State(registry): State<Registry>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain".to_string())],
            format!("Failed to encode metrics: {}", e),
        );
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        String::from_utf8_lossy(&buffer).to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_are_exported() {
        let registry = Registry::new();
        let metrics = InteropMetrics::new(&registry);
        metrics
            .verification_cache_hit
            .with_label_values(&["IbcVerifier"])
            .inc();
        let response = metrics_handler(State(registry)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("interop_verification_cache_hit{verifier=\"IbcVerifier\"} 1"));
    }
}
