// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_registry::ChainRegistry;
use crate::client::ChainClients;
use crate::config::InteropNodeConfig;
use crate::ledger::InMemoryLedgerStore;
use crate::metrics::{start_metrics_server, InteropMetrics};
use crate::server::handler::InteropRequestHandler;
use crate::server::run_server;
use crate::sweeper::TimeoutSweeper;
use crate::verification::TtlVerificationCache;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Starts the interop server and its background tasks. The returned handle is the server's.
pub async fn run_interop_node(
    config: InteropNodeConfig,
    prometheus_registry: prometheus::Registry,
) -> anyhow::Result<JoinHandle<()>> {
    let metrics = Arc::new(InteropMetrics::new(&prometheus_registry));
    let server_config = config.validate()?;

    let registry = Arc::new(ChainRegistry::new(server_config.allowed_chains.clone()));
    let clients = Arc::new(
        ChainClients::new_http(server_config.request_timeout, metrics.clone())
            .context("Failed to build chain clients")?,
    );
    let handler = InteropRequestHandler::new(
        server_config.enabled,
        server_config.local_chain.chain_id.clone(),
        registry,
        clients,
        Arc::new(TtlVerificationCache::new(
            server_config.verification_cache_ttl,
            server_config.verification_cache_capacity,
        )),
        Arc::new(InMemoryLedgerStore::default()),
        server_config.relay.clone(),
        metrics.clone(),
    );

    handler
        .register_chain(server_config.local_chain.clone())
        .context("Failed to register the local chain")?;
    for chain in server_config.chains.iter().cloned() {
        let chain_id = chain.chain_id.clone();
        handler
            .register_chain(chain)
            .with_context(|| format!("Failed to register configured chain {}", chain_id))?;
    }
    info!(
        local_chain_id = %server_config.local_chain.chain_id,
        chains = server_config.chains.len(),
        enabled = server_config.enabled,
        "Interop chains registered"
    );

    if let Some(sweep_interval) = server_config.sweep_interval {
        TimeoutSweeper::new(
            handler.messages().clone(),
            handler.ledger().clone(),
            metrics.clone(),
            server_config.message_retention,
        )
        .run(sweep_interval);
    }
    if let Some(metrics_port) = server_config.metrics_port {
        start_metrics_server(
            SocketAddr::new(server_config.server_listen_address.ip(), metrics_port),
            prometheus_registry,
        );
    }

    Ok(run_server(&server_config.server_listen_address, handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use std::time::Duration;
    use tracepost_interop_config::local_ip_utils::{get_available_port, localhost_for_testing};

    fn test_config() -> InteropNodeConfig {
        let host = localhost_for_testing();
        let mut config = InteropNodeConfig::template(get_available_port(&host));
        config.server_listen_address = host;
        config.metrics_port = Some(get_available_port(&host));
        config.chains = vec![ChainConfig {
            chain_id: "cosmoshub-4".to_string(),
            chain_type: "cosmos-sdk".to_string(),
            endpoint: "http://127.0.0.1:1317".to_string(),
            api_key: Some("secret".to_string()),
            account_address: None,
        }];
        config
    }

    async fn wait_for_ok(url: &str) -> reqwest::Response {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(response) = reqwest::get(url).await {
                    if response.status().is_success() {
                        return response;
                    }
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_interop_node() {
        let config = test_config();
        let base = format!(
            "http://{}:{}",
            config.server_listen_address, config.server_listen_port
        );
        let metrics_url = format!(
            "http://{}:{}/metrics",
            config.server_listen_address,
            config.metrics_port.unwrap()
        );
        let handle = run_interop_node(config, prometheus::Registry::new())
            .await
            .unwrap();

        let health = wait_for_ok(&format!("{}/health", base)).await;
        assert_eq!(health.text().await.unwrap(), "ok");

        let chains: serde_json::Value = wait_for_ok(&format!("{}/interop/chains", base))
            .await
            .json()
            .await
            .unwrap();
        let ids: Vec<&str> = chains
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["chain_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["cosmoshub-4", "tracepost-chain"]);
        // Credentials never leave the node.
        assert!(!chains.to_string().contains("secret"));

        let exported = wait_for_ok(&metrics_url).await.text().await.unwrap();
        assert!(exported.contains("interop_registered_chains 2"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_invalid_config_fails_fast() {
        let mut config = test_config();
        config.chains[0].endpoint = "cosmos".to_string();
        assert!(run_interop_node(config, prometheus::Registry::new())
            .await
            .is_err());
    }
}
