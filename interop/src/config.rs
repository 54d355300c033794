// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::builders::generic::DEFAULT_DATA_STANDARD;
use crate::builders::ibc::DEFAULT_IBC_TIMEOUT_MINUTES;
use crate::chain_registry::{validate_endpoint, RegisterChainRequest};
use crate::relay::RelayConfig;
use crate::sweeper::{DEFAULT_MESSAGE_RETENTION, DEFAULT_SWEEP_INTERVAL};
use crate::types::{ChainCredentials, ProtocolFamily};
use crate::verification::{DEFAULT_VERIFICATION_CACHE_CAPACITY, DEFAULT_VERIFICATION_CACHE_TTL};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracepost_interop_config::Config;
use tracing::info;

pub const DEFAULT_LOCAL_CHAIN_ID: &str = "tracepost-chain";

/// An external chain registered when the node starts.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    pub chain_id: String,
    // Free-form type such as `cosmos-sdk` or `polkadot-parachain`; selects the protocol family.
    pub chain_type: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_address: Option<String>,
}

impl ChainConfig {
    fn to_request(&self) -> RegisterChainRequest {
        let mut request = RegisterChainRequest::from_chain_type(
            self.chain_id.clone(),
            self.chain_type.clone(),
            self.endpoint.clone(),
        );
        request.credentials = ChainCredentials {
            api_key: self.api_key.clone(),
            account_address: self.account_address.clone(),
        };
        request
    }
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct InteropNodeConfig {
    #[serde(default = "default_listen_address")]
    pub server_listen_address: IpAddr,
    // The port that the server listens on.
    pub server_listen_port: u16,
    // The port of the metrics server. No metrics server when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
    // When false every /interop route answers 400.
    #[serde(default = "default_true")]
    pub enabled: bool,
    // Id under which this platform's own chain is registered. Cosmos and Polkadot bridges
    // created over HTTP connect the remote chain to it.
    #[serde(default = "default_local_chain_id")]
    pub local_chain_id: String,
    // Defaults to the server's own address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_chain_endpoint: Option<String>,
    // Generic bridge relay service. `/bridge/send` is appended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_endpoint: Option<String>,
    // Chains that may be registered. Empty allows any chain.
    #[serde(default)]
    pub allowed_chains: Vec<String>,
    #[serde(default = "default_data_standard")]
    pub default_data_standard: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_verification_cache_ttl")]
    pub verification_cache_ttl_secs: Duration,
    #[serde(default = "default_verification_cache_capacity")]
    pub verification_cache_capacity: usize,
    #[serde(default = "default_ibc_timeout_minutes")]
    pub default_ibc_timeout_minutes: i64,
    // Runs the timeout and retention sweep at this interval. `null` disables it.
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: Option<Duration>,
    // Terminal messages older than this are dropped by the sweep.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_message_retention")]
    pub message_retention_secs: Duration,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

fn default_listen_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_true() -> bool {
    true
}

fn default_local_chain_id() -> String {
    DEFAULT_LOCAL_CHAIN_ID.to_string()
}

fn default_data_standard() -> String {
    DEFAULT_DATA_STANDARD.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_verification_cache_ttl() -> Duration {
    DEFAULT_VERIFICATION_CACHE_TTL
}

fn default_verification_cache_capacity() -> usize {
    DEFAULT_VERIFICATION_CACHE_CAPACITY
}

fn default_sweep_interval() -> Option<Duration> {
    Some(DEFAULT_SWEEP_INTERVAL)
}

fn default_message_retention() -> Duration {
    DEFAULT_MESSAGE_RETENTION
}

fn default_ibc_timeout_minutes() -> i64 {
    DEFAULT_IBC_TIMEOUT_MINUTES
}

impl Config for InteropNodeConfig {}

impl InteropNodeConfig {
    /// Starting point for a new deployment.
    pub fn template(server_listen_port: u16) -> Self {
        Self {
            server_listen_address: default_listen_address(),
            server_listen_port,
            metrics_port: Some(9184),
            enabled: true,
            local_chain_id: default_local_chain_id(),
            local_chain_endpoint: None,
            relay_endpoint: None,
            allowed_chains: vec![],
            default_data_standard: default_data_standard(),
            request_timeout_secs: default_request_timeout(),
            verification_cache_ttl_secs: default_verification_cache_ttl(),
            verification_cache_capacity: default_verification_cache_capacity(),
            default_ibc_timeout_minutes: default_ibc_timeout_minutes(),
            sweep_interval_secs: default_sweep_interval(),
            message_retention_secs: default_message_retention(),
            chains: vec![
                ChainConfig {
                    chain_id: "cosmoshub-4".to_string(),
                    chain_type: "cosmos-sdk".to_string(),
                    endpoint: "https://rest.cosmos.directory/cosmoshub".to_string(),
                    api_key: None,
                    account_address: None,
                },
                ChainConfig {
                    chain_id: "parachain-2000".to_string(),
                    chain_type: "polkadot-parachain".to_string(),
                    endpoint: "http://127.0.0.1:9944".to_string(),
                    api_key: None,
                    account_address: None,
                },
            ],
        }
    }

    pub fn validate(&self) -> anyhow::Result<InteropServerConfig> {
        info!("Starting config validation");
        if self.server_listen_port == 0 {
            return Err(anyhow!("server-listen-port must be set"));
        }
        if self.metrics_port == Some(self.server_listen_port) {
            return Err(anyhow!(
                "metrics-port and server-listen-port must differ, both are {}",
                self.server_listen_port
            ));
        }
        if self.request_timeout_secs.is_zero() {
            return Err(anyhow!("request-timeout-secs must be positive"));
        }
        if self.verification_cache_ttl_secs.is_zero() {
            return Err(anyhow!("verification-cache-ttl-secs must be positive"));
        }
        if self.verification_cache_capacity == 0 {
            return Err(anyhow!("verification-cache-capacity must be positive"));
        }
        if self.default_ibc_timeout_minutes <= 0 {
            return Err(anyhow!("default-ibc-timeout-minutes must be positive"));
        }
        let default_ibc_timeout = chrono::Duration::try_minutes(self.default_ibc_timeout_minutes)
            .ok_or_else(|| anyhow!("default-ibc-timeout-minutes is out of range"))?;
        if self.message_retention_secs.is_zero() {
            return Err(anyhow!("message-retention-secs must be positive"));
        }
        if self.sweep_interval_secs.map(|d| d.is_zero()).unwrap_or(false) {
            return Err(anyhow!("sweep-interval-secs must be positive"));
        }
        if self.local_chain_id.trim().is_empty() {
            return Err(anyhow!("local-chain-id must not be empty"));
        }
        if let Some(relay) = &self.relay_endpoint {
            validate_endpoint(relay).map_err(|e| anyhow!("relay-endpoint: {}", e))?;
        }

        let mut seen = HashSet::new();
        let mut chains = vec![];
        for chain in &self.chains {
            if chain.chain_id == self.local_chain_id {
                return Err(anyhow!(
                    "Chain {} clashes with local-chain-id",
                    chain.chain_id
                ));
            }
            if !seen.insert(chain.chain_id.clone()) {
                return Err(anyhow!("Chain {} is configured twice", chain.chain_id));
            }
            validate_endpoint(&chain.endpoint)
                .map_err(|e| anyhow!("chain {}: {}", chain.chain_id, e))?;
            chains.push(chain.to_request());
        }

        let local_endpoint = self.local_chain_endpoint.clone().unwrap_or_else(|| {
            format!("http://127.0.0.1:{}", self.server_listen_port)
        });
        validate_endpoint(&local_endpoint).map_err(|e| anyhow!("local-chain-endpoint: {}", e))?;
        let local_chain = RegisterChainRequest {
            chain_id: self.local_chain_id.clone(),
            protocol_family: ProtocolFamily::Generic,
            chain_type: ProtocolFamily::Generic.as_str().to_string(),
            endpoint: local_endpoint,
            credentials: ChainCredentials::default(),
        };

        let allowed_chains: HashSet<String> = self.allowed_chains.iter().cloned().collect();
        let allowed_chains = if allowed_chains.is_empty() {
            None
        } else {
            // The local chain is always allowed.
            let mut allowed = allowed_chains;
            allowed.insert(self.local_chain_id.clone());
            Some(allowed)
        };

        Ok(InteropServerConfig {
            server_listen_address: SocketAddr::new(
                self.server_listen_address,
                self.server_listen_port,
            ),
            metrics_port: self.metrics_port,
            enabled: self.enabled,
            local_chain,
            chains,
            allowed_chains,
            relay: RelayConfig {
                default_ibc_timeout,
                relay_endpoint: self.relay_endpoint.clone(),
                default_data_standard: self.default_data_standard.clone(),
            },
            request_timeout: self.request_timeout_secs,
            verification_cache_ttl: self.verification_cache_ttl_secs,
            verification_cache_capacity: self.verification_cache_capacity,
            sweep_interval: self.sweep_interval_secs,
            message_retention: self.message_retention_secs,
        })
    }
}

/// Validated runtime form of `InteropNodeConfig`.
#[derive(Clone, Debug)]
pub struct InteropServerConfig {
    pub server_listen_address: SocketAddr,
    pub metrics_port: Option<u16>,
    pub enabled: bool,
    pub local_chain: RegisterChainRequest,
    pub chains: Vec<RegisterChainRequest>,
    pub allowed_chains: Option<HashSet<String>>,
    pub relay: RelayConfig,
    pub request_timeout: Duration,
    pub verification_cache_ttl: Duration,
    pub verification_cache_capacity: usize,
    pub sweep_interval: Option<Duration>,
    pub message_retention: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interop.yaml");
        std::fs::write(&path, "server-listen-port: 9191\n").unwrap();
        let config = InteropNodeConfig::load(&path).unwrap();
        assert!(config.enabled);
        assert_eq!(config.local_chain_id, "tracepost-chain");
        assert_eq!(config.request_timeout_secs, Duration::from_secs(30));
        assert_eq!(config.verification_cache_ttl_secs, Duration::from_secs(300));
        assert_eq!(config.default_ibc_timeout_minutes, 30);
        assert_eq!(config.default_data_standard, "GS1-EPCIS");
        assert_eq!(config.sweep_interval_secs, Some(Duration::from_secs(60)));
        assert_eq!(config.message_retention_secs, Duration::from_secs(86_400));

        let server = config.validate().unwrap();
        assert_eq!(server.server_listen_address.port(), 9191);
        assert_eq!(server.local_chain.endpoint, "http://127.0.0.1:9191");
        assert!(server.allowed_chains.is_none());
        assert!(server.chains.is_empty());
    }

    #[test]
    fn test_template_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interop.json");
        InteropNodeConfig::template(9191).save(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"request-timeout-secs\": 30"));
        let config = InteropNodeConfig::load(&path).unwrap();
        let server = config.validate().unwrap();
        assert_eq!(server.chains.len(), 2);
        assert_eq!(server.chains[0].protocol_family, ProtocolFamily::Ibc);
        assert_eq!(server.chains[1].protocol_family, ProtocolFamily::Xcm);
        assert_eq!(server.sweep_interval, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_validation_failures() {
        let base = InteropNodeConfig::template(9191);

        let mut config = base.clone();
        config.request_timeout_secs = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.chains[1].chain_id = "cosmoshub-4".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("twice"));

        let mut config = base.clone();
        config.chains[0].endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.relay_endpoint = Some("ftp://relay".to_string());
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.default_ibc_timeout_minutes = i64::MAX;
        assert!(config.validate().unwrap_err().to_string().contains("out of range"));

        let mut config = base.clone();
        config.message_retention_secs = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = base;
        config.allowed_chains = vec!["cosmoshub-4".to_string()];
        let allowed = config.validate().unwrap().allowed_chains.unwrap();
        assert!(allowed.contains("tracepost-chain"));
    }
}
