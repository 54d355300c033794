// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Registry of external chains the node can talk to.
//!
//! Reads go through an `ArcSwap` snapshot and never wait on writers. Writers are serialized
//! by a mutex and publish a fresh copy of the map.

use crate::error::{InteropError, InteropResult};
use crate::types::{ChainCredentials, ChainDescriptor, ProtocolFamily};
use arc_swap::ArcSwap;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::info;
use url::Url;

type ChainMap = BTreeMap<String, Arc<ChainDescriptor>>;

#[derive(Clone, Debug)]
pub struct RegisterChainRequest {
    pub chain_id: String,
    pub protocol_family: ProtocolFamily,
    pub chain_type: String,
    pub endpoint: String,
    pub credentials: ChainCredentials,
}

impl RegisterChainRequest {
    /// Builds a request from a free-form chain type, inferring the protocol family from it.
    pub fn from_chain_type(
        chain_id: impl Into<String>,
        chain_type: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        let chain_type = chain_type.into();
        Self {
            chain_id: chain_id.into(),
            protocol_family: ProtocolFamily::from_chain_type(&chain_type),
            chain_type,
            endpoint: endpoint.into(),
            credentials: ChainCredentials::default(),
        }
    }
}

pub fn validate_endpoint(endpoint: &str) -> InteropResult<Url> {
    let invalid = |reason: &str| InteropError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().map(|h| h.is_empty()).unwrap_or(true) {
        return Err(invalid("missing host"));
    }
    Ok(url)
}

pub struct ChainRegistry {
    chains: ArcSwap<ChainMap>,
    write_lock: Mutex<()>,
    allowed_chains: Option<HashSet<String>>,
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ChainRegistry {
    pub fn new(allowed_chains: Option<HashSet<String>>) -> Self {
        Self {
            chains: ArcSwap::from_pointee(ChainMap::new()),
            write_lock: Mutex::new(()),
            allowed_chains: allowed_chains.filter(|chains| !chains.is_empty()),
        }
    }

    pub fn register_chain(&self, request: RegisterChainRequest) -> InteropResult<String> {
        let chain_id = request.chain_id.trim().to_string();
        if chain_id.is_empty() {
            return Err(InteropError::Validation("chain_id is required".into()));
        }
        if let Some(allowed) = &self.allowed_chains {
            if !allowed.contains(&chain_id) {
                return Err(InteropError::Validation(format!(
                    "Chain {} is not in the allowed chain list",
                    chain_id
                )));
            }
        }
        validate_endpoint(&request.endpoint)?;

        let _guard = self.write_lock.lock();
        let current = self.chains.load_full();
        if current.contains_key(&chain_id) {
            return Err(InteropError::DuplicateChain(chain_id));
        }
        let now = Utc::now();
        let chain_type = if request.chain_type.is_empty() {
            request.protocol_family.as_str().to_string()
        } else {
            request.chain_type
        };
        let connection_id = format!("{}-{}-{}", chain_id, chain_type, now.timestamp());
        let descriptor = ChainDescriptor {
            details: connection_details(request.protocol_family, &connection_id),
            chain_id: chain_id.clone(),
            protocol_family: request.protocol_family,
            chain_type,
            endpoint: request.endpoint,
            credentials: request.credentials,
            connection_id: connection_id.clone(),
            registered_at: now,
            active: true,
        };
        let mut next = (*current).clone();
        next.insert(chain_id.clone(), Arc::new(descriptor));
        self.chains.store(Arc::new(next));
        info!(
            chain_id = %chain_id,
            protocol = %request.protocol_family,
            connection_id = %connection_id,
            "Registered chain"
        );
        Ok(connection_id)
    }

    pub fn lookup(&self, chain_id: &str) -> InteropResult<Arc<ChainDescriptor>> {
        self.chains
            .load()
            .get(chain_id)
            .cloned()
            .ok_or_else(|| InteropError::not_registered("chain", chain_id))
    }

    /// Like `lookup` but also rejects deactivated chains.
    pub fn lookup_active(&self, chain_id: &str) -> InteropResult<Arc<ChainDescriptor>> {
        let descriptor = self.lookup(chain_id)?;
        if !descriptor.active {
            return Err(InteropError::ChainInactive(chain_id.to_string()));
        }
        Ok(descriptor)
    }

    pub fn is_registered(&self, chain_id: &str) -> bool {
        self.chains.load().contains_key(chain_id)
    }

    /// Soft-disables a chain. Returns the updated descriptor. Deactivating twice is a no-op.
    pub fn deactivate(&self, chain_id: &str) -> InteropResult<Arc<ChainDescriptor>> {
        let _guard = self.write_lock.lock();
        let current = self.chains.load_full();
        let existing = current
            .get(chain_id)
            .ok_or_else(|| InteropError::not_registered("chain", chain_id))?;
        if !existing.active {
            return Ok(existing.clone());
        }
        let mut descriptor = (**existing).clone();
        descriptor.active = false;
        let descriptor = Arc::new(descriptor);
        let mut next = (*current).clone();
        next.insert(chain_id.to_string(), descriptor.clone());
        self.chains.store(Arc::new(next));
        info!(chain_id, "Deactivated chain");
        Ok(descriptor)
    }

    pub fn list(&self) -> Vec<Arc<ChainDescriptor>> {
        self.chains.load().values().cloned().collect()
    }
}

fn connection_details(protocol: ProtocolFamily, connection_id: &str) -> BTreeMap<String, String> {
    let short: String = connection_id.chars().take(8).collect();
    let mut details = BTreeMap::new();
    match protocol {
        ProtocolFamily::Ibc => {
            details.insert(
                "ibc_connection_id".to_string(),
                format!("connection-{}", short),
            );
            details.insert(
                "ibc_client_id".to_string(),
                format!("07-tendermint-{}", short),
            );
        }
        ProtocolFamily::Xcm => {
            details.insert("xcmp_channel_id".to_string(), format!("xcmp-{}", short));
        }
        ProtocolFamily::Generic => {}
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashset;

    fn cosmos_request() -> RegisterChainRequest {
        RegisterChainRequest {
            chain_id: "cosmoshub-4".to_string(),
            protocol_family: ProtocolFamily::Ibc,
            chain_type: "cosmos".to_string(),
            endpoint: "https://rpc.cosmos.network".to_string(),
            credentials: ChainCredentials::default(),
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ChainRegistry::default();
        let connection_id = registry.register_chain(cosmos_request()).unwrap();
        assert!(connection_id.starts_with("cosmoshub-4-cosmos-"));

        let descriptor = registry.lookup("cosmoshub-4").unwrap();
        assert_eq!(descriptor.protocol_family, ProtocolFamily::Ibc);
        assert!(descriptor.active);
        assert_eq!(
            descriptor.details.get("ibc_connection_id").unwrap(),
            "connection-cosmoshu"
        );
        assert!(matches!(
            registry.lookup("osmosis-1"),
            Err(InteropError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_duplicate_and_invalid_endpoint() {
        let registry = ChainRegistry::default();
        registry.register_chain(cosmos_request()).unwrap();
        assert_eq!(
            registry.register_chain(cosmos_request()),
            Err(InteropError::DuplicateChain("cosmoshub-4".to_string()))
        );

        for endpoint in ["not a url", "ftp://rpc.example.com", "http://"] {
            let mut request = cosmos_request();
            request.chain_id = "osmosis-1".to_string();
            request.endpoint = endpoint.to_string();
            assert!(matches!(
                registry.register_chain(request),
                Err(InteropError::InvalidEndpoint { .. })
            ));
        }
        assert!(!registry.is_registered("osmosis-1"));
    }

    #[test]
    fn test_chain_type_inference() {
        let registry = ChainRegistry::default();
        registry
            .register_chain(RegisterChainRequest::from_chain_type(
                "parachain-2000",
                "polkadot-parachain",
                "http://127.0.0.1:9944",
            ))
            .unwrap();
        let descriptor = registry.lookup("parachain-2000").unwrap();
        assert_eq!(descriptor.protocol_family, ProtocolFamily::Xcm);
        assert!(descriptor.details.contains_key("xcmp_channel_id"));
    }

    #[test]
    fn test_deactivate() {
        let registry = ChainRegistry::default();
        registry.register_chain(cosmos_request()).unwrap();
        let before = registry.lookup("cosmoshub-4").unwrap();
        let descriptor = registry.deactivate("cosmoshub-4").unwrap();
        assert!(!descriptor.active);
        // Snapshots taken before the write are unaffected.
        assert!(before.active);
        assert_eq!(
            registry.lookup_active("cosmoshub-4"),
            Err(InteropError::ChainInactive("cosmoshub-4".to_string()))
        );
        assert!(registry.deactivate("cosmoshub-4").is_ok());
        assert!(registry.deactivate("unknown").is_err());
    }

    #[test]
    fn test_allowed_chains() {
        let registry = ChainRegistry::new(Some(hashset! {"osmosis-1".to_string()}));
        assert!(matches!(
            registry.register_chain(cosmos_request()),
            Err(InteropError::Validation(_))
        ));
        // An empty allow-list permits everything.
        let registry = ChainRegistry::new(Some(HashSet::new()));
        assert!(registry.register_chain(cosmos_request()).is_ok());
    }
}
