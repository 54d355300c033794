// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Confirms that previously relayed messages executed on their destination.
//!
//! Results are cached per `tx|source|dest` for a fixed TTL. Every key maps to one cache slot
//! guarded by an async mutex, so concurrent identical requests wait for the first one and
//! only a single remote verification is made. Remote errors are never cached.

use crate::chain_registry::ChainRegistry;
use crate::client::{ChainClients, PacketRef, RemoteTarget, VerificationRequest};
use crate::error::{InteropError, InteropResult};
use crate::message_store::MessageStore;
use crate::metrics::InteropMetrics;
use crate::types::{
    message_key, sha256_hex, ChainDescriptor, MessagePayload, ProtocolFamily, ProtocolSelector,
    VerificationResult,
};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tap::TapFallible;
use tokio::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_VERIFICATION_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_VERIFICATION_CACHE_CAPACITY: usize = 10_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationCacheEntry {
    pub result: VerificationResult,
    pub cached_at: Instant,
}

pub type CacheSlot = Arc<tokio::sync::Mutex<Option<VerificationCacheEntry>>>;

/// Storage for verification results. Entries expire by TTL only.
pub trait VerificationCache: Send + Sync {
    fn ttl(&self) -> Duration;

    /// The slot for `key`. Concurrent callers asking for the same key get the same slot.
    fn slot(&self, key: &str) -> CacheSlot;
}

pub struct TtlVerificationCache {
    ttl: Duration,
    slots: Mutex<LruCache<String, CacheSlot>>,
}

impl TtlVerificationCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            slots: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl Default for TtlVerificationCache {
    fn default() -> Self {
        Self::new(
            DEFAULT_VERIFICATION_CACHE_TTL,
            DEFAULT_VERIFICATION_CACHE_CAPACITY,
        )
    }
}

impl VerificationCache for TtlVerificationCache {
    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, key: &str) -> CacheSlot {
        self.slots
            .lock()
            .get_or_insert(key.to_string(), || Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }
}

/// Arguments of a verification, after protocol resolution.
#[derive(Clone, Debug)]
pub struct VerificationQuery {
    pub tx_id: String,
    pub source: Arc<ChainDescriptor>,
    pub dest: Arc<ChainDescriptor>,
}

#[async_trait]
pub trait TransactionVerifier: Send + Sync {
    // Used for metrics and logs
    fn name(&self) -> &'static str;
    async fn verify(&self, query: &VerificationQuery) -> InteropResult<VerificationResult>;
}

fn proof(prefix: &str, query: &VerificationQuery) -> String {
    format!(
        "{}{}",
        prefix,
        sha256_hex(format!(
            "{}|{}|{}",
            query.tx_id, query.source.chain_id, query.dest.chain_id
        ))
    )
}

// Picks the side of the pair that speaks `protocol`, preferring `first`.
fn chain_of<'a>(
    protocol: ProtocolFamily,
    first: &'a Arc<ChainDescriptor>,
    second: &'a Arc<ChainDescriptor>,
) -> &'a Arc<ChainDescriptor> {
    if first.protocol_family == protocol || second.protocol_family != protocol {
        first
    } else {
        second
    }
}

pub struct IbcVerifier {
    clients: Arc<ChainClients>,
    messages: Arc<MessageStore>,
}

impl IbcVerifier {
    pub fn new(clients: Arc<ChainClients>, messages: Arc<MessageStore>) -> Self {
        Self { clients, messages }
    }
}

#[async_trait]
impl TransactionVerifier for IbcVerifier {
    fn name(&self) -> &'static str {
        "IbcVerifier"
    }

    async fn verify(&self, query: &VerificationQuery) -> InteropResult<VerificationResult> {
        // Acknowledgements are queried on the cosmos side of the pair.
        let chain = chain_of(ProtocolFamily::Ibc, &query.source, &query.dest);
        let packet = self
            .messages
            .get(&query.tx_id, &query.source.chain_id, &query.dest.chain_id)
            .and_then(|m| match m.payload {
                MessagePayload::Ibc(packet) => Some(PacketRef {
                    source_channel: packet.source_channel,
                    dest_channel: packet.dest_channel,
                    sequence: packet.sequence,
                }),
                _ => None,
            });
        let request = VerificationRequest {
            tx_id: query.tx_id.clone(),
            source_chain_id: query.source.chain_id.clone(),
            dest_chain_id: query.dest.chain_id.clone(),
            packet,
        };
        let verified = self
            .clients
            .get(ProtocolFamily::Ibc)
            .verify(&RemoteTarget::for_chain(chain), &request)
            .await?;
        Ok(VerificationResult {
            verified,
            proof_data: if verified {
                proof("ibc-proof-", query)
            } else {
                String::new()
            },
        })
    }
}

pub struct XcmVerifier {
    clients: Arc<ChainClients>,
}

impl XcmVerifier {
    pub fn new(clients: Arc<ChainClients>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl TransactionVerifier for XcmVerifier {
    fn name(&self) -> &'static str {
        "XcmVerifier"
    }

    async fn verify(&self, query: &VerificationQuery) -> InteropResult<VerificationResult> {
        // Execution is reported by the receiving parachain.
        let chain = chain_of(ProtocolFamily::Xcm, &query.dest, &query.source);
        let request = VerificationRequest {
            tx_id: query.tx_id.clone(),
            source_chain_id: query.source.chain_id.clone(),
            dest_chain_id: query.dest.chain_id.clone(),
            packet: None,
        };
        let verified = self
            .clients
            .get(ProtocolFamily::Xcm)
            .verify(&RemoteTarget::for_chain(chain), &request)
            .await?;
        Ok(VerificationResult {
            verified,
            proof_data: if verified {
                proof("xcm-proof-", query)
            } else {
                String::new()
            },
        })
    }
}

/// Bridges without a proof API are trusted once both ends are registered.
pub struct GenericVerifier;

#[async_trait]
impl TransactionVerifier for GenericVerifier {
    fn name(&self) -> &'static str {
        "GenericVerifier"
    }

    async fn verify(&self, query: &VerificationQuery) -> InteropResult<VerificationResult> {
        Ok(VerificationResult {
            verified: true,
            proof_data: format!(
                "bridge-proof-{}",
                sha256_hex(format!(
                    "{}{}{}",
                    query.tx_id, query.source.chain_id, query.dest.chain_id
                ))
            ),
        })
    }
}

pub struct VerificationService {
    registry: Arc<ChainRegistry>,
    cache: Arc<dyn VerificationCache>,
    verifiers: HashMap<ProtocolFamily, Arc<dyn TransactionVerifier>>,
    metrics: Arc<InteropMetrics>,
}

impl VerificationService {
    pub fn new(
        registry: Arc<ChainRegistry>,
        cache: Arc<dyn VerificationCache>,
        verifiers: HashMap<ProtocolFamily, Arc<dyn TransactionVerifier>>,
        metrics: Arc<InteropMetrics>,
    ) -> Self {
        Self {
            registry,
            cache,
            verifiers,
            metrics,
        }
    }

    /// Service with the standard verifier for each protocol family.
    pub fn with_default_verifiers(
        registry: Arc<ChainRegistry>,
        cache: Arc<dyn VerificationCache>,
        clients: Arc<ChainClients>,
        messages: Arc<MessageStore>,
        metrics: Arc<InteropMetrics>,
    ) -> Self {
        let mut verifiers: HashMap<ProtocolFamily, Arc<dyn TransactionVerifier>> = HashMap::new();
        verifiers.insert(
            ProtocolFamily::Ibc,
            Arc::new(IbcVerifier::new(clients.clone(), messages)),
        );
        verifiers.insert(ProtocolFamily::Xcm, Arc::new(XcmVerifier::new(clients)));
        verifiers.insert(ProtocolFamily::Generic, Arc::new(GenericVerifier));
        Self::new(registry, cache, verifiers, metrics)
    }

    pub async fn verify_transaction(
        &self,
        tx_id: &str,
        protocol: &str,
        source_chain_id: &str,
        dest_chain_id: &str,
    ) -> InteropResult<VerificationResult> {
        if tx_id.is_empty() || source_chain_id.is_empty() || dest_chain_id.is_empty() {
            return Err(InteropError::Validation(
                "tx_id, source_chain_id and dest_chain_id are required".to_string(),
            ));
        }
        let protocol = protocol
            .parse::<ProtocolSelector>()?
            .resolve(source_chain_id, dest_chain_id);
        let verifier = self.verifiers.get(&protocol).cloned().ok_or_else(|| {
            InteropError::Validation(format!("No verifier for protocol {}", protocol))
        })?;
        let query = VerificationQuery {
            tx_id: tx_id.to_string(),
            source: self.registry.lookup(source_chain_id)?,
            dest: self.registry.lookup(dest_chain_id)?,
        };

        let key = message_key(tx_id, source_chain_id, dest_chain_id);
        let slot = self.cache.slot(&key);
        let mut guard = slot.lock().await;
        if let Some(entry) = &*guard {
            if entry.cached_at.elapsed() < self.cache.ttl() {
                self.metrics
                    .verification_cache_hit
                    .with_label_values(&[verifier.name()])
                    .inc();
                debug!(key = %key, "Verification cache hit");
                return Ok(entry.result.clone());
            }
            debug!(key = %key, "Verification cache entry expired");
        }
        self.metrics
            .verification_cache_miss
            .with_label_values(&[verifier.name()])
            .inc();
        let result = verifier.verify(&query).await.tap_ok(|result| {
            info!(
                verifier = verifier.name(),
                tx_id,
                source_chain_id,
                dest_chain_id,
                verified = result.verified,
                "Verified transaction"
            )
        })?;
        *guard = Some(VerificationCacheEntry {
            result: result.clone(),
            cached_at: Instant::now(),
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockChainClient;
    use crate::test_utils::register_test_chains;

    struct Harness {
        service: Arc<VerificationService>,
        ibc: MockChainClient,
        xcm: MockChainClient,
        metrics: Arc<InteropMetrics>,
    }

    fn harness(ttl: Duration) -> Harness {
        let registry = Arc::new(ChainRegistry::default());
        register_test_chains(&registry);
        let metrics = Arc::new(InteropMetrics::new_for_testing());
        let ibc = MockChainClient::default();
        let xcm = MockChainClient::default();
        let clients = Arc::new(ChainClients::new(
            Arc::new(ibc.clone()),
            Arc::new(xcm.clone()),
            Arc::new(MockChainClient::default()),
            metrics.clone(),
        ));
        let service = VerificationService::with_default_verifiers(
            registry,
            Arc::new(TtlVerificationCache::new(ttl, 100)),
            clients,
            Arc::new(MessageStore::new()),
            metrics.clone(),
        );
        Harness {
            service: Arc::new(service),
            ibc,
            xcm,
            metrics,
        }
    }

    #[tokio::test]
    async fn test_cached_within_ttl() {
        let h = harness(DEFAULT_VERIFICATION_CACHE_TTL);
        h.ibc.set_verification("tx1", Ok(true));
        let first = h
            .service
            .verify_transaction("tx1", "ibc", "cosmoshub-4", "tracepost-chain")
            .await
            .unwrap();
        let second = h
            .service
            .verify_transaction("tx1", "ibc", "cosmoshub-4", "tracepost-chain")
            .await
            .unwrap();
        assert_eq!(first, second);
        assert!(first.verified);
        assert!(first.proof_data.starts_with("ibc-proof-"));
        assert_eq!(h.ibc.verify_calls(), 1);
        assert_eq!(
            h.metrics
                .verification_cache_hit
                .with_label_values(&["IbcVerifier"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_verify_once() {
        let h = harness(DEFAULT_VERIFICATION_CACHE_TTL);
        h.xcm.set_verification("0xfeed", Ok(true));
        h.xcm.set_verify_delay(Duration::from_millis(100));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = h.service.clone();
                tokio::spawn(async move {
                    service
                        .verify_transaction("0xfeed", "xcm", "tracepost-chain", "parachain-2000")
                        .await
                })
            })
            .collect();
        let results: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();
        assert!(results.iter().all(|r| r == &results[0]));
        assert_eq!(h.xcm.verify_calls(), 1);
    }

    #[tokio::test]
    async fn test_auto_routes_cosmos_to_ibc() {
        let h = harness(DEFAULT_VERIFICATION_CACHE_TTL);
        h.ibc.set_verification("tx1", Ok(true));
        let result = h
            .service
            .verify_transaction("tx1", "auto", "cosmoshub-4", "tracepost-chain")
            .await
            .unwrap();
        assert!(result.verified);
        assert_eq!(h.ibc.verify_calls(), 1);
        assert_eq!(h.xcm.verify_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refreshed() {
        let h = harness(Duration::from_secs(300));
        h.ibc.set_verification("tx1", Ok(false));
        let first = h
            .service
            .verify_transaction("tx1", "ibc", "cosmoshub-4", "tracepost-chain")
            .await
            .unwrap();
        assert_eq!(first, VerificationResult { verified: false, proof_data: String::new() });

        h.ibc.set_verification("tx1", Ok(true));
        tokio::time::advance(Duration::from_secs(299)).await;
        let cached = h
            .service
            .verify_transaction("tx1", "ibc", "cosmoshub-4", "tracepost-chain")
            .await
            .unwrap();
        assert_eq!(cached, first);
        assert_eq!(h.ibc.verify_calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let refreshed = h
            .service
            .verify_transaction("tx1", "ibc", "cosmoshub-4", "tracepost-chain")
            .await
            .unwrap();
        assert!(refreshed.verified);
        assert_eq!(h.ibc.verify_calls(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let h = harness(DEFAULT_VERIFICATION_CACHE_TTL);
        h.ibc.set_verification(
            "tx1",
            Err(InteropError::RemoteTransient {
                chain_id: "cosmoshub-4".to_string(),
                message_id: String::new(),
                reason: "HTTP 503".to_string(),
            }),
        );
        let err = h
            .service
            .verify_transaction("tx1", "ibc", "cosmoshub-4", "tracepost-chain")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("tx1"));

        h.ibc.set_verification("tx1", Ok(true));
        assert!(h
            .service
            .verify_transaction("tx1", "ibc", "cosmoshub-4", "tracepost-chain")
            .await
            .unwrap()
            .verified);
        assert_eq!(h.ibc.verify_calls(), 2);
    }

    #[tokio::test]
    async fn test_generic_requires_registered_chains() {
        let h = harness(DEFAULT_VERIFICATION_CACHE_TTL);
        let result = h
            .service
            .verify_transaction("0xabc", "generic", "tracepost-chain", "eth-mainnet")
            .await
            .unwrap();
        assert!(result.verified);
        assert_eq!(
            result.proof_data,
            format!(
                "bridge-proof-{}",
                sha256_hex("0xabctracepost-chaineth-mainnet")
            )
        );
        assert!(matches!(
            h.service
                .verify_transaction("0xabc", "generic", "tracepost-chain", "unknown-chain")
                .await,
            Err(InteropError::NotRegistered { .. })
        ));
        assert!(matches!(
            h.service
                .verify_transaction("", "generic", "tracepost-chain", "eth-mainnet")
                .await,
            Err(InteropError::Validation(_))
        ));
    }
}
