// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Normalizes protocol-specific status terms into `CanonicalStatus`.
//!
//! Terminal statuses are remembered and returned without asking the remote chain again.
//! Only the most recently used entries are kept.

use crate::chain_registry::ChainRegistry;
use crate::client::{ChainClients, RemoteTarget};
use crate::error::{InteropError, InteropResult};
use crate::message_store::MessageStore;
use crate::types::{CanonicalStatus, CrossChainMessage, ProtocolFamily, ProtocolSelector};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_TERMINAL_STATUS_CAPACITY: usize = 10_000;

/// Maps a raw status term reported by a chain of `protocol`. Unknown terms are `Pending`.
pub fn map_status(protocol: ProtocolFamily, raw: &str) -> CanonicalStatus {
    let raw = raw.trim().to_lowercase();
    if raw.contains("fail") || raw.contains("error") || raw.contains("reject") {
        return CanonicalStatus::Failed;
    }
    match protocol {
        ProtocolFamily::Ibc => match raw.as_str() {
            "sent" | "submitted" => CanonicalStatus::Submitted,
            "received" | "relayed" => CanonicalStatus::Relayed,
            "acknowledged" | "success" | "completed" => CanonicalStatus::Completed,
            "timeout" | "timed_out" => CanonicalStatus::TimedOut,
            _ => CanonicalStatus::Pending,
        },
        ProtocolFamily::Xcm => match raw.as_str() {
            "sent" | "submitted" => CanonicalStatus::Submitted,
            "in_transit" | "relayed" => CanonicalStatus::Relayed,
            "executed" | "completed" => CanonicalStatus::Completed,
            "timeout" | "timed_out" => CanonicalStatus::TimedOut,
            _ => CanonicalStatus::Pending,
        },
        ProtocolFamily::Generic => match raw.as_str() {
            "submitted" => CanonicalStatus::Submitted,
            "relayed" => CanonicalStatus::Relayed,
            "verified" | "completed" => CanonicalStatus::Completed,
            "timed_out" => CanonicalStatus::TimedOut,
            _ => CanonicalStatus::Pending,
        },
    }
}

pub struct TransactionStatusTracker {
    registry: Arc<ChainRegistry>,
    clients: Arc<ChainClients>,
    messages: Arc<MessageStore>,
    terminal: Mutex<LruCache<String, CanonicalStatus>>,
}

impl TransactionStatusTracker {
    pub fn new(
        registry: Arc<ChainRegistry>,
        clients: Arc<ChainClients>,
        messages: Arc<MessageStore>,
    ) -> Self {
        Self::with_capacity(registry, clients, messages, DEFAULT_TERMINAL_STATUS_CAPACITY)
    }

    pub fn with_capacity(
        registry: Arc<ChainRegistry>,
        clients: Arc<ChainClients>,
        messages: Arc<MessageStore>,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            registry,
            clients,
            messages,
            terminal: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn remembered_terminal_statuses(&self) -> usize {
        self.terminal.lock().len()
    }

    pub async fn get_status(
        &self,
        tx_id: &str,
        protocol: &str,
        source_chain_id: &str,
    ) -> InteropResult<CanonicalStatus> {
        if tx_id.is_empty() || source_chain_id.is_empty() {
            return Err(InteropError::Validation(
                "tx_id and source_chain_id are required".to_string(),
            ));
        }
        let selector: ProtocolSelector = protocol.parse()?;
        let message = self
            .messages
            .find_by_id(tx_id)
            .filter(|m| m.source_chain_id == source_chain_id);
        let protocol = match (selector, &message) {
            (ProtocolSelector::Explicit(protocol), _) => protocol,
            (ProtocolSelector::Auto, Some(message)) => message.protocol,
            (ProtocolSelector::Auto, None) => selector.resolve(source_chain_id, ""),
        };

        let cache_key = format!("{}|{}|{}", tx_id, source_chain_id, protocol);
        let remembered = self.terminal.lock().get(&cache_key).copied();
        if let Some(status) = remembered {
            debug!(tx_id, "Returning recorded terminal status");
            return Ok(status);
        }
        if let Some(message) = &message {
            let status = CanonicalStatus::from(message.status);
            if status.is_terminal() {
                self.terminal.lock().put(cache_key, status);
                return Ok(status);
            }
        }

        let status = match protocol {
            ProtocolFamily::Generic => message
                .as_ref()
                .map(|m| CanonicalStatus::from(m.status))
                .ok_or_else(|| InteropError::not_registered("transaction", tx_id))?,
            ProtocolFamily::Ibc | ProtocolFamily::Xcm => {
                let chain_id = remote_chain(protocol, source_chain_id, message.as_ref(), &self.registry);
                let chain = self.registry.lookup(&chain_id)?;
                let raw = self
                    .clients
                    .get(protocol)
                    .query_status(&RemoteTarget::for_chain(&chain), tx_id)
                    .await?;
                let status = map_status(protocol, &raw);
                debug!(tx_id, %protocol, raw = %raw, status = status.as_str(), "Mapped remote status");
                status
            }
        };

        if let Some(message) = &message {
            if self
                .messages
                .transition(&message.key(), status.to_message_status(), None)
                .is_some()
            {
                info!(tx_id, status = status.as_str(), "Message status updated");
            }
        }
        if status.is_terminal() {
            self.terminal.lock().put(cache_key, status);
        }
        Ok(status)
    }
}

// The chain whose API reports status: for a known message, the side of the pair that speaks
// `protocol`; otherwise the source chain.
fn remote_chain(
    protocol: ProtocolFamily,
    source_chain_id: &str,
    message: Option<&CrossChainMessage>,
    registry: &ChainRegistry,
) -> String {
    let Some(message) = message else {
        return source_chain_id.to_string();
    };
    let speaks = |chain_id: &str| {
        registry
            .lookup(chain_id)
            .map(|c| c.protocol_family == protocol)
            .unwrap_or(false)
    };
    if !speaks(&message.source_chain_id) && speaks(&message.dest_chain_id) {
        message.dest_chain_id.clone()
    } else {
        message.source_chain_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockChainClient;
    use crate::metrics::InteropMetrics;
    use crate::test_utils::{register_test_chains, sample_generic_message};
    use crate::types::MessageStatus;

    struct Harness {
        tracker: TransactionStatusTracker,
        ibc: MockChainClient,
        xcm: MockChainClient,
        messages: Arc<MessageStore>,
    }

    fn harness() -> Harness {
        harness_with_capacity(DEFAULT_TERMINAL_STATUS_CAPACITY)
    }

    fn harness_with_capacity(capacity: usize) -> Harness {
        let registry = Arc::new(ChainRegistry::default());
        register_test_chains(&registry);
        let ibc = MockChainClient::default();
        let xcm = MockChainClient::default();
        let clients = Arc::new(ChainClients::new(
            Arc::new(ibc.clone()),
            Arc::new(xcm.clone()),
            Arc::new(MockChainClient::default()),
            Arc::new(InteropMetrics::new_for_testing()),
        ));
        let messages = Arc::new(MessageStore::new());
        Harness {
            tracker: TransactionStatusTracker::with_capacity(
                registry,
                clients,
                messages.clone(),
                capacity,
            ),
            ibc,
            xcm,
            messages,
        }
    }

    #[test]
    fn test_vocabulary_mapping() {
        use CanonicalStatus::*;
        let cases = [
            (ProtocolFamily::Ibc, "acknowledged", Completed),
            (ProtocolFamily::Ibc, "received", Relayed),
            (ProtocolFamily::Ibc, "sent", Submitted),
            (ProtocolFamily::Ibc, "timeout", TimedOut),
            (ProtocolFamily::Ibc, "completed", Completed),
            (ProtocolFamily::Ibc, "failed", Failed),
            (ProtocolFamily::Xcm, "Executed", Completed),
            (ProtocolFamily::Xcm, "in_transit", Relayed),
            (ProtocolFamily::Xcm, "ExecutionFailed", Failed),
            (ProtocolFamily::Xcm, "error", Failed),
            (ProtocolFamily::Xcm, "something-new", Pending),
        ];
        for (protocol, raw, expected) in cases {
            assert_eq!(map_status(protocol, raw), expected, "{} {}", protocol, raw);
        }
    }

    #[tokio::test]
    async fn test_terminal_status_is_not_requeried() {
        let h = harness();
        h.ibc.set_status("ABC", Ok("completed".to_string()));
        for _ in 0..3 {
            let status = h.tracker.get_status("ABC", "ibc", "cosmoshub-4").await.unwrap();
            assert_eq!(status, CanonicalStatus::Completed);
        }
        assert_eq!(h.ibc.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_terminal_memory_is_bounded() {
        let h = harness_with_capacity(2);
        for tx_id in ["A", "B", "C"] {
            h.ibc.set_status(tx_id, Ok("completed".to_string()));
            h.tracker.get_status(tx_id, "ibc", "cosmoshub-4").await.unwrap();
        }
        assert_eq!(h.tracker.remembered_terminal_statuses(), 2);
        assert_eq!(h.ibc.status_calls(), 3);

        // "A" was evicted first and is asked for again; "C" is still remembered.
        h.tracker.get_status("A", "ibc", "cosmoshub-4").await.unwrap();
        assert_eq!(h.ibc.status_calls(), 4);
        h.tracker.get_status("C", "ibc", "cosmoshub-4").await.unwrap();
        assert_eq!(h.ibc.status_calls(), 4);
        assert_eq!(h.tracker.remembered_terminal_statuses(), 2);
    }

    #[tokio::test]
    async fn test_non_terminal_status_is_requeried() {
        let h = harness();
        h.xcm.set_status("0xfeed", Ok("in_transit".to_string()));
        assert_eq!(
            h.tracker.get_status("0xfeed", "xcm", "parachain-2000").await.unwrap(),
            CanonicalStatus::Relayed
        );
        h.xcm.set_status("0xfeed", Ok("executed".to_string()));
        assert_eq!(
            h.tracker.get_status("0xfeed", "xcm", "parachain-2000").await.unwrap(),
            CanonicalStatus::Completed
        );
        assert_eq!(h.xcm.status_calls(), 2);
    }

    #[tokio::test]
    async fn test_generic_uses_message_store() {
        let h = harness();
        let mut message = sample_generic_message("0xabc");
        message.transition(MessageStatus::Submitted, None);
        let source = message.source_chain_id.clone();
        h.messages.insert(message).unwrap();
        assert_eq!(
            h.tracker.get_status("0xabc", "generic", &source).await.unwrap(),
            CanonicalStatus::Submitted
        );
        assert!(matches!(
            h.tracker.get_status("0xmissing", "generic", &source).await,
            Err(InteropError::NotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_remote_status_updates_stored_message() {
        let h = harness();
        let mut message = crate::test_utils::sample_ibc_message();
        message.message_id = "ABC".to_string();
        message.transition(MessageStatus::Submitted, None);
        let key = message.key();
        h.messages.insert(message).unwrap();
        h.ibc.set_status("ABC", Ok("failed".to_string()));
        assert_eq!(
            h.tracker.get_status("ABC", "auto", "cosmoshub-4").await.unwrap(),
            CanonicalStatus::Failed
        );
        let stored = h.messages.find_by_id("ABC").unwrap();
        assert_eq!(stored.key(), key);
        assert_eq!(stored.status, MessageStatus::Failed);
    }
}
