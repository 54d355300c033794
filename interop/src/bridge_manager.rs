// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bridges between registered chains, keyed by the unordered chain pair and protocol.

use crate::chain_registry::ChainRegistry;
use crate::error::{InteropError, InteropResult};
use crate::types::{
    Bridge, BridgeConfig, BridgeState, Channel, ProtocolFamily, RegisteredAsset,
};
use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

/// Sorted chain pair plus protocol. `(a, b)` and `(b, a)` map to the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BridgeKey {
    low: String,
    high: String,
    protocol: ProtocolFamily,
}

impl BridgeKey {
    pub fn new(a: &str, b: &str, protocol: ProtocolFamily) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: low.to_string(),
            high: high.to_string(),
            protocol,
        }
    }

    pub fn bridge_id(&self) -> String {
        format!("{}-{}-{}", self.protocol, self.low, self.high)
    }
}

#[derive(Clone, Default)]
struct BridgeTable {
    by_key: BTreeMap<BridgeKey, Arc<Bridge>>,
    key_by_id: HashMap<String, BridgeKey>,
}

pub struct BridgeManager {
    registry: Arc<ChainRegistry>,
    table: ArcSwap<BridgeTable>,
    write_lock: Mutex<()>,
    // Next IBC packet sequence per (bridge_id, channel_id). Starts at 1.
    packet_sequences: DashMap<(String, String), u64>,
}

impl BridgeManager {
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self {
            registry,
            table: ArcSwap::from_pointee(BridgeTable::default()),
            write_lock: Mutex::new(()),
            packet_sequences: DashMap::new(),
        }
    }

    /// Creates a bridge between two registered chains, or updates the configuration of the
    /// existing bridge for the same pair and protocol. Channels and assets are preserved.
    pub fn create_bridge(
        &self,
        source_chain_id: &str,
        dest_chain_id: &str,
        protocol: ProtocolFamily,
        config: BridgeConfig,
    ) -> InteropResult<String> {
        if source_chain_id == dest_chain_id {
            return Err(InteropError::Validation(
                "A bridge needs two distinct chains".into(),
            ));
        }
        if config.protocol() != protocol {
            return Err(InteropError::ProtocolMismatch {
                chain_id: format!("{}<->{}", source_chain_id, dest_chain_id),
                expected: protocol.to_string(),
                found: config.protocol().to_string(),
            });
        }
        let source = self.registry.lookup_active(source_chain_id)?;
        let dest = self.registry.lookup_active(dest_chain_id)?;
        for chain in [&source, &dest] {
            if !chain.protocol_family.compatible_with(protocol) {
                return Err(InteropError::ProtocolMismatch {
                    chain_id: chain.chain_id.clone(),
                    expected: protocol.to_string(),
                    found: chain.protocol_family.to_string(),
                });
            }
        }
        // At least one side has to actually speak the protocol.
        if protocol != ProtocolFamily::Generic
            && source.protocol_family != protocol
            && dest.protocol_family != protocol
        {
            return Err(InteropError::ProtocolMismatch {
                chain_id: format!("{}<->{}", source_chain_id, dest_chain_id),
                expected: protocol.to_string(),
                found: ProtocolFamily::Generic.to_string(),
            });
        }

        let key = BridgeKey::new(source_chain_id, dest_chain_id, protocol);
        let bridge_id = key.bridge_id();
        let _guard = self.write_lock.lock();
        let mut table = (**self.table.load()).clone();
        let bridge = match table.by_key.get(&key) {
            Some(existing) => {
                let mut updated = (**existing).clone();
                updated.config = config;
                updated.state = BridgeState::Active;
                updated
            }
            None => Bridge {
                bridge_id: bridge_id.clone(),
                source_chain_id: source_chain_id.to_string(),
                dest_chain_id: dest_chain_id.to_string(),
                protocol_family: protocol,
                state: BridgeState::Active,
                config,
                channels: BTreeMap::new(),
                assets: BTreeMap::new(),
                created_at: Utc::now(),
            },
        };
        table.key_by_id.insert(bridge_id.clone(), key.clone());
        table.by_key.insert(key, Arc::new(bridge));
        self.table.store(Arc::new(table));
        info!(
            bridge_id = %bridge_id,
            source_chain_id,
            dest_chain_id,
            protocol = %protocol,
            "Bridge created"
        );
        Ok(bridge_id)
    }

    /// Returns the bridge between `a` and `b` regardless of the order they were given in.
    /// When several protocols bridge the same pair, IBC is preferred, then XCM, then generic.
    pub fn get_bridge_for_pair(&self, a: &str, b: &str) -> InteropResult<Arc<Bridge>> {
        let table = self.table.load();
        ProtocolFamily::ALL
            .iter()
            .find_map(|protocol| table.by_key.get(&BridgeKey::new(a, b, *protocol)).cloned())
            .ok_or_else(|| InteropError::BridgeNotFound(format!("{}<->{}", a, b)))
    }

    pub fn get_bridge(
        &self,
        a: &str,
        b: &str,
        protocol: ProtocolFamily,
    ) -> InteropResult<Arc<Bridge>> {
        let key = BridgeKey::new(a, b, protocol);
        self.table
            .load()
            .by_key
            .get(&key)
            .cloned()
            .ok_or_else(|| InteropError::BridgeNotFound(key.bridge_id()))
    }

    pub fn get_bridge_by_id(&self, bridge_id: &str) -> InteropResult<Arc<Bridge>> {
        let table = self.table.load();
        table
            .key_by_id
            .get(bridge_id)
            .and_then(|key| table.by_key.get(key))
            .cloned()
            .ok_or_else(|| InteropError::BridgeNotFound(bridge_id.to_string()))
    }

    pub fn list_bridges(&self) -> Vec<Arc<Bridge>> {
        self.table.load().by_key.values().cloned().collect()
    }

    /// Upserts an IBC channel keyed by channel id.
    pub fn add_channel(&self, bridge_id: &str, channel: Channel) -> InteropResult<()> {
        if channel.channel_id.is_empty() || channel.port_id.is_empty() {
            return Err(InteropError::Validation(
                "channel_id and port_id are required".into(),
            ));
        }
        let channel_id = channel.channel_id.clone();
        self.update_bridge(bridge_id, ProtocolFamily::Ibc, |bridge| {
            bridge.channels.insert(channel.channel_id.clone(), channel);
        })?;
        info!(bridge_id, channel_id = %channel_id, "IBC channel upserted");
        Ok(())
    }

    /// Upserts an XCM asset keyed by asset id.
    pub fn register_asset(&self, bridge_id: &str, asset: RegisteredAsset) -> InteropResult<()> {
        if asset.asset_id.is_empty() {
            return Err(InteropError::Validation("asset_id is required".into()));
        }
        let asset_id = asset.asset_id.clone();
        self.update_bridge(bridge_id, ProtocolFamily::Xcm, |bridge| {
            bridge.assets.insert(asset.asset_id.clone(), asset);
        })?;
        info!(bridge_id, asset_id = %asset_id, "XCM asset upserted");
        Ok(())
    }

    pub fn get_channel(&self, bridge_id: &str, channel_id: &str) -> InteropResult<Channel> {
        self.get_bridge_by_id(bridge_id)?
            .channels
            .get(channel_id)
            .cloned()
            .ok_or_else(|| InteropError::ChannelNotFound {
                bridge_id: bridge_id.to_string(),
                channel_id: channel_id.to_string(),
            })
    }

    /// Hands out the next packet sequence for a channel. Sequences start at 1 and never repeat.
    pub fn next_packet_sequence(&self, bridge_id: &str, channel_id: &str) -> InteropResult<u64> {
        self.get_channel(bridge_id, channel_id)?;
        let mut entry = self
            .packet_sequences
            .entry((bridge_id.to_string(), channel_id.to_string()))
            .or_insert(1);
        let sequence = *entry;
        *entry += 1;
        Ok(sequence)
    }

    /// Marks every bridge touching `chain_id` inactive. Returns how many changed.
    pub fn mark_chain_inactive(&self, chain_id: &str) -> usize {
        let _guard = self.write_lock.lock();
        let mut table = (**self.table.load()).clone();
        let mut changed = 0;
        for bridge in table.by_key.values_mut() {
            if bridge.connects(chain_id) && bridge.state == BridgeState::Active {
                let mut updated = (**bridge).clone();
                updated.state = BridgeState::Inactive;
                *bridge = Arc::new(updated);
                changed += 1;
            }
        }
        if changed > 0 {
            self.table.store(Arc::new(table));
            info!(chain_id, count = changed, "Bridges marked inactive");
        }
        changed
    }

    fn update_bridge(
        &self,
        bridge_id: &str,
        expected: ProtocolFamily,
        f: impl FnOnce(&mut Bridge),
    ) -> InteropResult<()> {
        let _guard = self.write_lock.lock();
        let mut table = (**self.table.load()).clone();
        let key = table
            .key_by_id
            .get(bridge_id)
            .cloned()
            .ok_or_else(|| InteropError::BridgeNotFound(bridge_id.to_string()))?;
        let current = table
            .by_key
            .get(&key)
            .ok_or_else(|| InteropError::BridgeNotFound(bridge_id.to_string()))?;
        if current.protocol_family != expected {
            return Err(InteropError::ProtocolMismatch {
                chain_id: bridge_id.to_string(),
                expected: expected.to_string(),
                found: current.protocol_family.to_string(),
            });
        }
        let mut updated = (**current).clone();
        f(&mut updated);
        table.by_key.insert(key, Arc::new(updated));
        self.table.store(Arc::new(table));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{register_test_chains, sample_asset};

    fn manager() -> BridgeManager {
        let registry = Arc::new(ChainRegistry::default());
        register_test_chains(&registry);
        BridgeManager::new(registry)
    }

    #[test]
    fn test_bidirectional_lookup() {
        let manager = manager();
        for (a, b, protocol) in [
            ("cosmoshub-4", "tracepost-chain", ProtocolFamily::Ibc),
            ("tracepost-chain", "parachain-2000", ProtocolFamily::Xcm),
            ("eth-mainnet", "tracepost-chain", ProtocolFamily::Generic),
        ] {
            let id = manager
                .create_bridge(a, b, protocol, BridgeConfig::default_for(protocol))
                .unwrap();
            let forward = manager.get_bridge_for_pair(a, b).unwrap();
            let reversed = manager.get_bridge_for_pair(b, a).unwrap();
            assert_eq!(forward.bridge_id, id);
            assert_eq!(forward, reversed);
            // Direction is kept as metadata.
            assert_eq!(reversed.source_chain_id, a);
            assert_eq!(reversed.dest_chain_id, b);
        }
        assert_eq!(manager.list_bridges().len(), 3);
    }

    #[test]
    fn test_create_bridge_validation() {
        let manager = manager();
        assert!(matches!(
            manager.create_bridge(
                "cosmoshub-4",
                "unknown-chain",
                ProtocolFamily::Ibc,
                BridgeConfig::default_for(ProtocolFamily::Ibc)
            ),
            Err(InteropError::NotRegistered { .. })
        ));
        // IBC chain cannot join an XCM bridge.
        assert!(matches!(
            manager.create_bridge(
                "cosmoshub-4",
                "parachain-2000",
                ProtocolFamily::Xcm,
                BridgeConfig::default_for(ProtocolFamily::Xcm)
            ),
            Err(InteropError::ProtocolMismatch { .. })
        ));
        // Two generic chains cannot form an IBC bridge.
        assert!(matches!(
            manager.create_bridge(
                "eth-mainnet",
                "tracepost-chain",
                ProtocolFamily::Ibc,
                BridgeConfig::default_for(ProtocolFamily::Ibc)
            ),
            Err(InteropError::ProtocolMismatch { .. })
        ));
        // Config must match the requested protocol.
        assert!(matches!(
            manager.create_bridge(
                "cosmoshub-4",
                "tracepost-chain",
                ProtocolFamily::Ibc,
                BridgeConfig::default_for(ProtocolFamily::Xcm)
            ),
            Err(InteropError::ProtocolMismatch { .. })
        ));
    }

    #[test]
    fn test_channels_and_assets_are_upserts() {
        let manager = manager();
        let ibc = manager
            .create_bridge(
                "cosmoshub-4",
                "tracepost-chain",
                ProtocolFamily::Ibc,
                BridgeConfig::default_for(ProtocolFamily::Ibc),
            )
            .unwrap();
        let xcm = manager
            .create_bridge(
                "tracepost-chain",
                "parachain-2000",
                ProtocolFamily::Xcm,
                BridgeConfig::default_for(ProtocolFamily::Xcm),
            )
            .unwrap();

        let channel = Channel::new("channel-0", "transfer", "channel-7", "transfer", "connection-0");
        manager.add_channel(&ibc, channel.clone()).unwrap();
        let mut updated = channel;
        updated.counterparty_channel_id = "channel-8".to_string();
        manager.add_channel(&ibc, updated).unwrap();
        let bridge = manager.get_bridge_by_id(&ibc).unwrap();
        assert_eq!(bridge.channels.len(), 1);
        assert_eq!(bridge.channels["channel-0"].counterparty_channel_id, "channel-8");

        manager.register_asset(&xcm, sample_asset("DOT")).unwrap();
        manager.register_asset(&xcm, sample_asset("DOT")).unwrap();
        assert_eq!(manager.get_bridge_by_id(&xcm).unwrap().assets.len(), 1);

        assert!(matches!(
            manager.register_asset("missing", sample_asset("DOT")),
            Err(InteropError::BridgeNotFound(_))
        ));
        assert!(matches!(
            manager.add_channel(
                "missing",
                Channel::new("channel-1", "transfer", "channel-2", "transfer", "c")
            ),
            Err(InteropError::BridgeNotFound(_))
        ));
        assert!(matches!(
            manager.register_asset(&ibc, sample_asset("ATOM")),
            Err(InteropError::ProtocolMismatch { .. })
        ));
    }

    #[test]
    fn test_recreating_bridge_keeps_channels() {
        let manager = manager();
        let id = manager
            .create_bridge(
                "cosmoshub-4",
                "tracepost-chain",
                ProtocolFamily::Ibc,
                BridgeConfig::default_for(ProtocolFamily::Ibc),
            )
            .unwrap();
        manager
            .add_channel(&id, Channel::new("channel-0", "transfer", "channel-7", "transfer", "c"))
            .unwrap();
        let again = manager
            .create_bridge(
                "tracepost-chain",
                "cosmoshub-4",
                ProtocolFamily::Ibc,
                BridgeConfig::default_for(ProtocolFamily::Ibc),
            )
            .unwrap();
        assert_eq!(id, again);
        assert_eq!(manager.get_bridge_by_id(&id).unwrap().channels.len(), 1);
    }

    #[test]
    fn test_packet_sequence_and_deactivation() {
        let manager = manager();
        let id = manager
            .create_bridge(
                "cosmoshub-4",
                "tracepost-chain",
                ProtocolFamily::Ibc,
                BridgeConfig::default_for(ProtocolFamily::Ibc),
            )
            .unwrap();
        assert!(matches!(
            manager.next_packet_sequence(&id, "channel-0"),
            Err(InteropError::ChannelNotFound { .. })
        ));
        manager
            .add_channel(&id, Channel::new("channel-0", "transfer", "channel-7", "transfer", "c"))
            .unwrap();
        assert_eq!(manager.next_packet_sequence(&id, "channel-0").unwrap(), 1);
        assert_eq!(manager.next_packet_sequence(&id, "channel-0").unwrap(), 2);

        assert_eq!(manager.mark_chain_inactive("cosmoshub-4"), 1);
        assert_eq!(manager.mark_chain_inactive("cosmoshub-4"), 0);
        assert_eq!(
            manager.get_bridge_by_id(&id).unwrap().state,
            BridgeState::Inactive
        );
    }
}
