// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::builders::generic::{GenericTransfer, DEFAULT_DATA_STANDARD};
use crate::builders::ibc::{build_ibc_packet, IbcPacketRequest};
use crate::builders::new_message;
use crate::builders::xcm::{build_xcm_message, XcmMessageRequest, XcmMessageType};
use crate::chain_registry::{ChainRegistry, RegisterChainRequest};
use crate::client::mock::MockChainClient;
use crate::client::ChainClients;
use crate::metrics::InteropMetrics;
use crate::types::{Channel, CrossChainMessage, MessagePayload, RegisteredAsset};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

pub const TEST_BENEFICIARY: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

/// Registers cosmoshub-4 (ibc), tracepost-chain (generic), parachain-2000 (xcm) and
/// eth-mainnet (generic).
pub fn register_test_chains(registry: &ChainRegistry) {
    for (chain_id, chain_type, endpoint) in [
        ("cosmoshub-4", "cosmos", "http://cosmos.test:1317"),
        ("tracepost-chain", "generic", "http://tracepost.test:8080"),
        ("parachain-2000", "polkadot", "http://parachain.test:9944"),
        ("eth-mainnet", "evm", "http://eth.test:8545"),
    ] {
        registry
            .register_chain(RegisterChainRequest::from_chain_type(
                chain_id, chain_type, endpoint,
            ))
            .unwrap();
    }
}

pub fn sample_asset(symbol: &str) -> RegisteredAsset {
    RegisteredAsset {
        asset_id: symbol.to_lowercase(),
        decimals: 10,
        symbol: symbol.to_string(),
        location_format: "V3".to_string(),
        parent_chain: "parachain-2000".to_string(),
        is_reserve: false,
        is_native: true,
    }
}

/// Pending generic transfer from tracepost-chain to eth-mainnet with the given id.
pub fn sample_generic_message(message_id: &str) -> CrossChainMessage {
    let now = Utc::now();
    let transfer = GenericTransfer {
        bridge_id: "generic-eth-mainnet-tracepost-chain".to_string(),
        asset_id: "usdc".to_string(),
        amount: 2500,
        sender: "0xabc".to_string(),
        recipient: "0xdef".to_string(),
        source_chain_id: "tracepost-chain".to_string(),
        dest_chain_id: "eth-mainnet".to_string(),
        data_standard: DEFAULT_DATA_STANDARD.to_string(),
        created_at: now,
    };
    new_message(
        message_id.to_string(),
        "tracepost-chain",
        "eth-mainnet",
        Some(transfer.bridge_id.clone()),
        MessagePayload::Generic(transfer),
        now,
        None,
    )
}

/// Packet `{"amount":100}` on channel-0 from cosmoshub-4 to tracepost-chain, without a sender.
pub fn sample_ibc_message() -> CrossChainMessage {
    build_ibc_packet(
        IbcPacketRequest {
            source_chain_id: "cosmoshub-4".to_string(),
            dest_chain_id: "tracepost-chain".to_string(),
            channel: Channel::new("channel-0", "transfer", "channel-7", "transfer", "connection-0"),
            sequence: 1,
            payload: json!({"amount": 100}),
            timeout_in_minutes: None,
            sender: None,
            latest_height: None,
        },
        Some("ibc-cosmoshub-4-tracepost-chain".to_string()),
        Duration::minutes(30),
        Utc::now(),
    )
    .unwrap()
}

/// Transfer of 1000 to parachain 2000.
pub fn sample_xcm_message() -> CrossChainMessage {
    build_xcm_message(
        XcmMessageRequest {
            source_chain_id: "tracepost-chain".to_string(),
            dest_chain_id: "parachain-2000".to_string(),
            destination_parachain: 2000,
            message_type: XcmMessageType::Transfer,
            payload: json!({"amount": 1000, "beneficiary": TEST_BENEFICIARY}),
        },
        None,
        Utc::now(),
    )
    .unwrap()
}

pub struct MockClients {
    pub clients: Arc<ChainClients>,
    pub ibc: MockChainClient,
    pub xcm: MockChainClient,
    pub generic: MockChainClient,
}

pub fn mock_clients(metrics: Arc<InteropMetrics>) -> MockClients {
    let (ibc, xcm, generic) = (
        MockChainClient::default(),
        MockChainClient::default(),
        MockChainClient::default(),
    );
    MockClients {
        clients: Arc::new(ChainClients::new(
            Arc::new(ibc.clone()),
            Arc::new(xcm.clone()),
            Arc::new(generic.clone()),
            metrics,
        )),
        ibc,
        xcm,
        generic,
    }
}
