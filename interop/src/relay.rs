// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Builds protocol messages and submits them to the chain that executes them.
//!
//! Submission is a single attempt bounded by the client timeout. Transient failures are
//! returned to the caller marked retryable. Nothing is stored for a failed submission.

use crate::bridge_manager::BridgeManager;
use crate::builders::generic::{
    build_generic_data_share, build_generic_transfer, GenericDataShare, GenericTransferRequest,
    DEFAULT_DATA_STANDARD,
};
use crate::builders::content_hash;
use crate::builders::ibc::{build_ibc_packet, IbcPacketRequest, DEFAULT_IBC_TIMEOUT_MINUTES};
use crate::builders::xcm::{
    build_xcm_message, parachain_id_from_chain_id, XcmMessageRequest, XcmMessageType,
};
use crate::chain_registry::ChainRegistry;
use crate::client::{ChainClients, RemoteTarget, SubmitReceipt};
use crate::error::{InteropError, InteropResult};
use crate::ledger::LedgerReconciler;
use crate::message_store::MessageStore;
use crate::metrics::InteropMetrics;
use crate::standards::StandardRegistry;
use crate::types::{
    message_key, Bridge, BridgeConfig, ChainDescriptor, CrossChainMessage, MessageStatus,
    ProtocolFamily, IBC_CHANNEL_STATE_OPEN,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tap::TapFallible;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub default_ibc_timeout: chrono::Duration,
    // Generic bridge relay used when a bridge has none of its own.
    pub relay_endpoint: Option<String>,
    pub default_data_standard: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_ibc_timeout: chrono::Duration::minutes(DEFAULT_IBC_TIMEOUT_MINUTES),
            relay_endpoint: None,
            default_data_standard: DEFAULT_DATA_STANDARD.to_string(),
        }
    }
}

/// Local record a message is reconciled against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerLink {
    pub related_table: String,
    pub related_id: String,
}

#[derive(Clone, Debug)]
pub struct SendIbcPacket {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub channel_id: String,
    pub payload: Value,
    pub timeout_in_minutes: Option<i64>,
    pub link: Option<LedgerLink>,
}

#[derive(Clone, Debug)]
pub struct SendXcmMessage {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub message_type: String,
    pub payload: Value,
    pub link: Option<LedgerLink>,
}

#[derive(Clone, Debug)]
pub struct SendGenericTransfer {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub payload: Value,
    pub data_standard: Option<String>,
    pub link: Option<LedgerLink>,
}

/// A local record converted to a data standard and sent over whatever protocol the
/// destination chain speaks.
#[derive(Clone, Debug)]
pub struct ShareData {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub data: Value,
    // Unset or empty means the configured default standard.
    pub data_standard: Option<String>,
    pub link: Option<LedgerLink>,
}

#[derive(Clone, Debug)]
pub struct SharedData {
    pub message: CrossChainMessage,
    pub data_standard: String,
}

pub struct Relayer {
    registry: Arc<ChainRegistry>,
    bridges: Arc<BridgeManager>,
    clients: Arc<ChainClients>,
    messages: Arc<MessageStore>,
    ledger: Arc<LedgerReconciler>,
    metrics: Arc<InteropMetrics>,
    standards: Arc<StandardRegistry>,
    config: RelayConfig,
}

impl Relayer {
    pub fn new(
        registry: Arc<ChainRegistry>,
        bridges: Arc<BridgeManager>,
        clients: Arc<ChainClients>,
        messages: Arc<MessageStore>,
        ledger: Arc<LedgerReconciler>,
        metrics: Arc<InteropMetrics>,
        config: RelayConfig,
    ) -> Self {
        Self {
            registry,
            bridges,
            clients,
            messages,
            ledger,
            metrics,
            standards: Arc::new(StandardRegistry::default()),
            config,
        }
    }

    pub fn standards(&self) -> &Arc<StandardRegistry> {
        &self.standards
    }

    pub async fn send_ibc_packet(&self, request: SendIbcPacket) -> InteropResult<CrossChainMessage> {
        let source = self.registry.lookup_active(&request.source_chain_id)?;
        let dest = self.registry.lookup_active(&request.dest_chain_id)?;
        let bridge = self
            .bridges
            .get_bridge(&source.chain_id, &dest.chain_id, ProtocolFamily::Ibc)?;
        let channel = self.bridges.get_channel(&bridge.bridge_id, &request.channel_id)?;

        let chain = protocol_side(ProtocolFamily::Ibc, &source, &dest);
        let BridgeConfig::Ibc(config) = &bridge.config else {
            return Err(InteropError::Generic(format!(
                "Bridge {} has no IBC configuration",
                bridge.bridge_id
            )));
        };
        let target = RemoteTarget::new(
            chain.chain_id.clone(),
            config
                .node_endpoint
                .clone()
                .unwrap_or_else(|| chain.endpoint.clone()),
        )
        .with_api_key(
            config
                .api_key
                .clone()
                .or_else(|| chain.credentials.api_key.clone()),
        )
        .with_account(
            config
                .account_address
                .clone()
                .or_else(|| chain.credentials.account_address.clone()),
        );

        // Refused before a packet sequence is consumed.
        self.messages.ensure_absent(&message_key(
            &content_hash(&request.payload),
            &source.chain_id,
            &dest.chain_id,
        ))?;
        let client = self.clients.get(ProtocolFamily::Ibc);
        let latest_height = client.latest_block_height(&target).await;
        let sequence = self
            .bridges
            .next_packet_sequence(&bridge.bridge_id, &channel.channel_id)?;
        let message = build_ibc_packet(
            IbcPacketRequest {
                source_chain_id: source.chain_id.clone(),
                dest_chain_id: dest.chain_id.clone(),
                channel,
                sequence,
                payload: request.payload,
                timeout_in_minutes: request.timeout_in_minutes,
                sender: target.account.clone(),
                latest_height,
            },
            Some(bridge.bridge_id.clone()),
            self.config.default_ibc_timeout,
            Utc::now(),
        )?;
        self.submit(message, &target, request.link).await
    }

    pub async fn send_xcm_message(&self, request: SendXcmMessage) -> InteropResult<CrossChainMessage> {
        let message_type: XcmMessageType = request.message_type.parse()?;
        let source = self.registry.lookup_active(&request.source_chain_id)?;
        let dest = self.registry.lookup_active(&request.dest_chain_id)?;
        let bridge = self
            .bridges
            .get_bridge(&source.chain_id, &dest.chain_id, ProtocolFamily::Xcm)
            .ok();
        let config = match bridge.as_ref().map(|b| &b.config) {
            Some(BridgeConfig::Xcm(config)) => Some(config),
            _ => None,
        };

        let chain = protocol_side(ProtocolFamily::Xcm, &dest, &source);
        let destination_parachain = resolve_parachain(bridge.as_deref(), &dest)?;
        let target = RemoteTarget::new(chain.chain_id.clone(), chain.endpoint.clone())
            .with_api_key(
                config
                    .and_then(|c| c.api_key.clone())
                    .or_else(|| chain.credentials.api_key.clone()),
            )
            .with_account(config.and_then(|c| c.proxy_address.clone()));

        let message = build_xcm_message(
            XcmMessageRequest {
                source_chain_id: source.chain_id.clone(),
                dest_chain_id: dest.chain_id.clone(),
                destination_parachain,
                message_type,
                payload: request.payload,
            },
            bridge.map(|b| b.bridge_id.clone()),
            Utc::now(),
        )?;
        self.submit(message, &target, request.link).await
    }

    pub async fn send_generic(&self, request: SendGenericTransfer) -> InteropResult<CrossChainMessage> {
        let source = self.registry.lookup_active(&request.source_chain_id)?;
        let dest = self.registry.lookup_active(&request.dest_chain_id)?;
        let bridge = self
            .bridges
            .get_bridge(&source.chain_id, &dest.chain_id, ProtocolFamily::Generic)?;
        let target = self.generic_target(&bridge, &dest);

        let message = build_generic_transfer(
            GenericTransferRequest {
                source_chain_id: source.chain_id.clone(),
                dest_chain_id: dest.chain_id.clone(),
                bridge_id: bridge.bridge_id.clone(),
                payload: request.payload,
                data_standard: request
                    .data_standard
                    .or_else(|| Some(self.config.default_data_standard.clone())),
            },
            Utc::now(),
        )?;
        self.submit(message, &target, request.link).await
    }

    /// Converts the record to its data standard and routes it by the destination's protocol:
    /// the first open channel for IBC, a `data_transfer` Transact for XCM, the bridge relay
    /// otherwise.
    pub async fn share_data(&self, request: ShareData) -> InteropResult<SharedData> {
        let data_standard = request
            .data_standard
            .filter(|standard| !standard.trim().is_empty())
            .unwrap_or_else(|| self.config.default_data_standard.clone());
        let now = Utc::now();
        let standardized = self.standards.convert(&data_standard, &request.data, now)?;
        let source = self.registry.lookup_active(&request.source_chain_id)?;
        let dest = self.registry.lookup_active(&request.dest_chain_id)?;

        let message = match dest.protocol_family {
            ProtocolFamily::Ibc => {
                let bridge = self
                    .bridges
                    .get_bridge(&source.chain_id, &dest.chain_id, ProtocolFamily::Ibc)?;
                let channel_id = bridge
                    .channels
                    .values()
                    .find(|channel| channel.state == IBC_CHANNEL_STATE_OPEN)
                    .map(|channel| channel.channel_id.clone())
                    .ok_or_else(|| {
                        InteropError::Validation(format!(
                            "Bridge {} has no open IBC channel",
                            bridge.bridge_id
                        ))
                    })?;
                self.send_ibc_packet(SendIbcPacket {
                    source_chain_id: source.chain_id.clone(),
                    dest_chain_id: dest.chain_id.clone(),
                    channel_id,
                    payload: standardized,
                    timeout_in_minutes: None,
                    link: request.link,
                })
                .await?
            }
            ProtocolFamily::Xcm => {
                let encoded = serde_json::to_vec(&standardized).map_err(|e| {
                    InteropError::Generic(format!("Failed to encode shared data: {}", e))
                })?;
                self.send_xcm_message(SendXcmMessage {
                    source_chain_id: source.chain_id.clone(),
                    dest_chain_id: dest.chain_id.clone(),
                    message_type: XcmMessageType::DataTransfer.to_string(),
                    payload: json!({ "data": format!("0x{}", hex::encode(encoded)) }),
                    link: request.link,
                })
                .await?
            }
            ProtocolFamily::Generic => {
                let bridge = self
                    .bridges
                    .get_bridge(&source.chain_id, &dest.chain_id, ProtocolFamily::Generic)?;
                let target = self.generic_target(&bridge, &dest);
                let message = build_generic_data_share(
                    GenericDataShare {
                        bridge_id: bridge.bridge_id.clone(),
                        source_chain_id: source.chain_id.clone(),
                        dest_chain_id: dest.chain_id.clone(),
                        data_standard: data_standard.clone(),
                        data: standardized,
                        created_at: now,
                    },
                    now,
                )?;
                self.submit(message, &target, request.link).await?
            }
        };
        info!(
            message_id = %message.message_id,
            dest_chain_id = %message.dest_chain_id,
            data_standard = %data_standard,
            "Shared standardized data"
        );
        Ok(SharedData {
            message,
            data_standard,
        })
    }

    // The bridge's own relay, then the configured relay, then the destination chain itself.
    fn generic_target(&self, bridge: &Bridge, dest: &ChainDescriptor) -> RemoteTarget {
        let relay = bridge
            .config
            .endpoint()
            .map(str::to_string)
            .or_else(|| self.config.relay_endpoint.clone());
        let mut target = match relay {
            Some(relay) => {
                let mut target = RemoteTarget::new(dest.chain_id.clone(), relay);
                target.via_relay = true;
                target
            }
            None => RemoteTarget::new(dest.chain_id.clone(), dest.endpoint.clone()),
        };
        target.api_key = bridge
            .config
            .api_key()
            .map(str::to_string)
            .or_else(|| dest.credentials.api_key.clone());
        target
    }

    async fn submit(
        &self,
        mut message: CrossChainMessage,
        target: &RemoteTarget,
        link: Option<LedgerLink>,
    ) -> InteropResult<CrossChainMessage> {
        // A resend of a stored message is refused before it reaches the chain.
        self.messages.ensure_absent(&message.key())?;
        let receipt = self.clients.get(message.protocol).submit(target, &message).await?;
        apply_receipt(&mut message, &receipt);
        self.metrics
            .messages_submitted
            .with_label_values(&[message.protocol.as_str()])
            .inc();
        self.messages.insert(message.clone()).tap_err(|e| {
            warn!(
                message_id = %message.message_id,
                "Chain accepted a message whose id is already tracked: {:?}",
                e
            )
        })?;
        info!(
            message_id = %message.message_id,
            protocol = %message.protocol,
            source_chain_id = %message.source_chain_id,
            dest_chain_id = %message.dest_chain_id,
            status = message.status.as_str(),
            "Cross-chain message relayed"
        );
        if let Some(link) = link {
            self.ledger
                .on_message_submitted(&link.related_table, &link.related_id, &message)
                .await;
        }
        Ok(message)
    }
}

// A returned transaction hash replaces the content hash as the message id. The message only
// counts as submitted when the chain confirms it synchronously with a hash.
fn apply_receipt(message: &mut CrossChainMessage, receipt: &SubmitReceipt) {
    if let Some(tx_id) = &receipt.tx_id {
        message.message_id = tx_id.clone();
        if !receipt.queued {
            message.transition(MessageStatus::Submitted, None);
        }
    }
}

// The side of the pair that speaks `protocol`, preferring `first`.
fn protocol_side<'a>(
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

fn resolve_parachain(bridge: Option<&Bridge>, dest: &ChainDescriptor) -> InteropResult<u32> {
    let configured = bridge.and_then(|b| match &b.config {
        BridgeConfig::Xcm(config) if dest.protocol_family == ProtocolFamily::Xcm => {
            config.parachain_id.as_deref()
        }
        _ => None,
    });
    if let Some(parachain_id) = configured {
        return parachain_id.trim().parse().map_err(|_| {
            InteropError::Validation(format!("Invalid parachain id {}", parachain_id))
        });
    }
    parachain_id_from_chain_id(&dest.chain_id).ok_or_else(|| {
        InteropError::Validation(format!(
            "Cannot determine the parachain id of {}",
            dest.chain_id
        ))
    })
}
