// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::bridge_manager::BridgeManager;
use crate::chain_registry::{validate_endpoint, ChainRegistry, RegisterChainRequest};
use crate::client::ChainClients;
use crate::error::{InteropError, InteropResult};
use crate::ledger::{LedgerReconciler, LedgerStore};
use crate::message_store::MessageStore;
use crate::metrics::InteropMetrics;
use crate::relay::{
    LedgerLink, RelayConfig, Relayer, SendGenericTransfer, SendIbcPacket, SendXcmMessage,
    ShareData,
};
use crate::standards::DataStandardConverter;
use crate::status_tracker::TransactionStatusTracker;
use crate::types::{
    BridgeConfig, Channel, ChainCredentials, ChainDescriptor, CrossChainMessage,
    GenericBridgeConfig, IbcBridgeConfig, MessageStatus, ProtocolFamily, RegisteredAsset,
    XcmBridgeConfig,
};
use crate::verification::{VerificationCache, VerificationService};
use async_trait::async_trait;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use std::sync::Arc;
use tap::TapFallible;
use tracing::{info, warn};

pub const CHAIN_DEACTIVATED_REASON: &str = "chain deactivated";
// Ledger table that shared batches are reconciled against.
pub const BATCHES_TABLE: &str = "batches";

#[derive(Clone, Debug, Deserialize)]
pub struct RegisterChainBody {
    pub chain_id: String,
    pub chain_type: String,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub account_address: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CosmosBridgeBody {
    pub chain_id: String,
    #[serde(default)]
    pub node_endpoint: Option<String>,
    #[serde(default)]
    pub account_address: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct PolkadotBridgeBody {
    pub chain_id: String,
    #[serde(default)]
    pub relay_endpoint: Option<String>,
    #[serde(default)]
    pub relay_chain_id: Option<String>,
    // Accepted as a number or a numeric string.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub parachain_id: Option<u32>,
    #[serde(default)]
    pub proxy_address: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GenericBridgeBody {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    #[serde(default)]
    pub relay_endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IbcChannelBody {
    pub chain_id: String,
    pub channel_id: String,
    pub port_id: String,
    pub counterparty_channel_id: String,
    pub counterparty_port_id: String,
    pub connection_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct XcmAssetBody {
    pub chain_id: String,
    pub asset_id: String,
    pub symbol: String,
    #[serde(default)]
    pub decimals: u8,
    #[serde(default)]
    pub location_format: String,
    #[serde(default)]
    pub parent_chain: String,
    #[serde(default)]
    pub is_reserve: bool,
    #[serde(default)]
    pub is_native: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IbcSendBody {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub channel_id: String,
    pub payload: Value,
    #[serde(default)]
    pub timeout_in_minutes: Option<i64>,
    #[serde(default)]
    pub related_table: Option<String>,
    #[serde(default)]
    pub related_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct XcmSendBody {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub message_type: String,
    pub payload: Value,
    #[serde(default)]
    pub related_table: Option<String>,
    #[serde(default)]
    pub related_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GenericSendBody {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub payload: Value,
    #[serde(default)]
    pub data_standard: Option<String>,
    #[serde(default)]
    pub related_table: Option<String>,
    #[serde(default)]
    pub related_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ShareBatchBody {
    pub batch_id: String,
    pub dest_chain_id: String,
    // The batch record to convert and share.
    pub data: Value,
    #[serde(default)]
    pub data_standard: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VerifyBody {
    pub tx_id: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub source_chain_id: String,
    pub dest_chain_id: String,
}

fn default_protocol() -> String {
    "auto".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    pub connection_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub bridge_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub bridge_id: String,
    pub channel_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetResponse {
    pub bridge_id: String,
    pub asset_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketResponse {
    pub packet_id: String,
    pub status: MessageStatus,
    pub timeout_timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message_id: String,
    pub status: MessageStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareBatchResponse {
    pub batch_id: String,
    pub message_id: String,
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub protocol: ProtocolFamily,
    pub data_standard: String,
    pub status: MessageStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub proof_data: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateResponse {
    pub chain_id: String,
    pub bridges_deactivated: usize,
    pub messages_failed: usize,
}

#[async_trait]
pub trait InteropRequestHandlerTrait {
    // When false every /interop route is refused.
    fn is_enabled(&self) -> bool;

    async fn handle_register_chain(
        &self,
        body: RegisterChainBody,
    ) -> Result<Json<ConnectionResponse>, InteropError>;

    async fn handle_list_chains(&self) -> Result<Json<Vec<ChainDescriptor>>, InteropError>;

    async fn handle_get_chain(&self, chain_id: String)
        -> Result<Json<ChainDescriptor>, InteropError>;

    // Deactivates a chain, its bridges and fails its in-flight messages.
    async fn handle_deactivate_chain(
        &self,
        chain_id: String,
    ) -> Result<Json<DeactivateResponse>, InteropError>;

    async fn handle_create_cosmos_bridge(
        &self,
        body: CosmosBridgeBody,
    ) -> Result<Json<BridgeResponse>, InteropError>;

    async fn handle_create_polkadot_bridge(
        &self,
        body: PolkadotBridgeBody,
    ) -> Result<Json<BridgeResponse>, InteropError>;

    async fn handle_create_generic_bridge(
        &self,
        body: GenericBridgeBody,
    ) -> Result<Json<BridgeResponse>, InteropError>;

    async fn handle_add_ibc_channel(
        &self,
        body: IbcChannelBody,
    ) -> Result<Json<ChannelResponse>, InteropError>;

    async fn handle_register_xcm_asset(
        &self,
        body: XcmAssetBody,
    ) -> Result<Json<AssetResponse>, InteropError>;

    async fn handle_send_ibc_packet(
        &self,
        body: IbcSendBody,
    ) -> Result<Json<PacketResponse>, InteropError>;

    async fn handle_send_xcm_message(
        &self,
        body: XcmSendBody,
    ) -> Result<Json<MessageResponse>, InteropError>;

    async fn handle_send_generic(
        &self,
        body: GenericSendBody,
    ) -> Result<Json<MessageResponse>, InteropError>;

    async fn handle_share_batch(
        &self,
        body: ShareBatchBody,
    ) -> Result<Json<ShareBatchResponse>, InteropError>;

    async fn handle_get_status(
        &self,
        protocol: String,
        source_chain_id: String,
        tx_id: String,
    ) -> Result<Json<StatusResponse>, InteropError>;

    async fn handle_verify(&self, body: VerifyBody) -> Result<Json<VerifyResponse>, InteropError>;

    async fn handle_get_message(
        &self,
        message_id: String,
    ) -> Result<Json<CrossChainMessage>, InteropError>;
}

/// Wires the interop components together for one node.
pub struct InteropRequestHandler {
    enabled: bool,
    local_chain_id: String,
    registry: Arc<ChainRegistry>,
    bridges: Arc<BridgeManager>,
    relayer: Relayer,
    verification: VerificationService,
    tracker: TransactionStatusTracker,
    messages: Arc<MessageStore>,
    ledger: Arc<LedgerReconciler>,
    metrics: Arc<InteropMetrics>,
}

impl InteropRequestHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        enabled: bool,
        local_chain_id: String,
        registry: Arc<ChainRegistry>,
        clients: Arc<ChainClients>,
        cache: Arc<dyn VerificationCache>,
        ledger_store: Arc<dyn LedgerStore>,
        relay_config: RelayConfig,
        metrics: Arc<InteropMetrics>,
    ) -> Self {
        let bridges = Arc::new(BridgeManager::new(registry.clone()));
        let messages = Arc::new(MessageStore::new());
        let ledger = Arc::new(LedgerReconciler::new(ledger_store, metrics.clone()));
        let relayer = Relayer::new(
            registry.clone(),
            bridges.clone(),
            clients.clone(),
            messages.clone(),
            ledger.clone(),
            metrics.clone(),
            relay_config,
        );
        let verification = VerificationService::with_default_verifiers(
            registry.clone(),
            cache,
            clients.clone(),
            messages.clone(),
            metrics.clone(),
        );
        let tracker = TransactionStatusTracker::new(registry.clone(), clients, messages.clone());
        Self {
            enabled,
            local_chain_id,
            registry,
            bridges,
            relayer,
            verification,
            tracker,
            messages,
            ledger,
            metrics,
        }
    }

    pub fn messages(&self) -> &Arc<MessageStore> {
        &self.messages
    }

    pub fn ledger(&self) -> &Arc<LedgerReconciler> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    pub fn bridges(&self) -> &Arc<BridgeManager> {
        &self.bridges
    }

    /// Adds or replaces the converter used when sharing data in `standard`.
    pub fn register_standard_converter(
        &self,
        standard: &str,
        converter: Arc<dyn DataStandardConverter>,
    ) {
        self.relayer.standards().register(standard, converter);
    }

    /// Registers a chain and keeps the chain gauge current.
    pub fn register_chain(&self, request: RegisterChainRequest) -> InteropResult<String> {
        let connection_id = self.registry.register_chain(request)?;
        self.update_chain_gauge();
        Ok(connection_id)
    }

    fn update_chain_gauge(&self) {
        let active = self.registry.list().iter().filter(|c| c.active).count();
        self.metrics.registered_chains.set(active as i64);
    }

    fn link(related_table: Option<String>, related_id: Option<String>) -> Option<LedgerLink> {
        match (related_table, related_id) {
            (Some(related_table), Some(related_id))
                if !related_table.is_empty() && !related_id.is_empty() =>
            {
                Some(LedgerLink {
                    related_table,
                    related_id,
                })
            }
            _ => None,
        }
    }

    fn local_bridge(&self, chain_id: &str, protocol: ProtocolFamily) -> InteropResult<String> {
        require("chain_id", chain_id)?;
        Ok(self
            .bridges
            .get_bridge(chain_id, &self.local_chain_id, protocol)?
            .bridge_id
            .clone())
    }
}

fn require(field: &str, value: &str) -> InteropResult<()> {
    if value.trim().is_empty() {
        return Err(InteropError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn validate_optional_endpoint(endpoint: &Option<String>) -> InteropResult<()> {
    if let Some(endpoint) = endpoint {
        validate_endpoint(endpoint)?;
    }
    Ok(())
}

#[async_trait]
impl InteropRequestHandlerTrait for InteropRequestHandler {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn handle_register_chain(
        &self,
        body: RegisterChainBody,
    ) -> Result<Json<ConnectionResponse>, InteropError> {
        require("chain_id", &body.chain_id)?;
        require("chain_type", &body.chain_type)?;
        let mut request =
            RegisterChainRequest::from_chain_type(body.chain_id, body.chain_type, body.endpoint);
        request.credentials = ChainCredentials {
            api_key: body.api_key,
            account_address: body.account_address,
        };
        let connection_id = self.register_chain(request)?;
        Ok(Json(ConnectionResponse { connection_id }))
    }

    async fn handle_list_chains(&self) -> Result<Json<Vec<ChainDescriptor>>, InteropError> {
        Ok(Json(
            self.registry
                .list()
                .into_iter()
                .map(|chain| (*chain).clone())
                .collect(),
        ))
    }

    async fn handle_get_chain(
        &self,
        chain_id: String,
    ) -> Result<Json<ChainDescriptor>, InteropError> {
        Ok(Json((*self.registry.lookup(&chain_id)?).clone()))
    }

    async fn handle_deactivate_chain(
        &self,
        chain_id: String,
    ) -> Result<Json<DeactivateResponse>, InteropError> {
        self.registry.deactivate(&chain_id)?;
        let bridges_deactivated = self.bridges.mark_chain_inactive(&chain_id);
        let messages_failed = self
            .messages
            .fail_in_flight_for_chain(&chain_id, CHAIN_DEACTIVATED_REASON);
        self.update_chain_gauge();
        info!(
            chain_id = %chain_id,
            bridges_deactivated,
            messages_failed,
            "Chain deactivated"
        );
        Ok(Json(DeactivateResponse {
            chain_id,
            bridges_deactivated,
            messages_failed,
        }))
    }

    async fn handle_create_cosmos_bridge(
        &self,
        body: CosmosBridgeBody,
    ) -> Result<Json<BridgeResponse>, InteropError> {
        require("chain_id", &body.chain_id)?;
        validate_optional_endpoint(&body.node_endpoint)?;
        let bridge_id = self.bridges.create_bridge(
            &body.chain_id,
            &self.local_chain_id,
            ProtocolFamily::Ibc,
            BridgeConfig::Ibc(IbcBridgeConfig {
                node_endpoint: body.node_endpoint,
                account_address: body.account_address,
                api_key: body.api_key,
            }),
        )?;
        Ok(Json(BridgeResponse { bridge_id }))
    }

    async fn handle_create_polkadot_bridge(
        &self,
        body: PolkadotBridgeBody,
    ) -> Result<Json<BridgeResponse>, InteropError> {
        require("chain_id", &body.chain_id)?;
        validate_optional_endpoint(&body.relay_endpoint)?;
        let bridge_id = self.bridges.create_bridge(
            &body.chain_id,
            &self.local_chain_id,
            ProtocolFamily::Xcm,
            BridgeConfig::Xcm(XcmBridgeConfig {
                relay_endpoint: body.relay_endpoint,
                relay_chain_id: body.relay_chain_id,
                parachain_id: body.parachain_id.map(|id| id.to_string()),
                proxy_address: body.proxy_address,
                api_key: body.api_key,
            }),
        )?;
        Ok(Json(BridgeResponse { bridge_id }))
    }

    async fn handle_create_generic_bridge(
        &self,
        body: GenericBridgeBody,
    ) -> Result<Json<BridgeResponse>, InteropError> {
        require("source_chain_id", &body.source_chain_id)?;
        require("dest_chain_id", &body.dest_chain_id)?;
        validate_optional_endpoint(&body.relay_endpoint)?;
        let bridge_id = self.bridges.create_bridge(
            &body.source_chain_id,
            &body.dest_chain_id,
            ProtocolFamily::Generic,
            BridgeConfig::Generic(GenericBridgeConfig {
                relay_endpoint: body.relay_endpoint,
                api_key: body.api_key,
            }),
        )?;
        Ok(Json(BridgeResponse { bridge_id }))
    }

    async fn handle_add_ibc_channel(
        &self,
        body: IbcChannelBody,
    ) -> Result<Json<ChannelResponse>, InteropError> {
        let bridge_id = self.local_bridge(&body.chain_id, ProtocolFamily::Ibc)?;
        self.bridges.add_channel(
            &bridge_id,
            Channel::new(
                body.channel_id.clone(),
                body.port_id,
                body.counterparty_channel_id,
                body.counterparty_port_id,
                body.connection_id,
            ),
        )?;
        Ok(Json(ChannelResponse {
            bridge_id,
            channel_id: body.channel_id,
        }))
    }

    async fn handle_register_xcm_asset(
        &self,
        body: XcmAssetBody,
    ) -> Result<Json<AssetResponse>, InteropError> {
        let bridge_id = self.local_bridge(&body.chain_id, ProtocolFamily::Xcm)?;
        let asset_id = body.asset_id.clone();
        let parent_chain = if body.parent_chain.is_empty() {
            body.chain_id.clone()
        } else {
            body.parent_chain
        };
        self.bridges.register_asset(
            &bridge_id,
            RegisteredAsset {
                asset_id: body.asset_id,
                decimals: body.decimals,
                symbol: body.symbol,
                location_format: body.location_format,
                parent_chain,
                is_reserve: body.is_reserve,
                is_native: body.is_native,
            },
        )?;
        Ok(Json(AssetResponse {
            bridge_id,
            asset_id,
        }))
    }

    async fn handle_send_ibc_packet(
        &self,
        body: IbcSendBody,
    ) -> Result<Json<PacketResponse>, InteropError> {
        require("source_chain_id", &body.source_chain_id)?;
        require("dest_chain_id", &body.dest_chain_id)?;
        require("channel_id", &body.channel_id)?;
        let message = self
            .relayer
            .send_ibc_packet(SendIbcPacket {
                source_chain_id: body.source_chain_id,
                dest_chain_id: body.dest_chain_id,
                channel_id: body.channel_id,
                payload: body.payload,
                timeout_in_minutes: body.timeout_in_minutes,
                link: Self::link(body.related_table, body.related_id),
            })
            .await
            .tap_err(|e| warn!("IBC send failed: {}", e))?;
        Ok(Json(PacketResponse {
            packet_id: message.message_id,
            status: message.status,
            timeout_timestamp: message.timeout_at,
        }))
    }

    async fn handle_send_xcm_message(
        &self,
        body: XcmSendBody,
    ) -> Result<Json<MessageResponse>, InteropError> {
        require("source_chain_id", &body.source_chain_id)?;
        require("dest_chain_id", &body.dest_chain_id)?;
        require("message_type", &body.message_type)?;
        let message = self
            .relayer
            .send_xcm_message(SendXcmMessage {
                source_chain_id: body.source_chain_id,
                dest_chain_id: body.dest_chain_id,
                message_type: body.message_type,
                payload: body.payload,
                link: Self::link(body.related_table, body.related_id),
            })
            .await
            .tap_err(|e| warn!("XCM send failed: {}", e))?;
        Ok(Json(MessageResponse {
            message_id: message.message_id,
            status: message.status,
        }))
    }

    async fn handle_send_generic(
        &self,
        body: GenericSendBody,
    ) -> Result<Json<MessageResponse>, InteropError> {
        require("source_chain_id", &body.source_chain_id)?;
        require("dest_chain_id", &body.dest_chain_id)?;
        let message = self
            .relayer
            .send_generic(SendGenericTransfer {
                source_chain_id: body.source_chain_id,
                dest_chain_id: body.dest_chain_id,
                payload: body.payload,
                data_standard: body.data_standard,
                link: Self::link(body.related_table, body.related_id),
            })
            .await
            .tap_err(|e| warn!("Generic bridge send failed: {}", e))?;
        Ok(Json(MessageResponse {
            message_id: message.message_id,
            status: message.status,
        }))
    }

    async fn handle_share_batch(
        &self,
        body: ShareBatchBody,
    ) -> Result<Json<ShareBatchResponse>, InteropError> {
        require("batch_id", &body.batch_id)?;
        require("dest_chain_id", &body.dest_chain_id)?;
        let shared = self
            .relayer
            .share_data(ShareData {
                source_chain_id: self.local_chain_id.clone(),
                dest_chain_id: body.dest_chain_id,
                data: body.data,
                data_standard: body.data_standard,
                link: Some(LedgerLink {
                    related_table: BATCHES_TABLE.to_string(),
                    related_id: body.batch_id.clone(),
                }),
            })
            .await
            .tap_err(|e| warn!(batch_id = %body.batch_id, "Batch share failed: {}", e))?;
        let message = shared.message;
        Ok(Json(ShareBatchResponse {
            batch_id: body.batch_id,
            message_id: message.message_id,
            source_chain_id: message.source_chain_id,
            dest_chain_id: message.dest_chain_id,
            protocol: message.protocol,
            data_standard: shared.data_standard,
            status: message.status,
        }))
    }

    async fn handle_get_status(
        &self,
        protocol: String,
        source_chain_id: String,
        tx_id: String,
    ) -> Result<Json<StatusResponse>, InteropError> {
        let status = self
            .tracker
            .get_status(&tx_id, &protocol, &source_chain_id)
            .await?;
        Ok(Json(StatusResponse {
            status: status.as_str().to_string(),
        }))
    }

    async fn handle_verify(&self, body: VerifyBody) -> Result<Json<VerifyResponse>, InteropError> {
        let result = self
            .verification
            .verify_transaction(
                &body.tx_id,
                &body.protocol,
                &body.source_chain_id,
                &body.dest_chain_id,
            )
            .await?;
        if result.verified {
            if let Some(message) =
                self.messages
                    .get(&body.tx_id, &body.source_chain_id, &body.dest_chain_id)
            {
                let key = message.key();
                let updated = self
                    .messages
                    .transition(&key, MessageStatus::Verified, None)
                    .or_else(|| (message.status == MessageStatus::Verified).then_some(message));
                // A message already failed or timed out keeps its status, proof and ledger state.
                match updated {
                    Some(verified) => {
                        self.messages.set_proof(&key, result.proof_data.clone());
                        self.ledger.on_verified(&verified, &result.proof_data).await;
                    }
                    None => info!(
                        tx_id = %body.tx_id,
                        "Verified transaction left untouched in a terminal state"
                    ),
                }
            }
        }
        Ok(Json(VerifyResponse {
            verified: result.verified,
            proof_data: result.proof_data,
        }))
    }

    async fn handle_get_message(
        &self,
        message_id: String,
    ) -> Result<Json<CrossChainMessage>, InteropError> {
        self.messages
            .find_by_id(&message_id)
            .map(Json)
            .ok_or_else(|| InteropError::not_registered("message", message_id))
    }
}
