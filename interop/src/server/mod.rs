// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::InteropError;
use crate::server::handler::{
    AssetResponse, BridgeResponse, ChannelResponse, ConnectionResponse, CosmosBridgeBody,
    DeactivateResponse, GenericBridgeBody, GenericSendBody, IbcChannelBody, IbcSendBody,
    InteropRequestHandlerTrait, MessageResponse, PacketResponse, PolkadotBridgeBody,
    RegisterChainBody, ShareBatchBody, ShareBatchResponse, StatusResponse, VerifyBody,
    VerifyResponse, XcmAssetBody, XcmSendBody,
};
use crate::types::{ChainDescriptor, CrossChainMessage, ProtocolFamily};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub mod handler;

pub const HEALTH_PATH: &str = "/health";
pub const CHAINS_PATH: &str = "/interop/chains";
pub const CHAIN_PATH: &str = "/interop/chains/:chain_id";
pub const COSMOS_BRIDGE_PATH: &str = "/interop/bridges/cosmos";
pub const COSMOS_CHANNELS_PATH: &str = "/interop/bridges/cosmos/channels";
pub const POLKADOT_BRIDGE_PATH: &str = "/interop/bridges/polkadot";
pub const XCM_ASSETS_PATH: &str = "/interop/bridges/xcm/assets";
pub const GENERIC_BRIDGE_PATH: &str = "/interop/bridges/generic";
pub const GENERIC_SEND_PATH: &str = "/interop/bridges/generic/send";
pub const IBC_SEND_PATH: &str = "/interop/ibc/send";
pub const XCM_SEND_PATH: &str = "/interop/xcm/send";
pub const SHARE_BATCH_PATH: &str = "/interop/share-batch";
pub const STATUS_PATH: &str = "/interop/status/:protocol/:source_chain_id/:tx_id";
pub const VERIFY_PATH: &str = "/interop/verify";
pub const MESSAGE_PATH: &str = "/interop/txs/:message_id";
pub const PROTOCOLS_PATH: &str = "/interop/protocols";

pub fn run_server(
    socket_address: &SocketAddr,
    handler: impl InteropRequestHandlerTrait + Sync + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    let socket_address = *socket_address;
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(socket_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind interop server to {}: {}", socket_address, e);
                return;
            }
        };
        info!("Interop server listening on {}", socket_address);
        if let Err(e) = axum::serve(listener, make_router(Arc::new(handler))).await {
            error!("Interop server stopped: {}", e);
        }
    })
}

pub(crate) fn make_router<H>(handler: Arc<H>) -> Router
where
    H: InteropRequestHandlerTrait + Sync + Send + 'static,
{
    let interop = Router::new()
        .route(CHAINS_PATH, post(handle_register_chain).get(handle_list_chains))
        .route(
            CHAIN_PATH,
            get(handle_get_chain).delete(handle_deactivate_chain),
        )
        .route(COSMOS_BRIDGE_PATH, post(handle_create_cosmos_bridge))
        .route(COSMOS_CHANNELS_PATH, post(handle_add_ibc_channel))
        .route(POLKADOT_BRIDGE_PATH, post(handle_create_polkadot_bridge))
        .route(XCM_ASSETS_PATH, post(handle_register_xcm_asset))
        .route(GENERIC_BRIDGE_PATH, post(handle_create_generic_bridge))
        .route(GENERIC_SEND_PATH, post(handle_send_generic))
        .route(IBC_SEND_PATH, post(handle_send_ibc_packet))
        .route(XCM_SEND_PATH, post(handle_send_xcm_message))
        .route(SHARE_BATCH_PATH, post(handle_share_batch))
        .route(STATUS_PATH, get(handle_get_status))
        .route(VERIFY_PATH, post(handle_verify))
        .route(MESSAGE_PATH, get(handle_get_message))
        .route(PROTOCOLS_PATH, get(list_protocols))
        .route_layer(middleware::from_fn_with_state(
            handler.clone(),
            require_enabled::<H>,
        ));
    Router::new()
        .route(HEALTH_PATH, get(health_check))
        .merge(interop)
        .with_state(handler)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "ok"
}

async fn require_enabled<H>(State(handler): State<Arc<H>>, request: Request, next: Next) -> Response
where
    H: InteropRequestHandlerTrait + Sync + Send + 'static,
{
    if !handler.is_enabled() {
        return InteropError::InteropDisabled.into_response();
    }
    next.run(request).await
}

// Malformed or incomplete bodies are validation errors, not axum's default 422.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, InteropError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| InteropError::Validation(e.body_text()))
}

async fn list_protocols() -> Json<Vec<&'static str>> {
    Json(ProtocolFamily::ALL.iter().map(|p| p.as_str()).collect())
}

async fn handle_register_chain(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
    payload: Result<Json<RegisterChainBody>, JsonRejection>,
) -> Result<Json<ConnectionResponse>, InteropError> {
    handler.handle_register_chain(body(payload)?).await
}

async fn handle_list_chains(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
) -> Result<Json<Vec<ChainDescriptor>>, InteropError> {
    handler.handle_list_chains().await
}

async fn handle_get_chain(
    Path(chain_id): Path<String>,
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
) -> Result<Json<ChainDescriptor>, InteropError> {
    handler.handle_get_chain(chain_id).await
}

async fn handle_deactivate_chain(
    Path(chain_id): Path<String>,
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
) -> Result<Json<DeactivateResponse>, InteropError> {
    handler.handle_deactivate_chain(chain_id).await
}

async fn handle_create_cosmos_bridge(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
    payload: Result<Json<CosmosBridgeBody>, JsonRejection>,
) -> Result<Json<BridgeResponse>, InteropError> {
    handler.handle_create_cosmos_bridge(body(payload)?).await
}

async fn handle_create_polkadot_bridge(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
    payload: Result<Json<PolkadotBridgeBody>, JsonRejection>,
) -> Result<Json<BridgeResponse>, InteropError> {
    handler.handle_create_polkadot_bridge(body(payload)?).await
}

async fn handle_create_generic_bridge(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
    payload: Result<Json<GenericBridgeBody>, JsonRejection>,
) -> Result<Json<BridgeResponse>, InteropError> {
    handler.handle_create_generic_bridge(body(payload)?).await
}

async fn handle_add_ibc_channel(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
    payload: Result<Json<IbcChannelBody>, JsonRejection>,
) -> Result<Json<ChannelResponse>, InteropError> {
    handler.handle_add_ibc_channel(body(payload)?).await
}

async fn handle_register_xcm_asset(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
    payload: Result<Json<XcmAssetBody>, JsonRejection>,
) -> Result<Json<AssetResponse>, InteropError> {
    handler.handle_register_xcm_asset(body(payload)?).await
}

async fn handle_send_ibc_packet(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
    payload: Result<Json<IbcSendBody>, JsonRejection>,
) -> Result<Json<PacketResponse>, InteropError> {
    handler.handle_send_ibc_packet(body(payload)?).await
}

async fn handle_send_xcm_message(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
    payload: Result<Json<XcmSendBody>, JsonRejection>,
) -> Result<Json<MessageResponse>, InteropError> {
    handler.handle_send_xcm_message(body(payload)?).await
}

async fn handle_send_generic(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
    payload: Result<Json<GenericSendBody>, JsonRejection>,
) -> Result<Json<MessageResponse>, InteropError> {
    handler.handle_send_generic(body(payload)?).await
}

async fn handle_share_batch(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
    payload: Result<Json<ShareBatchBody>, JsonRejection>,
) -> Result<Json<ShareBatchResponse>, InteropError> {
    handler.handle_share_batch(body(payload)?).await
}

async fn handle_get_status(
    Path((protocol, source_chain_id, tx_id)): Path<(String, String, String)>,
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
) -> Result<Json<StatusResponse>, InteropError> {
    handler
        .handle_get_status(protocol, source_chain_id, tx_id)
        .await
}

async fn handle_verify(
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
    payload: Result<Json<VerifyBody>, JsonRejection>,
) -> Result<Json<VerifyResponse>, InteropError> {
    handler.handle_verify(body(payload)?).await
}

async fn handle_get_message(
    Path(message_id): Path<String>,
    State(handler): State<Arc<impl InteropRequestHandlerTrait + Sync + Send>>,
) -> Result<Json<CrossChainMessage>, InteropError> {
    handler.handle_get_message(message_id).await
}
