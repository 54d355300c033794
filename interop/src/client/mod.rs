// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Clients for the APIs of already-running external chains.
//!
//! Every protocol family exposes the same capability set through `ChainClientInner`
//! (submit, status, verify). `ChainClient` wraps an implementation with logging, metrics and
//! message-id context on errors.

pub mod generic;
pub mod http;
pub mod ibc;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod xcm;

use crate::error::InteropResult;
use crate::metrics::InteropMetrics;
use crate::types::{ChainDescriptor, CrossChainMessage, ProtocolFamily};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tap::TapFallible;
use tracing::{info, warn};

/// Where a remote call goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteTarget {
    pub chain_id: String,
    pub base_url: String,
    pub api_key: Option<String>,
    // Sending account or proxy address, when the protocol needs one.
    pub account: Option<String>,
    // Generic bridges only: true when `base_url` is a relay service rather than the chain.
    pub via_relay: bool,
}

impl RemoteTarget {
    pub fn new(chain_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            base_url: base_url.into(),
            api_key: None,
            account: None,
            via_relay: false,
        }
    }

    /// Targets a registered chain's own endpoint with its credentials.
    pub fn for_chain(chain: &ChainDescriptor) -> Self {
        Self::new(chain.chain_id.clone(), chain.endpoint.clone())
            .with_api_key(chain.credentials.api_key.clone())
            .with_account(chain.credentials.account_address.clone())
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_account(mut self, account: Option<String>) -> Self {
        self.account = account;
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitReceipt {
    // Hash the chain assigned, if it returned one.
    pub tx_id: Option<String>,
    // The remote accepted the message for later processing (HTTP 202).
    pub queued: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketRef {
    pub source_channel: String,
    pub dest_channel: String,
    pub sequence: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationRequest {
    pub tx_id: String,
    pub source_chain_id: String,
    pub dest_chain_id: String,
    // IBC packet coordinates, when the message is known locally.
    pub packet: Option<PacketRef>,
}

#[async_trait]
pub trait ChainClientInner: Send + Sync {
    async fn submit(
        &self,
        target: &RemoteTarget,
        message: &CrossChainMessage,
    ) -> InteropResult<SubmitReceipt>;

    /// Raw, protocol-specific status term for `tx_id`.
    async fn query_status(&self, target: &RemoteTarget, tx_id: &str) -> InteropResult<String>;

    async fn verify(
        &self,
        target: &RemoteTarget,
        request: &VerificationRequest,
    ) -> InteropResult<bool>;

    async fn latest_block_height(&self, _target: &RemoteTarget) -> InteropResult<Option<u64>> {
        Ok(None)
    }
}

pub struct ChainClient {
    protocol: ProtocolFamily,
    inner: Arc<dyn ChainClientInner>,
    metrics: Arc<InteropMetrics>,
}

impl ChainClient {
    pub fn new(
        protocol: ProtocolFamily,
        inner: Arc<dyn ChainClientInner>,
        metrics: Arc<InteropMetrics>,
    ) -> Self {
        Self {
            protocol,
            inner,
            metrics,
        }
    }

    pub fn protocol(&self) -> ProtocolFamily {
        self.protocol
    }

    fn record<T>(&self, operation: &str, result: &InteropResult<T>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) if e.is_retryable() => "transient",
            Err(_) => "error",
        };
        self.metrics
            .remote_calls
            .with_label_values(&[self.protocol.as_str(), operation, outcome])
            .inc();
    }

    pub async fn submit(
        &self,
        target: &RemoteTarget,
        message: &CrossChainMessage,
    ) -> InteropResult<SubmitReceipt> {
        let result = self
            .inner
            .submit(target, message)
            .await
            .map_err(|e| e.with_message_id(&message.message_id));
        self.record("submit", &result);
        result
            .tap_ok(|receipt| {
                info!(
                    protocol = %self.protocol,
                    chain_id = %target.chain_id,
                    message_id = %message.message_id,
                    tx_id = ?receipt.tx_id,
                    "Message submitted"
                )
            })
            .tap_err(|e| {
                warn!(
                    protocol = %self.protocol,
                    chain_id = %target.chain_id,
                    message_id = %message.message_id,
                    "Message submission failed: {}",
                    e
                )
            })
    }

    pub async fn query_status(&self, target: &RemoteTarget, tx_id: &str) -> InteropResult<String> {
        let result = self
            .inner
            .query_status(target, tx_id)
            .await
            .map_err(|e| e.with_message_id(tx_id));
        self.record("status", &result);
        result.tap_err(|e| {
            warn!(
                protocol = %self.protocol,
                chain_id = %target.chain_id,
                tx_id,
                "Status query failed: {}",
                e
            )
        })
    }

    pub async fn verify(
        &self,
        target: &RemoteTarget,
        request: &VerificationRequest,
    ) -> InteropResult<bool> {
        let result = self
            .inner
            .verify(target, request)
            .await
            .map_err(|e| e.with_message_id(&request.tx_id));
        self.record("verify", &result);
        result.tap_err(|e| {
            warn!(
                protocol = %self.protocol,
                chain_id = %target.chain_id,
                tx_id = %request.tx_id,
                "Verification call failed: {}",
                e
            )
        })
    }

    /// Best effort: failures are logged and reported as unknown.
    pub async fn latest_block_height(&self, target: &RemoteTarget) -> Option<u64> {
        let result = self.inner.latest_block_height(target).await;
        self.record("latest_height", &result);
        result
            .tap_err(|e| warn!(chain_id = %target.chain_id, "Failed to fetch latest height: {}", e))
            .ok()
            .flatten()
    }
}

/// One client per protocol family.
pub struct ChainClients {
    ibc: ChainClient,
    xcm: ChainClient,
    generic: ChainClient,
}

impl ChainClients {
    pub fn new(
        ibc: Arc<dyn ChainClientInner>,
        xcm: Arc<dyn ChainClientInner>,
        generic: Arc<dyn ChainClientInner>,
        metrics: Arc<InteropMetrics>,
    ) -> Self {
        Self {
            ibc: ChainClient::new(ProtocolFamily::Ibc, ibc, metrics.clone()),
            xcm: ChainClient::new(ProtocolFamily::Xcm, xcm, metrics.clone()),
            generic: ChainClient::new(ProtocolFamily::Generic, generic, metrics),
        }
    }

    /// HTTP clients sharing one bounded-timeout transport.
    pub fn new_http(timeout: Duration, metrics: Arc<InteropMetrics>) -> InteropResult<Self> {
        let transport = http::HttpTransport::new(timeout)?;
        Ok(Self::new(
            Arc::new(ibc::IbcHttpClient::new(transport.clone())),
            Arc::new(xcm::XcmHttpClient::new(transport.clone())),
            Arc::new(generic::GenericHttpClient::new(transport)),
            metrics,
        ))
    }

    pub fn get(&self, protocol: ProtocolFamily) -> &ChainClient {
        match protocol {
            ProtocolFamily::Ibc => &self.ibc,
            ProtocolFamily::Xcm => &self.xcm,
            ProtocolFamily::Generic => &self.generic,
        }
    }
}
