// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::builders::generic::{GenericDataShare, GenericTransfer};
use crate::builders::ibc::IbcPacket;
use crate::builders::xcm::XcmMessage;
use crate::error::{InteropError, InteropResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

// Key shared by the verification cache and the message store: `id|source|dest`.
pub fn message_key(id: &str, source_chain_id: &str, dest_chain_id: &str) -> String {
    format!("{}|{}|{}", id, source_chain_id, dest_chain_id)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolFamily {
    Ibc,
    Xcm,
    Generic,
}

impl ProtocolFamily {
    pub const ALL: [ProtocolFamily; 3] = [
        ProtocolFamily::Ibc,
        ProtocolFamily::Xcm,
        ProtocolFamily::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolFamily::Ibc => "ibc",
            ProtocolFamily::Xcm => "xcm",
            ProtocolFamily::Generic => "generic",
        }
    }

    /// Infers the protocol from a free-form chain type such as `cosmos-sdk` or `polkadot-parachain`.
    pub fn from_chain_type(chain_type: &str) -> Self {
        let chain_type = chain_type.to_lowercase();
        if chain_type.contains("cosmos") {
            ProtocolFamily::Ibc
        } else if chain_type.contains("polkadot") || chain_type.contains("substrate") {
            ProtocolFamily::Xcm
        } else {
            ProtocolFamily::Generic
        }
    }

    /// Chain-id substring heuristic used by `auto` protocol selection. "cosmos" wins over "dot"
    /// when both appear.
    pub fn detect_from_chain_id(chain_id: &str) -> Option<Self> {
        let chain_id = chain_id.to_lowercase();
        if chain_id.contains("cosmos") {
            Some(ProtocolFamily::Ibc)
        } else if chain_id.contains("dot") {
            Some(ProtocolFamily::Xcm)
        } else {
            None
        }
    }

    /// Whether a chain of family `self` can take part in a bridge of `protocol`.
    /// Generic chains can be bridged over any protocol.
    pub fn compatible_with(&self, protocol: ProtocolFamily) -> bool {
        *self == protocol || *self == ProtocolFamily::Generic
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolFamily {
    type Err = InteropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ibc" | "cosmos" => Ok(ProtocolFamily::Ibc),
            "xcm" | "substrate" | "polkadot" => Ok(ProtocolFamily::Xcm),
            "generic" | "bridge" => Ok(ProtocolFamily::Generic),
            other => Err(InteropError::Validation(format!(
                "Unsupported protocol: {}",
                other
            ))),
        }
    }
}

/// Protocol named at a call site: either explicit or `auto`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolSelector {
    Auto,
    Explicit(ProtocolFamily),
}

impl ProtocolSelector {
    pub fn resolve(&self, source_chain_id: &str, dest_chain_id: &str) -> ProtocolFamily {
        match self {
            ProtocolSelector::Explicit(family) => *family,
            ProtocolSelector::Auto => ProtocolFamily::detect_from_chain_id(source_chain_id)
                .or_else(|| ProtocolFamily::detect_from_chain_id(dest_chain_id))
                .unwrap_or(ProtocolFamily::Generic),
        }
    }
}

impl FromStr for ProtocolSelector {
    type Err = InteropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            Ok(ProtocolSelector::Auto)
        } else {
            s.parse().map(ProtocolSelector::Explicit)
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCredentials {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_address: Option<String>,
}

impl fmt::Debug for ChainCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("account_address", &self.account_address)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub chain_id: String,
    pub protocol_family: ProtocolFamily,
    pub chain_type: String,
    pub endpoint: String,
    pub credentials: ChainCredentials,
    pub connection_id: String,
    // Protocol-specific connection details (IBC client/connection ids, XCMP channel).
    pub details: BTreeMap<String, String>,
    pub registered_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Active,
    Inactive,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbcBridgeConfig {
    pub node_endpoint: Option<String>,
    pub account_address: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XcmBridgeConfig {
    pub relay_endpoint: Option<String>,
    pub relay_chain_id: Option<String>,
    pub parachain_id: Option<String>,
    // Beneficiary used for the outer `xcmPallet.send` call.
    pub proxy_address: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericBridgeConfig {
    pub relay_endpoint: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum BridgeConfig {
    Ibc(IbcBridgeConfig),
    Xcm(XcmBridgeConfig),
    Generic(GenericBridgeConfig),
}

impl BridgeConfig {
    pub fn protocol(&self) -> ProtocolFamily {
        match self {
            BridgeConfig::Ibc(_) => ProtocolFamily::Ibc,
            BridgeConfig::Xcm(_) => ProtocolFamily::Xcm,
            BridgeConfig::Generic(_) => ProtocolFamily::Generic,
        }
    }

    pub fn default_for(protocol: ProtocolFamily) -> Self {
        match protocol {
            ProtocolFamily::Ibc => BridgeConfig::Ibc(Default::default()),
            ProtocolFamily::Xcm => BridgeConfig::Xcm(Default::default()),
            ProtocolFamily::Generic => BridgeConfig::Generic(Default::default()),
        }
    }

    // Endpoint override for submissions over this bridge, if configured.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            BridgeConfig::Ibc(c) => c.node_endpoint.as_deref(),
            BridgeConfig::Xcm(_) => None,
            BridgeConfig::Generic(c) => c.relay_endpoint.as_deref(),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        match self {
            BridgeConfig::Ibc(c) => c.api_key.as_deref(),
            BridgeConfig::Xcm(c) => c.api_key.as_deref(),
            BridgeConfig::Generic(c) => c.api_key.as_deref(),
        }
    }
}

pub const IBC_CHANNEL_STATE_OPEN: &str = "OPEN";
pub const IBC_ORDERING_UNORDERED: &str = "UNORDERED";
pub const ICS20_VERSION: &str = "ics20-1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    pub port_id: String,
    pub counterparty_channel_id: String,
    pub counterparty_port_id: String,
    pub connection_id: String,
    pub state: String,
    pub ordering: String,
    pub version: String,
}

impl Channel {
    pub fn new(
        channel_id: impl Into<String>,
        port_id: impl Into<String>,
        counterparty_channel_id: impl Into<String>,
        counterparty_port_id: impl Into<String>,
        connection_id: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            port_id: port_id.into(),
            counterparty_channel_id: counterparty_channel_id.into(),
            counterparty_port_id: counterparty_port_id.into(),
            connection_id: connection_id.into(),
            state: IBC_CHANNEL_STATE_OPEN.to_string(),
            ordering: IBC_ORDERING_UNORDERED.to_string(),
            version: ICS20_VERSION.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredAsset {
    pub asset_id: String,
    pub decimals: u8,
    pub symbol: String,
    pub location_format: String,
    pub parent_chain: String,
    pub is_reserve: bool,
    pub is_native: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bridge {
    pub bridge_id: String,
    // Direction the bridge was created in. Lookups ignore it.
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub protocol_family: ProtocolFamily,
    pub state: BridgeState,
    pub config: BridgeConfig,
    pub channels: BTreeMap<String, Channel>,
    pub assets: BTreeMap<String, RegisteredAsset>,
    pub created_at: DateTime<Utc>,
}

impl Bridge {
    pub fn connects(&self, chain_id: &str) -> bool {
        self.source_chain_id == chain_id || self.dest_chain_id == chain_id
    }

    pub fn counterparty(&self, chain_id: &str) -> Option<&str> {
        if self.source_chain_id == chain_id {
            Some(&self.dest_chain_id)
        } else if self.dest_chain_id == chain_id {
            Some(&self.source_chain_id)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Submitted,
    Relayed,
    Verified,
    Failed,
    TimedOut,
}

impl MessageStatus {
    fn rank(&self) -> u8 {
        match self {
            MessageStatus::Pending => 0,
            MessageStatus::Submitted => 1,
            MessageStatus::Relayed => 2,
            MessageStatus::Verified | MessageStatus::Failed | MessageStatus::TimedOut => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Submitted => "submitted",
            MessageStatus::Relayed => "relayed",
            MessageStatus::Verified => "verified",
            MessageStatus::Failed => "failed",
            MessageStatus::TimedOut => "timed_out",
        }
    }
}

/// Shared status vocabulary reported to callers regardless of protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    Pending,
    Submitted,
    Relayed,
    Completed,
    Failed,
    TimedOut,
}

impl CanonicalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CanonicalStatus::Completed | CanonicalStatus::Failed | CanonicalStatus::TimedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalStatus::Pending => "pending",
            CanonicalStatus::Submitted => "submitted",
            CanonicalStatus::Relayed => "relayed",
            CanonicalStatus::Completed => "completed",
            CanonicalStatus::Failed => "failed",
            CanonicalStatus::TimedOut => "timed_out",
        }
    }

    pub fn to_message_status(self) -> MessageStatus {
        match self {
            CanonicalStatus::Pending => MessageStatus::Pending,
            CanonicalStatus::Submitted => MessageStatus::Submitted,
            CanonicalStatus::Relayed => MessageStatus::Relayed,
            CanonicalStatus::Completed => MessageStatus::Verified,
            CanonicalStatus::Failed => MessageStatus::Failed,
            CanonicalStatus::TimedOut => MessageStatus::TimedOut,
        }
    }
}

impl From<MessageStatus> for CanonicalStatus {
    fn from(status: MessageStatus) -> Self {
        match status {
            MessageStatus::Pending => CanonicalStatus::Pending,
            MessageStatus::Submitted => CanonicalStatus::Submitted,
            MessageStatus::Relayed => CanonicalStatus::Relayed,
            MessageStatus::Verified => CanonicalStatus::Completed,
            MessageStatus::Failed => CanonicalStatus::Failed,
            MessageStatus::TimedOut => CanonicalStatus::TimedOut,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    Ibc(IbcPacket),
    Xcm(XcmMessage),
    Generic(GenericTransfer),
    GenericData(GenericDataShare),
}

impl MessagePayload {
    pub fn protocol(&self) -> ProtocolFamily {
        match self {
            MessagePayload::Ibc(_) => ProtocolFamily::Ibc,
            MessagePayload::Xcm(_) => ProtocolFamily::Xcm,
            MessagePayload::Generic(_) | MessagePayload::GenericData(_) => {
                ProtocolFamily::Generic
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossChainMessage {
    // Content hash until the chain returns its own transaction/extrinsic hash.
    pub message_id: String,
    pub content_hash: String,
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub protocol: ProtocolFamily,
    pub bridge_id: Option<String>,
    pub payload: MessagePayload,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_data: Option<String>,
}

impl CrossChainMessage {
    pub fn key(&self) -> String {
        message_key(&self.message_id, &self.source_chain_id, &self.dest_chain_id)
    }

    /// Moves to `next` if allowed. Status only moves forward and terminal states are sticky.
    /// Returns whether the status changed.
    pub fn transition(&mut self, next: MessageStatus, reason: Option<String>) -> bool {
        if self.status.is_terminal() || next.rank() <= self.status.rank() {
            return false;
        }
        self.status = next;
        if reason.is_some() {
            self.status_reason = reason;
        }
        true
    }

    pub fn references(&self, chain_id: &str) -> bool {
        self.source_chain_id == chain_id || self.dest_chain_id == chain_id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.timeout_at.map(|t| t <= now).unwrap_or(false)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub proof_data: String,
}
