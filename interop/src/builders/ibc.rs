// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{content_hash, new_message, require_object};
use crate::error::{InteropError, InteropResult};
use crate::types::{Channel, CrossChainMessage, MessagePayload, ICS20_VERSION};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_IBC_TIMEOUT_MINUTES: i64 = 30;
pub const IBC_VERSION: &str = "1.2.0";
// Blocks added to the latest height to form the timeout height.
pub const TIMEOUT_HEIGHT_OFFSET: u64 = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbcHeight {
    pub revision_number: u64,
    pub revision_height: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IbcPacket {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub source_port: String,
    pub source_channel: String,
    pub dest_port: String,
    pub dest_channel: String,
    pub sequence: u64,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub timeout_height: IbcHeight,
    pub timeout_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub memo: String,
    pub ibc_version: String,
    pub app_version: String,
}

impl IbcPacket {
    /// Request body for `POST {node}/ibc/packets`.
    pub fn to_wire(&self) -> Value {
        json!({
            "source_port": self.source_port,
            "source_channel": self.source_channel,
            "token": self.payload,
            "sender": self.sender,
            "timeout_height": self.timeout_height,
            "timeout_timestamp": self.timeout_timestamp.timestamp_nanos_opt().unwrap_or(i64::MAX),
            "packet_sequence": self.sequence,
            "memo": self.memo,
        })
    }
}

#[derive(Clone, Debug)]
pub struct IbcPacketRequest {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub channel: Channel,
    pub sequence: u64,
    pub payload: Value,
    // Unset or non-positive means the default timeout.
    pub timeout_in_minutes: Option<i64>,
    pub sender: Option<String>,
    // Latest block height of the sending chain, when known.
    pub latest_height: Option<u64>,
}

pub fn resolve_timeout(
    timeout_in_minutes: Option<i64>,
    default_timeout: Duration,
) -> InteropResult<Duration> {
    match timeout_in_minutes {
        Some(minutes) if minutes > 0 => Duration::try_minutes(minutes).ok_or_else(|| {
            InteropError::Validation(format!("timeout of {} minutes is out of range", minutes))
        }),
        _ => Ok(default_timeout),
    }
}

pub fn build_ibc_packet(
    request: IbcPacketRequest,
    bridge_id: Option<String>,
    default_timeout: Duration,
    now: DateTime<Utc>,
) -> InteropResult<CrossChainMessage> {
    require_object(&request.payload)?;
    let message_id = content_hash(&request.payload);
    let timeout = resolve_timeout(request.timeout_in_minutes, default_timeout)?;
    let timeout_timestamp = now.checked_add_signed(timeout).ok_or_else(|| {
        InteropError::Validation("packet timeout is past the representable time range".to_string())
    })?;
    let timeout_height = request
        .latest_height
        .map(|height| IbcHeight {
            revision_number: 0,
            revision_height: height.saturating_add(TIMEOUT_HEIGHT_OFFSET),
        })
        .unwrap_or_default();
    let packet = IbcPacket {
        memo: format!(
            "IBC transfer from {} to {}",
            request.source_chain_id, request.dest_chain_id
        ),
        source_chain_id: request.source_chain_id,
        dest_chain_id: request.dest_chain_id,
        source_port: request.channel.port_id,
        source_channel: request.channel.channel_id,
        dest_port: request.channel.counterparty_port_id,
        dest_channel: request.channel.counterparty_channel_id,
        sequence: request.sequence,
        payload: request.payload,
        sender: request.sender,
        timeout_height,
        timeout_timestamp,
        created_at: now,
        ibc_version: IBC_VERSION.to_string(),
        app_version: ICS20_VERSION.to_string(),
    };
    let (source, dest) = (packet.source_chain_id.clone(), packet.dest_chain_id.clone());
    Ok(new_message(
        message_id,
        &source,
        &dest,
        bridge_id,
        MessagePayload::Ibc(packet),
        now,
        Some(timeout_timestamp),
    ))
}
