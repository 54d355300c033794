// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{content_hash, new_message, parse_amount, require_object, require_str};
use crate::error::InteropResult;
use crate::types::{CrossChainMessage, MessagePayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_DATA_STANDARD: &str = "GS1-EPCIS";

/// Asset transfer relayed over a non-IBC/XCM bridge. The payload passes through unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenericTransfer {
    pub bridge_id: String,
    pub asset_id: String,
    pub amount: u128,
    pub sender: String,
    pub recipient: String,
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub data_standard: String,
    pub created_at: DateTime<Utc>,
}

impl GenericTransfer {
    /// Request body for `POST {relay}/bridge/send`.
    pub fn to_wire(&self, message_id: &str) -> Value {
        json!({
            "message_id": message_id,
            "source_chain_id": self.source_chain_id,
            "dest_chain_id": self.dest_chain_id,
            "protocol": "bridge",
            "status": "pending",
            "data_standard": self.data_standard,
            "timestamp": self.created_at.to_rfc3339(),
            "payload": {
                "bridge_id": self.bridge_id,
                "asset_id": self.asset_id,
                "amount": self.amount.to_string(),
                "sender": self.sender,
                "recipient": self.recipient,
            },
        })
    }
}

/// Standardized record relayed over a non-IBC/XCM bridge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenericDataShare {
    pub bridge_id: String,
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub data_standard: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl GenericDataShare {
    /// Request body for `POST {relay}/bridge/send`.
    pub fn to_wire(&self, message_id: &str) -> Value {
        json!({
            "message_id": message_id,
            "source_chain_id": self.source_chain_id,
            "dest_chain_id": self.dest_chain_id,
            "protocol": "bridge",
            "status": "pending",
            "data_standard": self.data_standard,
            "timestamp": self.created_at.to_rfc3339(),
            "payload": self.data,
        })
    }
}

#[derive(Clone, Debug)]
pub struct GenericTransferRequest {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub bridge_id: String,
    pub payload: Value,
    pub data_standard: Option<String>,
}

pub fn build_generic_transfer(
    request: GenericTransferRequest,
    now: DateTime<Utc>,
) -> InteropResult<CrossChainMessage> {
    require_object(&request.payload)?;
    let transfer = GenericTransfer {
        bridge_id: request.bridge_id.clone(),
        asset_id: require_str(&request.payload, "asset_id")?.to_string(),
        amount: parse_amount(&request.payload, "amount")?,
        sender: require_str(&request.payload, "sender")?.to_string(),
        recipient: require_str(&request.payload, "recipient")?.to_string(),
        source_chain_id: request.source_chain_id.clone(),
        dest_chain_id: request.dest_chain_id.clone(),
        data_standard: request
            .data_standard
            .unwrap_or_else(|| DEFAULT_DATA_STANDARD.to_string()),
        created_at: now,
    };
    Ok(new_message(
        content_hash(&request.payload),
        &request.source_chain_id,
        &request.dest_chain_id,
        Some(request.bridge_id),
        MessagePayload::Generic(transfer),
        now,
        None,
    ))
}

pub fn build_generic_data_share(
    share: GenericDataShare,
    now: DateTime<Utc>,
) -> InteropResult<CrossChainMessage> {
    require_object(&share.data)?;
    let (source, dest) = (share.source_chain_id.clone(), share.dest_chain_id.clone());
    Ok(new_message(
        content_hash(&share.data),
        &source,
        &dest,
        Some(share.bridge_id.clone()),
        MessagePayload::GenericData(share),
        now,
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_generic_transfer() {
        let payload = json!({
            "asset_id": "usdc",
            "amount": "2500",
            "sender": "0xabc",
            "recipient": "0xdef",
        });
        let message = build_generic_transfer(
            GenericTransferRequest {
                source_chain_id: "tracepost-chain".to_string(),
                dest_chain_id: "eth-mainnet".to_string(),
                bridge_id: "generic-eth-mainnet-tracepost-chain".to_string(),
                payload: payload.clone(),
                data_standard: None,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(message.message_id, content_hash(&payload));
        let MessagePayload::Generic(transfer) = &message.payload else {
            panic!("expected generic payload");
        };
        assert_eq!(transfer.amount, 2500);
        assert_eq!(transfer.data_standard, DEFAULT_DATA_STANDARD);
        let wire = transfer.to_wire(&message.message_id);
        assert_eq!(wire["payload"]["amount"], "2500");
        assert_eq!(wire["payload"]["recipient"], "0xdef");
    }

    #[test]
    fn test_missing_fields() {
        let request = GenericTransferRequest {
            source_chain_id: "a".to_string(),
            dest_chain_id: "b".to_string(),
            bridge_id: "generic-a-b".to_string(),
            payload: json!({"asset_id": "usdc", "amount": 1, "sender": "x"}),
            data_standard: Some("custom".to_string()),
        };
        assert!(build_generic_transfer(request, Utc::now()).is_err());
    }

    #[test]
    fn test_build_generic_data_share() {
        let now = Utc::now();
        let data = json!({"eventTime": "2026-03-01T08:30:00Z", "action": "OBSERVE"});
        let message = build_generic_data_share(
            GenericDataShare {
                bridge_id: "generic-eth-mainnet-tracepost-chain".to_string(),
                source_chain_id: "tracepost-chain".to_string(),
                dest_chain_id: "eth-mainnet".to_string(),
                data_standard: DEFAULT_DATA_STANDARD.to_string(),
                data: data.clone(),
                created_at: now,
            },
            now,
        )
        .unwrap();
        assert_eq!(message.message_id, content_hash(&data));
        assert_eq!(message.protocol, crate::types::ProtocolFamily::Generic);
        let MessagePayload::GenericData(share) = &message.payload else {
            panic!("expected generic data payload");
        };
        let wire = share.to_wire(&message.message_id);
        assert_eq!(wire["payload"], data);
        assert_eq!(wire["data_standard"], "GS1-EPCIS");
        assert_eq!(wire["protocol"], "bridge");
    }
}
