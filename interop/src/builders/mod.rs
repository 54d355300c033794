// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Construction of protocol-native messages. Builders are pure: they never touch the network.

pub mod generic;
pub mod ibc;
pub mod xcm;

use crate::error::{InteropError, InteropResult};
use crate::types::{sha256_hex, CrossChainMessage, MessagePayload, MessageStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Hex sha256 of the JSON encoding of `payload`. Object keys serialize in sorted order, so equal
/// payloads always hash the same.
pub fn content_hash(payload: &Value) -> String {
    sha256_hex(serde_json::to_vec(payload).unwrap_or_default())
}

/// Reads a non-negative integer amount given either as a JSON number or a numeric string.
pub fn parse_amount(payload: &Value, field: &str) -> InteropResult<u128> {
    let value = payload
        .get(field)
        .ok_or_else(|| InteropError::Validation(format!("payload.{} is required", field)))?;
    let parsed = match value {
        Value::Number(n) => n.as_u64().map(u128::from).or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u128::MAX as f64)
                .map(|f| f as u128)
        }),
        Value::String(s) => s.trim().parse::<u128>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        InteropError::Validation(format!(
            "payload.{} must be a non-negative integer, got {}",
            field, value
        ))
    })
}

pub fn require_str<'a>(payload: &'a Value, field: &str) -> InteropResult<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| InteropError::Validation(format!("payload.{} is required", field)))
}

pub(crate) fn require_object(payload: &Value) -> InteropResult<()> {
    if payload.is_object() {
        Ok(())
    } else {
        Err(InteropError::Validation("payload must be a JSON object".into()))
    }
}

pub(crate) fn new_message(
    message_id: String,
    source_chain_id: &str,
    dest_chain_id: &str,
    bridge_id: Option<String>,
    payload: MessagePayload,
    created_at: DateTime<Utc>,
    timeout_at: Option<DateTime<Utc>>,
) -> CrossChainMessage {
    CrossChainMessage {
        content_hash: message_id.clone(),
        message_id,
        source_chain_id: source_chain_id.to_string(),
        dest_chain_id: dest_chain_id.to_string(),
        protocol: payload.protocol(),
        bridge_id,
        payload,
        status: MessageStatus::Pending,
        status_reason: None,
        created_at,
        timeout_at,
        proof_data: None,
    }
}
