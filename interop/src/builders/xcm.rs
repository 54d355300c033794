// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! XCM V3 instruction building.
//!
//! Amounts are integers in the asset's smallest unit. A transfer of `A` withdraws `A`, spends
//! `A / 100` (rounded down) on execution and deposits the remainder, so fee and deposit always
//! add up to `A`.

use super::{content_hash, new_message, parse_amount, require_object, require_str};
use crate::error::{InteropError, InteropResult};
use crate::types::{CrossChainMessage, MessagePayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

pub const XCM_VERSION: &str = "V3";
pub const XCM_SEND_CALL: &str = "xcmPallet.send";
pub const EXECUTION_FEE_PERCENT: u128 = 1;
pub const TRANSACT_WEIGHT: u64 = 1_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XcmMessageType {
    Transfer,
    DataTransfer,
    Generic,
}

impl fmt::Display for XcmMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            XcmMessageType::Transfer => "transfer",
            XcmMessageType::DataTransfer => "data_transfer",
            XcmMessageType::Generic => "generic",
        };
        f.write_str(s)
    }
}

impl FromStr for XcmMessageType {
    type Err = InteropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(XcmMessageType::Transfer),
            "data_transfer" => Ok(XcmMessageType::DataTransfer),
            "generic" => Ok(XcmMessageType::Generic),
            other => Err(InteropError::Validation(format!(
                "Unsupported XCM message type: {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkId {
    Any,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Junction {
    Parachain(u32),
    AccountId32 { id: String, network: NetworkId },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Junctions {
    Here,
    X1(Junction),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiLocation {
    pub parents: u8,
    pub interior: Junctions,
}

impl MultiLocation {
    pub fn here() -> Self {
        Self {
            parents: 0,
            interior: Junctions::Here,
        }
    }

    /// A sibling parachain as seen from another parachain.
    pub fn parachain(id: u32) -> Self {
        Self {
            parents: 1,
            interior: Junctions::X1(Junction::Parachain(id)),
        }
    }

    pub fn account_id32(id: impl Into<String>) -> Self {
        Self {
            parents: 0,
            interior: Junctions::X1(Junction::AccountId32 {
                id: id.into(),
                network: NetworkId::Any,
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetId {
    Concrete(MultiLocation),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fungibility {
    Fungible(u128),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiAsset {
    pub id: AssetId,
    pub fun: Fungibility,
}

impl MultiAsset {
    // The chain's native asset.
    pub fn native(amount: u128) -> Self {
        Self {
            id: AssetId::Concrete(MultiLocation::here()),
            fun: Fungibility::Fungible(amount),
        }
    }

    pub fn amount(&self) -> u128 {
        match self.fun {
            Fungibility::Fungible(amount) => amount,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightLimit {
    Unlimited,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginKind {
    SovereignAccount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedCall {
    pub encoded: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum XcmInstruction {
    WithdrawAsset(Vec<MultiAsset>),
    BuyExecution {
        fees: MultiAsset,
        weight_limit: WeightLimit,
    },
    DepositAsset {
        assets: Vec<MultiAsset>,
        beneficiary: MultiLocation,
    },
    Transact {
        origin_kind: OriginKind,
        require_weight_at_most: u64,
        call: EncodedCall,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XcmMessage {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub destination_parachain: u32,
    pub message_type: XcmMessageType,
    pub xcm_version: String,
    pub payload: Value,
    pub instructions: Vec<XcmInstruction>,
    pub created_at: DateTime<Utc>,
}

impl XcmMessage {
    /// Request body for `POST {parachain}/api/xcm/send`.
    pub fn to_wire(&self, proxy_address: Option<&str>) -> InteropResult<Value> {
        let message = serde_json::to_value(self)
            .map_err(|e| InteropError::Generic(format!("Failed to encode XCM message: {}", e)))?;
        Ok(json!({
            "message": message,
            "call": XCM_SEND_CALL,
            "destination_type": XCM_VERSION,
            "destination": MultiLocation::parachain(self.destination_parachain),
            "beneficiary": proxy_address,
            "fee_asset_item": 0,
            "weight_limit": WeightLimit::Unlimited,
        }))
    }
}

/// Parses `parachain-2000`, `2000` or similar trailing numeric chain ids.
pub fn parachain_id_from_chain_id(chain_id: &str) -> Option<u32> {
    chain_id.rsplit(['-', '_', ':']).next()?.parse().ok()
}

pub fn split_execution_fee(amount: u128) -> (u128, u128) {
    let fee = amount * EXECUTION_FEE_PERCENT / 100;
    (fee, amount - fee)
}

pub fn build_instructions(
    message_type: XcmMessageType,
    payload: &Value,
) -> InteropResult<Vec<XcmInstruction>> {
    match message_type {
        XcmMessageType::Transfer => {
            let amount = parse_amount(payload, "amount")?;
            let beneficiary = require_str(payload, "beneficiary")?;
            let (fee, deposit) = split_execution_fee(amount);
            Ok(vec![
                XcmInstruction::WithdrawAsset(vec![MultiAsset::native(amount)]),
                XcmInstruction::BuyExecution {
                    fees: MultiAsset::native(fee),
                    weight_limit: WeightLimit::Unlimited,
                },
                XcmInstruction::DepositAsset {
                    assets: vec![MultiAsset::native(deposit)],
                    beneficiary: MultiLocation::account_id32(beneficiary),
                },
            ])
        }
        XcmMessageType::DataTransfer => Ok(vec![transact(require_str(payload, "data")?)]),
        // A prepared `call` is sent as is. Otherwise the payload itself is the call data.
        XcmMessageType::Generic => match payload.get("call").and_then(Value::as_str) {
            Some(call) => Ok(vec![transact(call)]),
            None => {
                let bytes = serde_json::to_vec(payload).map_err(|e| {
                    InteropError::Validation(format!("Cannot encode generic payload: {}", e))
                })?;
                Ok(vec![transact(&format!("0x{}", hex::encode(bytes)))])
            }
        },
    }
}

fn transact(encoded: &str) -> XcmInstruction {
    XcmInstruction::Transact {
        origin_kind: OriginKind::SovereignAccount,
        require_weight_at_most: TRANSACT_WEIGHT,
        call: EncodedCall {
            encoded: encoded.to_string(),
        },
    }
}

#[derive(Clone, Debug)]
pub struct XcmMessageRequest {
    pub source_chain_id: String,
    pub dest_chain_id: String,
    pub destination_parachain: u32,
    pub message_type: XcmMessageType,
    pub payload: Value,
}

pub fn build_xcm_message(
    request: XcmMessageRequest,
    bridge_id: Option<String>,
    now: DateTime<Utc>,
) -> InteropResult<CrossChainMessage> {
    require_object(&request.payload)?;
    let instructions = build_instructions(request.message_type, &request.payload)?;
    let message_id = content_hash(&request.payload);
    let message = XcmMessage {
        source_chain_id: request.source_chain_id.clone(),
        dest_chain_id: request.dest_chain_id.clone(),
        destination_parachain: request.destination_parachain,
        message_type: request.message_type,
        xcm_version: XCM_VERSION.to_string(),
        payload: request.payload,
        instructions,
        created_at: now,
    };
    Ok(new_message(
        message_id,
        &request.source_chain_id,
        &request.dest_chain_id,
        bridge_id,
        MessagePayload::Xcm(message),
        now,
        None,
    ))
}
