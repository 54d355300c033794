// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Client for a Cosmos SDK node's REST API.

use super::http::{malformed, HttpTransport};
use super::{ChainClientInner, RemoteTarget, SubmitReceipt, VerificationRequest};
use crate::error::{InteropError, InteropResult};
use crate::types::{CrossChainMessage, MessagePayload};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

pub struct IbcHttpClient {
    transport: HttpTransport,
}

impl IbcHttpClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ChainClientInner for IbcHttpClient {
    async fn submit(
        &self,
        target: &RemoteTarget,
        message: &CrossChainMessage,
    ) -> InteropResult<SubmitReceipt> {
        let MessagePayload::Ibc(packet) = &message.payload else {
            return Err(InteropError::Validation(format!(
                "Message {} is not an IBC packet",
                message.message_id
            )));
        };
        let mut body = packet.to_wire();
        if body["sender"].is_null() {
            body["sender"] = json!(target.account);
        }
        let (status, response) = self
            .transport
            .post_json(target, "/ibc/packets", &body)
            .await?;
        Ok(SubmitReceipt {
            tx_id: response
                .get("tx_hash")
                .and_then(Value::as_str)
                .map(str::to_string),
            queued: status == StatusCode::ACCEPTED,
        })
    }

    async fn query_status(&self, target: &RemoteTarget, tx_id: &str) -> InteropResult<String> {
        let path = format!("/cosmos/tx/v1beta1/txs/{}", tx_id);
        let response = match self.transport.get_json(target, &path).await {
            Ok((_, response)) => response,
            // The node does not know the transaction yet.
            Err(InteropError::RemoteRejected { status: 404, .. }) => {
                return Ok("pending".to_string())
            }
            Err(e) => return Err(e),
        };
        let code = response
            .get("tx_response")
            .and_then(|r| r.get("code"))
            .and_then(Value::as_u64)
            .ok_or_else(|| malformed(target, "response does not contain tx_response.code"))?;
        Ok(if code == 0 { "completed" } else { "failed" }.to_string())
    }

    async fn verify(
        &self,
        target: &RemoteTarget,
        request: &VerificationRequest,
    ) -> InteropResult<bool> {
        let mut body = json!({
            "source_chain_id": request.source_chain_id,
            "tx_hash": request.tx_id,
        });
        if let Some(packet) = &request.packet {
            body["source_channel"] = json!(packet.source_channel);
            body["destination_channel"] = json!(packet.dest_channel);
            body["packet_sequence"] = json!(packet.sequence.to_string());
        }
        let (_, response) = self
            .transport
            .post_json(target, "/ibc/packets/verify", &body)
            .await?;
        response
            .get("received")
            .and_then(Value::as_bool)
            .ok_or_else(|| malformed(target, "verification response did not contain received status"))
    }

    async fn latest_block_height(&self, target: &RemoteTarget) -> InteropResult<Option<u64>> {
        let (_, response) = self.transport.get_json(target, "/blocks/latest").await?;
        let height = response
            .pointer("/block/header/height")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(target, "header does not contain height"))?;
        height
            .parse()
            .map(Some)
            .map_err(|e| malformed(target, format!("failed to parse height {}: {}", height, e)))
    }
}
