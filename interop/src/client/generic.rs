// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::http::HttpTransport;
use super::{ChainClientInner, RemoteTarget, SubmitReceipt, VerificationRequest};
use crate::error::{InteropError, InteropResult};
use crate::types::{CrossChainMessage, MessagePayload};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

/// Sends transfers through a bridge relay service, or straight to the destination chain when
/// no relay is configured. Generic bridges have no remote status or proof API.
pub struct GenericHttpClient {
    transport: HttpTransport,
}

impl GenericHttpClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ChainClientInner for GenericHttpClient {
    async fn submit(
        &self,
        target: &RemoteTarget,
        message: &CrossChainMessage,
    ) -> InteropResult<SubmitReceipt> {
        let body = match &message.payload {
            MessagePayload::Generic(transfer) => transfer.to_wire(&message.message_id),
            MessagePayload::GenericData(share) => share.to_wire(&message.message_id),
            _ => {
                return Err(InteropError::Validation(format!(
                    "Message {} is not a bridge transfer",
                    message.message_id
                )))
            }
        };
        let path = if target.via_relay {
            "/bridge/send"
        } else {
            "/relay"
        };
        let (status, response) = self.transport.post_json(target, path, &body).await?;
        Ok(SubmitReceipt {
            tx_id: response
                .get("tx_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            queued: status == StatusCode::ACCEPTED,
        })
    }

    async fn query_status(&self, target: &RemoteTarget, _tx_id: &str) -> InteropResult<String> {
        Err(InteropError::Validation(format!(
            "Chain {} has no remote status API",
            target.chain_id
        )))
    }

    async fn verify(
        &self,
        _target: &RemoteTarget,
        _request: &VerificationRequest,
    ) -> InteropResult<bool> {
        Ok(true)
    }
}
