// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Client for a parachain's XCM REST API.

use super::http::{malformed, HttpTransport};
use super::{ChainClientInner, RemoteTarget, SubmitReceipt, VerificationRequest};
use crate::error::{InteropError, InteropResult};
use crate::types::{CrossChainMessage, MessagePayload};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

pub struct XcmHttpClient {
    transport: HttpTransport,
}

impl XcmHttpClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ChainClientInner for XcmHttpClient {
    async fn submit(
        &self,
        target: &RemoteTarget,
        message: &CrossChainMessage,
    ) -> InteropResult<SubmitReceipt> {
        let MessagePayload::Xcm(xcm) = &message.payload else {
            return Err(InteropError::Validation(format!(
                "Message {} is not an XCM message",
                message.message_id
            )));
        };
        let body = xcm.to_wire(target.account.as_deref())?;
        let (status, response) = self
            .transport
            .post_json(target, "/api/xcm/send", &body)
            .await?;
        Ok(SubmitReceipt {
            tx_id: response
                .get("extrinsic_hash")
                .and_then(Value::as_str)
                .map(str::to_string),
            queued: status == StatusCode::ACCEPTED,
        })
    }

    async fn query_status(&self, target: &RemoteTarget, tx_id: &str) -> InteropResult<String> {
        let path = format!("/api/xcm/message/{}", tx_id);
        let (_, response) = self.transport.get_json(target, &path).await?;
        response
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed(target, "status response did not contain status"))
    }

    async fn verify(
        &self,
        target: &RemoteTarget,
        request: &VerificationRequest,
    ) -> InteropResult<bool> {
        let path = format!("/api/xcm/verify/{}", request.tx_id);
        let (_, response) = self
            .transport
            .post_json(target, &path, &json!({ "message_id": request.tx_id }))
            .await?;
        response
            .get("verified")
            .and_then(Value::as_bool)
            .ok_or_else(|| malformed(target, "verification response did not contain verified"))
    }
}
