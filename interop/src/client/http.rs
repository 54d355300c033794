// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! JSON over HTTP with failure classification.
//!
//! - network errors, timeouts and 5xx become `RemoteTransient`
//! - 4xx becomes `RemoteRejected`
//! - undecodable 2xx bodies become `MalformedResponse`
//!
//! There is no retry loop here. Retrying transient failures is up to the caller.

use super::RemoteTarget;
use crate::error::{InteropError, InteropResult};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> InteropResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InteropError::Generic(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub async fn get_json(&self, target: &RemoteTarget, path: &str) -> InteropResult<(StatusCode, Value)> {
        let request = self.client.get(target.url(path));
        self.send(target, request).await
    }

    pub async fn post_json(
        &self,
        target: &RemoteTarget,
        path: &str,
        body: &Value,
    ) -> InteropResult<(StatusCode, Value)> {
        let request = self.client.post(target.url(path)).json(body);
        self.send(target, request).await
    }

    async fn send(
        &self,
        target: &RemoteTarget,
        mut request: reqwest::RequestBuilder,
    ) -> InteropResult<(StatusCode, Value)> {
        if let Some(api_key) = &target.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }
        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("request timed out: {}", e)
            } else {
                format!("request failed: {}", e)
            };
            transient(target, reason)
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transient(target, format!("failed to read response body: {}", e)))?;
        debug!(chain_id = %target.chain_id, %status, "Remote response");

        if status.is_client_error() {
            warn!(chain_id = %target.chain_id, %status, body = %text, "Remote chain rejected request");
            return Err(InteropError::RemoteRejected {
                chain_id: target.chain_id.clone(),
                message_id: String::new(),
                status: status.as_u16(),
                reason: error_message(&text).unwrap_or_else(|| format!("HTTP {}", status)),
            });
        }
        if !status.is_success() {
            return Err(transient(
                target,
                format!(
                    "HTTP {}: {}",
                    status,
                    error_message(&text).unwrap_or(text)
                ),
            ));
        }
        if text.trim().is_empty() {
            return Ok((status, Value::Null));
        }
        let body = serde_json::from_str(&text).map_err(|e| InteropError::MalformedResponse {
            chain_id: target.chain_id.clone(),
            reason: format!("invalid JSON: {}", e),
        })?;
        Ok((status, body))
    }
}

fn transient(target: &RemoteTarget, reason: String) -> InteropError {
    InteropError::RemoteTransient {
        chain_id: target.chain_id.clone(),
        message_id: String::new(),
        reason,
    }
}

// Pulls `error` out of a JSON error body.
fn error_message(text: &str) -> Option<String> {
    serde_json::from_str::<Value>(text)
        .ok()?
        .get("error")?
        .as_str()
        .map(str::to_string)
}

pub(crate) fn malformed(target: &RemoteTarget, reason: impl Into<String>) -> InteropError {
    InteropError::MalformedResponse {
        chain_id: target.chain_id.clone(),
        reason: reason.into(),
    }
}
