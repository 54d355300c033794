// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A scriptable chain client for tests. Built for `cfg(test)` or the `test-utils` feature.

use super::{ChainClientInner, RemoteTarget, SubmitReceipt, VerificationRequest};
use crate::error::InteropResult;
use crate::types::CrossChainMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[allow(clippy::type_complexity)]
#[derive(Clone, Debug, Default)]
pub struct MockChainClient {
    submit_response: Arc<Mutex<Option<InteropResult<SubmitReceipt>>>>,
    statuses: Arc<Mutex<HashMap<String, InteropResult<String>>>>,
    verifications: Arc<Mutex<HashMap<String, InteropResult<bool>>>>,
    latest_height: Arc<Mutex<Option<u64>>>,
    verify_delay: Arc<Mutex<Option<Duration>>>,
    submissions: Arc<Mutex<Vec<(RemoteTarget, CrossChainMessage)>>>,
    submit_calls: Arc<AtomicUsize>,
    status_calls: Arc<AtomicUsize>,
    verify_calls: Arc<AtomicUsize>,
}

impl MockChainClient {
    /// Response to every submission. Without one, submissions succeed with `tx-{message_id}`.
    pub fn set_submit_response(&self, response: InteropResult<SubmitReceipt>) {
        *self.submit_response.lock().unwrap() = Some(response);
    }

    pub fn set_status(&self, tx_id: &str, status: InteropResult<String>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(tx_id.to_string(), status);
    }

    pub fn set_verification(&self, tx_id: &str, result: InteropResult<bool>) {
        self.verifications
            .lock()
            .unwrap()
            .insert(tx_id.to_string(), result);
    }

    pub fn set_latest_height(&self, height: u64) {
        self.latest_height.lock().unwrap().replace(height);
    }

    pub fn set_verify_delay(&self, delay: Duration) {
        self.verify_delay.lock().unwrap().replace(delay);
    }

    pub fn submissions(&self) -> Vec<(RemoteTarget, CrossChainMessage)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClientInner for MockChainClient {
    async fn submit(
        &self,
        target: &RemoteTarget,
        message: &CrossChainMessage,
    ) -> InteropResult<SubmitReceipt> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submissions
            .lock()
            .unwrap()
            .push((target.clone(), message.clone()));
        self.submit_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| {
                Ok(SubmitReceipt {
                    tx_id: Some(format!("tx-{}", message.message_id)),
                    queued: false,
                })
            })
    }

    async fn query_status(&self, _target: &RemoteTarget, tx_id: &str) -> InteropResult<String> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .get(tx_id)
            .cloned()
            .unwrap_or_else(|| Ok("pending".to_string()))
    }

    async fn verify(
        &self,
        _target: &RemoteTarget,
        request: &VerificationRequest,
    ) -> InteropResult<bool> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.verify_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.verifications
            .lock()
            .unwrap()
            .get(&request.tx_id)
            .cloned()
            .unwrap_or(Ok(false))
    }

    async fn latest_block_height(&self, _target: &RemoteTarget) -> InteropResult<Option<u64>> {
        Ok(*self.latest_height.lock().unwrap())
    }
}
