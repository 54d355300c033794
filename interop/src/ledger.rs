// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bookkeeping of cross-chain outcomes against local records.
//!
//! The record schema belongs to the database collaborator. This module only needs
//! upsert and query by `(related_table, related_id)`. Write failures are logged and
//! counted but never surfaced: by the time they happen the remote effect is committed.

use crate::error::{InteropError, InteropResult};
use crate::metrics::InteropMetrics;
use crate::types::{sha256_hex, CrossChainMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tap::TapFallible;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub related_table: String,
    pub related_id: String,
    pub tx_id: String,
    pub metadata_hash: Option<String>,
    pub verified: bool,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts the record or replaces the one with the same `(related_table, related_id)`.
    async fn insert(&self, record: LedgerRecord) -> InteropResult<()>;

    async fn query(&self, related_table: &str, related_id: &str) -> InteropResult<Option<LedgerRecord>>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryLedgerStore {
    records: Arc<Mutex<HashMap<(String, String), LedgerRecord>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryLedgerStore {
    /// Makes every subsequent insert fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert(&self, record: LedgerRecord) -> InteropResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(InteropError::Storage("ledger is unavailable".to_string()));
        }
        self.records.lock().insert(
            (record.related_table.clone(), record.related_id.clone()),
            record,
        );
        Ok(())
    }

    async fn query(&self, related_table: &str, related_id: &str) -> InteropResult<Option<LedgerRecord>> {
        Ok(self
            .records
            .lock()
            .get(&(related_table.to_string(), related_id.to_string()))
            .cloned())
    }
}

pub struct LedgerReconciler {
    store: Arc<dyn LedgerStore>,
    // message key -> (related_table, related_id)
    associations: DashMap<String, (String, String)>,
    metrics: Arc<InteropMetrics>,
}

impl LedgerReconciler {
    pub fn new(store: Arc<dyn LedgerStore>, metrics: Arc<InteropMetrics>) -> Self {
        Self {
            store,
            associations: DashMap::new(),
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Drops the record associations of messages that are no longer tracked.
    pub fn forget(&self, message_keys: &[String]) {
        for key in message_keys {
            self.associations.remove(key);
        }
    }

    pub fn associations_len(&self) -> usize {
        self.associations.len()
    }

    pub async fn on_message_submitted(
        &self,
        related_table: &str,
        related_id: &str,
        message: &CrossChainMessage,
    ) {
        self.associations.insert(
            message.key(),
            (related_table.to_string(), related_id.to_string()),
        );
        let record = LedgerRecord {
            related_table: related_table.to_string(),
            related_id: related_id.to_string(),
            tx_id: message.message_id.clone(),
            metadata_hash: None,
            verified: false,
            recorded_at: Utc::now(),
        };
        let _ = self
            .store
            .insert(record)
            .await
            .tap_ok(|_| {
                info!(
                    related_table,
                    related_id,
                    message_id = %message.message_id,
                    "Recorded cross-chain submission"
                )
            })
            .tap_err(|e| {
                self.metrics.ledger_write_failures.inc();
                warn!(
                    related_table,
                    related_id,
                    message_id = %message.message_id,
                    "Failed to record cross-chain submission, continuing: {}",
                    e
                )
            });
    }

    /// Marks the local record of a verified message. Messages submitted without a related
    /// record are ignored.
    pub async fn on_verified(&self, message: &CrossChainMessage, proof_data: &str) {
        let Some(association) = self.associations.get(&message.key()).map(|a| a.clone()) else {
            return;
        };
        let (related_table, related_id) = association;
        let record = LedgerRecord {
            related_table: related_table.clone(),
            related_id: related_id.clone(),
            tx_id: message.message_id.clone(),
            metadata_hash: Some(sha256_hex(proof_data)),
            verified: true,
            recorded_at: Utc::now(),
        };
        let _ = self.store.insert(record).await.tap_err(|e| {
            self.metrics.ledger_write_failures.inc();
            warn!(
                related_table = %related_table,
                related_id = %related_id,
                message_id = %message.message_id,
                "Failed to record verification, continuing: {}",
                e
            )
        });
    }
}
