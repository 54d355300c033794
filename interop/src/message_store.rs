// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory store of cross-chain messages, keyed by `id|source|dest`.

use crate::error::{InteropError, InteropResult};
use crate::types::{message_key, CrossChainMessage, MessageStatus};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

#[derive(Debug, Default)]
pub struct MessageStore {
    messages: DashMap<String, CrossChainMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new message. A key that already holds a record keeps it and the insert fails.
    pub fn insert(&self, message: CrossChainMessage) -> InteropResult<()> {
        match self.messages.entry(message.key()) {
            Entry::Occupied(existing) => Err(duplicate(existing.get())),
            Entry::Vacant(slot) => {
                slot.insert(message);
                Ok(())
            }
        }
    }

    /// Fails when a message is already stored under `key`.
    pub fn ensure_absent(&self, key: &str) -> InteropResult<()> {
        match self.messages.get(key) {
            Some(existing) => Err(duplicate(&existing)),
            None => Ok(()),
        }
    }

    pub fn get(&self, id: &str, source_chain_id: &str, dest_chain_id: &str) -> Option<CrossChainMessage> {
        self.messages
            .get(&message_key(id, source_chain_id, dest_chain_id))
            .map(|m| m.clone())
    }

    /// Most recent message with the given id, on any chain pair.
    pub fn find_by_id(&self, id: &str) -> Option<CrossChainMessage> {
        self.messages
            .iter()
            .filter(|m| m.message_id == id)
            .max_by_key(|m| m.created_at)
            .map(|m| m.clone())
    }

    /// Applies a monotonic transition. Returns the updated message when the status changed.
    pub fn transition(
        &self,
        key: &str,
        next: MessageStatus,
        reason: Option<String>,
    ) -> Option<CrossChainMessage> {
        let mut entry = self.messages.get_mut(key)?;
        if entry.transition(next, reason) {
            Some(entry.clone())
        } else {
            None
        }
    }

    pub fn set_proof(&self, key: &str, proof_data: String) {
        if let Some(mut entry) = self.messages.get_mut(key) {
            entry.proof_data = Some(proof_data);
        }
    }

    /// Fails every in-flight message sent from or to `chain_id`. Returns how many changed.
    pub fn fail_in_flight_for_chain(&self, chain_id: &str, reason: &str) -> usize {
        let mut failed = 0;
        for mut entry in self.messages.iter_mut() {
            if entry.references(chain_id)
                && entry.transition(MessageStatus::Failed, Some(reason.to_string()))
            {
                failed += 1;
            }
        }
        if failed > 0 {
            info!(chain_id, failed, "Failed in-flight messages: {}", reason);
        }
        failed
    }

    /// Moves non-terminal messages whose timeout has passed to `timed_out`.
    pub fn time_out_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut timed_out = vec![];
        for mut entry in self.messages.iter_mut() {
            if entry.is_expired(now)
                && entry.transition(MessageStatus::TimedOut, Some("timeout elapsed".to_string()))
            {
                timed_out.push(entry.key().clone());
            }
        }
        timed_out
    }

    /// Drops terminal messages created before `cutoff`. Returns the removed keys.
    pub fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut evicted = vec![];
        self.messages.retain(|key, message| {
            let expired = message.status.is_terminal() && message.created_at < cutoff;
            if expired {
                evicted.push(key.clone());
            }
            !expired
        });
        evicted
    }

    pub fn list(&self) -> Vec<CrossChainMessage> {
        let mut messages: Vec<_> = self.messages.iter().map(|m| m.clone()).collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn duplicate(existing: &CrossChainMessage) -> InteropError {
    InteropError::DuplicateMessage {
        message_id: existing.message_id.clone(),
        source_chain_id: existing.source_chain_id.clone(),
        dest_chain_id: existing.dest_chain_id.clone(),
        status: existing.status.as_str().to_string(),
    }
}
