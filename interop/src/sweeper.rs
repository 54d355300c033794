// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Periodically moves in-flight messages past their timeout to `timed_out` and drops
//! terminal messages older than the retention period.

use crate::ledger::LedgerReconciler;
use crate::message_store::MessageStore;
use crate::metrics::InteropMetrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{info, warn};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MESSAGE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub timed_out: Vec<String>,
    pub evicted: Vec<String>,
}

pub struct TimeoutSweeper {
    messages: Arc<MessageStore>,
    ledger: Arc<LedgerReconciler>,
    metrics: Arc<InteropMetrics>,
    retention: Duration,
}

impl TimeoutSweeper {
    pub fn new(
        messages: Arc<MessageStore>,
        ledger: Arc<LedgerReconciler>,
        metrics: Arc<InteropMetrics>,
        retention: Duration,
    ) -> Self {
        Self {
            messages,
            ledger,
            metrics,
            retention,
        }
    }

    pub fn sweep_once(&self, now: DateTime<Utc>) -> SweepOutcome {
        let timed_out = self.messages.time_out_expired(now);
        if !timed_out.is_empty() {
            self.metrics
                .messages_timed_out
                .inc_by(timed_out.len() as u64);
            info!(count = timed_out.len(), "Timed out expired messages");
        }

        let evicted = match chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
        {
            Some(cutoff) => self.messages.evict_terminal_before(cutoff),
            None => {
                warn!(retention = ?self.retention, "Retention out of range, nothing evicted");
                vec![]
            }
        };
        if !evicted.is_empty() {
            self.ledger.forget(&evicted);
            self.metrics.messages_evicted.inc_by(evicted.len() as u64);
            info!(count = evicted.len(), "Evicted terminal messages past retention");
        }
        SweepOutcome { timed_out, evicted }
    }

    pub fn run(self, sweep_interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(?sweep_interval, retention = ?self.retention, "Starting message sweep");
            let mut interval = time::interval(sweep_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.sweep_once(Utc::now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedgerStore;
    use crate::test_utils::sample_generic_message;
    use crate::types::MessageStatus;

    fn sweeper(
        messages: Arc<MessageStore>,
        metrics: Arc<InteropMetrics>,
    ) -> (TimeoutSweeper, Arc<LedgerReconciler>) {
        let ledger = Arc::new(LedgerReconciler::new(
            Arc::new(InMemoryLedgerStore::default()),
            metrics.clone(),
        ));
        (
            TimeoutSweeper::new(messages, ledger.clone(), metrics, DEFAULT_MESSAGE_RETENTION),
            ledger,
        )
    }

    #[test]
    fn test_sweep_once() {
        let messages = Arc::new(MessageStore::new());
        let metrics = Arc::new(InteropMetrics::new_for_testing());
        let now = Utc::now();
        let mut message = sample_generic_message("tx-1");
        message.timeout_at = Some(now - chrono::Duration::minutes(1));
        messages.insert(message).unwrap();

        let (sweeper, _) = sweeper(messages.clone(), metrics.clone());
        assert_eq!(sweeper.sweep_once(now).timed_out.len(), 1);
        assert_eq!(sweeper.sweep_once(now), SweepOutcome::default());
        assert_eq!(metrics.messages_timed_out.get(), 1);
        assert_eq!(
            messages.find_by_id("tx-1").unwrap().status,
            MessageStatus::TimedOut
        );
    }

    #[tokio::test]
    async fn test_sweep_evicts_past_retention() {
        let messages = Arc::new(MessageStore::new());
        let metrics = Arc::new(InteropMetrics::new_for_testing());
        let (sweeper, ledger) = sweeper(messages.clone(), metrics.clone());
        let now = Utc::now();

        let mut old = sample_generic_message("tx-old");
        old.created_at = now - chrono::Duration::days(2);
        old.transition(MessageStatus::Verified, None);
        ledger.on_message_submitted("batches", "batch-1", &old).await;
        let mut stuck = sample_generic_message("tx-stuck");
        stuck.created_at = now - chrono::Duration::days(2);
        messages.insert(old.clone()).unwrap();
        messages.insert(stuck).unwrap();
        messages.insert(sample_generic_message("tx-new")).unwrap();

        let outcome = sweeper.sweep_once(now);
        assert_eq!(outcome.evicted, vec![old.key()]);
        assert_eq!(metrics.messages_evicted.get(), 1);
        assert_eq!(messages.len(), 2);
        assert!(messages.find_by_id("tx-old").is_none());
        assert_eq!(ledger.associations_len(), 0);

        // The same id can be tracked again once its old record is gone.
        messages.insert(old).unwrap();
    }

    #[tokio::test]
    async fn test_background_sweep() {
        let messages = Arc::new(MessageStore::new());
        let mut message = sample_generic_message("tx-1");
        message.timeout_at = Some(Utc::now());
        messages.insert(message).unwrap();

        let (sweeper, _) = sweeper(
            messages.clone(),
            Arc::new(InteropMetrics::new_for_testing()),
        );
        let handle = sweeper.run(Duration::from_millis(20));
        time::timeout(Duration::from_secs(5), async {
            while messages.find_by_id("tx-1").unwrap().status != MessageStatus::TimedOut {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        handle.abort();
    }
}
