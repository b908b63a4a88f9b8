//! BatchProcessor - one pass over the due part of the queue.
//!
//! # Flow
//! 1. `QueueStore::query_due()` picks up to `limit` due items, oldest first
//! 2. `QueueStore::claim()` reserves each item (skipped if someone else won)
//! 3. `DispatchExecutor::send()` delivers it
//! 4. `QueueStore::update()` records sent / rescheduled / failed
//! 5. `AuditRecorder::record()` appends a summary and prunes the trail
//!
//! Items are dispatched one at a time, in due order. This bounds load on the
//! executor and keeps the audit order deterministic; do not parallelise
//! without revisiting both.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audit::AuditRecorder;
use crate::domain::{AuditRecord, DispatchError, QueueItem, QueueItemId, StoreError};
use crate::ports::{
    Claim, ClaimOutcome, Clock, DispatchExecutor, IdGenerator, ItemTransition, OwnerContext,
    QueueStore,
};
use crate::queue::RetryPolicy;

/// `last_error` written when a claimed item fails the presence check.
pub const INVALID_PAYLOAD: &str = "invalid_payload";

/// Options for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub limit: usize,
    pub dry_run: bool,
    /// Overrides the clock for the due-time query and item timestamps.
    pub now: Option<DateTime<Utc>>,
}

impl BatchOptions {
    pub const DEFAULT_LIMIT: usize = 25;
    pub const MAX_MANUAL_LIMIT: usize = 100;

    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Clamp a caller-supplied limit into `1..=MAX_MANUAL_LIMIT`; a missing
    /// one falls back to the default.
    pub fn clamped_limit(requested: Option<i64>) -> usize {
        match requested {
            Some(n) => n.clamp(1, Self::MAX_MANUAL_LIMIT as i64) as usize,
            None => Self::DEFAULT_LIMIT,
        }
    }

    /// Options for an on-demand trigger.
    pub fn manual(requested_limit: Option<i64>, dry_run: bool) -> Self {
        Self {
            limit: Self::clamped_limit(requested_limit),
            dry_run,
            now: None,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            dry_run: false,
            now: None,
        }
    }
}

/// Per-item status reported by a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Dry run: due and would be processed. Real run: rescheduled for retry.
    Scheduled,
    /// Not claimed this run (lost the race or cancelled).
    Skipped,
    Sent,
    Failed,
}

/// One entry of [`BatchReport::results`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub id: QueueItemId,
    pub status: ItemOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemResult {
    fn new(id: QueueItemId, status: ItemOutcome) -> Self {
        Self {
            id,
            status,
            scheduled_at: None,
            message_id: None,
            error: None,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Summary of one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub processed: usize,
    pub dry_run: bool,
    pub results: Vec<ItemResult>,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
}

/// Tunables of the processor.
#[derive(Debug, Clone, Default)]
pub struct BatchProcessorConfig {
    pub retry: RetryPolicy,

    /// Upper bound on one `send` call. `None` waits indefinitely; an elapsed
    /// timeout counts as a transient failure.
    pub dispatch_timeout: Option<Duration>,
}

pub struct BatchProcessor {
    store: Arc<dyn QueueStore>,
    dispatcher: Arc<dyn DispatchExecutor>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    audit: AuditRecorder,
    config: BatchProcessorConfig,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<dyn QueueStore>,
        dispatcher: Arc<dyn DispatchExecutor>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            audit: AuditRecorder::new(Arc::clone(&store)),
            store,
            dispatcher,
            clock,
            ids,
            config: BatchProcessorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BatchProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one batch.
    ///
    /// Only a failure of the initial due-item query is returned as an error;
    /// everything that goes wrong for an individual item ends up in its
    /// [`ItemResult`].
    pub async fn process_batch(&self, options: BatchOptions) -> Result<BatchReport, StoreError> {
        let timer = Instant::now();
        let started_at = self.clock.now();
        let now = options.now.unwrap_or(started_at);

        let due = self.store.query_due(now, options.limit).await?;

        if options.dry_run {
            let results: Vec<ItemResult> = due
                .iter()
                .map(|item| ItemResult {
                    scheduled_at: Some(item.scheduled_at),
                    ..ItemResult::new(item.id, ItemOutcome::Scheduled)
                })
                .collect();
            tracing::info!(due = results.len(), limit = options.limit, "dry run: nothing claimed");
            return Ok(BatchReport {
                processed: results.len(),
                dry_run: true,
                results,
                success_count: 0,
                failed_count: 0,
                skipped_count: 0,
            });
        }

        let mut report = BatchReport {
            processed: 0,
            dry_run: false,
            results: Vec::with_capacity(due.len()),
            success_count: 0,
            failed_count: 0,
            skipped_count: 0,
        };

        for item in &due {
            let result = self.process_item(item, now).await;
            match result.status {
                ItemOutcome::Sent => report.success_count += 1,
                ItemOutcome::Failed => report.failed_count += 1,
                ItemOutcome::Skipped | ItemOutcome::Scheduled => report.skipped_count += 1,
            }
            report.results.push(result);
        }
        report.processed = report.results.len();

        if report.processed > 0 {
            let finished_at = self.clock.now();
            self.audit
                .record(AuditRecord {
                    id: self.ids.audit_record_id(),
                    processed: report.processed,
                    success_count: report.success_count,
                    failed_count: report.failed_count,
                    skipped_count: report.skipped_count,
                    limit: options.limit,
                    duration_ms: timer.elapsed().as_millis() as u64,
                    started_at,
                    finished_at,
                    created_at: finished_at,
                })
                .await;
        }

        tracing::info!(
            processed = report.processed,
            sent = report.success_count,
            failed = report.failed_count,
            skipped = report.skipped_count,
            limit = options.limit,
            "scheduled message batch processed"
        );
        Ok(report)
    }

    async fn process_item(&self, item: &QueueItem, now: DateTime<Utc>) -> ItemResult {
        let claim = match self.store.claim(item.id, now).await {
            Ok(ClaimOutcome::Claimed(claim)) => claim,
            Ok(ClaimOutcome::NotClaimed) => {
                tracing::debug!(item_id = %item.id, "already claimed or cancelled, skipping");
                return ItemResult::new(item.id, ItemOutcome::Skipped);
            }
            Err(e) => {
                tracing::warn!(item_id = %item.id, error = %e, "claim failed, skipping");
                return ItemResult::new(item.id, ItemOutcome::Skipped).with_error(e.to_string());
            }
        };

        if !claim.item.payload.is_valid() {
            tracing::warn!(item_id = %item.id, "invalid payload, failing without retry");
            self.write_back(
                item.id,
                ItemTransition::Failed {
                    error: INVALID_PAYLOAD.to_string(),
                    at: now,
                },
            )
            .await;
            return ItemResult::new(item.id, ItemOutcome::Failed).with_error(INVALID_PAYLOAD);
        }

        match self.dispatch(&claim).await {
            Ok(delivery) => {
                self.write_back(
                    item.id,
                    ItemTransition::Sent {
                        message_id: delivery.message_id.clone(),
                        at: now,
                    },
                )
                .await;
                ItemResult {
                    message_id: Some(delivery.message_id),
                    ..ItemResult::new(item.id, ItemOutcome::Sent)
                }
            }
            Err(e) => self.handle_dispatch_failure(&claim, e, now).await,
        }
    }

    async fn dispatch(&self, claim: &Claim) -> Result<crate::ports::Delivery, DispatchError> {
        let owner = OwnerContext {
            item_id: claim.item.id,
            owner_id: claim.item.owner_id.clone(),
        };
        let send = self.dispatcher.send(&claim.item.payload, &owner);
        match self.config.dispatch_timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .unwrap_or(Err(DispatchError::Timeout(limit))),
            None => send.await,
        }
    }

    async fn handle_dispatch_failure(
        &self,
        claim: &Claim,
        error: DispatchError,
        now: DateTime<Utc>,
    ) -> ItemResult {
        let id = claim.item.id;
        let error = error.to_string();
        let policy = &self.config.retry;

        if policy.is_exhausted(claim.attempt) {
            tracing::warn!(item_id = %id, attempt = claim.attempt, %error, "dispatch failed, attempts exhausted");
            self.write_back(
                id,
                ItemTransition::Failed {
                    error: error.clone(),
                    at: now,
                },
            )
            .await;
            return ItemResult::new(id, ItemOutcome::Failed).with_error(error);
        }

        let delay = chrono::Duration::from_std(policy.next_delay(claim.attempt))
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let next_run_at = now + delay;
        tracing::info!(item_id = %id, attempt = claim.attempt, %error, %next_run_at, "dispatch failed, rescheduled");
        self.write_back(
            id,
            ItemTransition::Rescheduled {
                error: error.clone(),
                next_run_at,
                at: now,
            },
        )
        .await;
        ItemResult {
            scheduled_at: Some(next_run_at),
            ..ItemResult::new(id, ItemOutcome::Scheduled)
        }
        .with_error(error)
    }

    /// The claimant's write. A failure leaves the item in `processing`; it is
    /// logged and does not change the per-item result.
    async fn write_back(&self, id: QueueItemId, transition: ItemTransition) {
        let target = transition.target();
        if let Err(e) = self.store.update(id, transition).await {
            tracing::error!(item_id = %id, %target, error = %e, "failed to record dispatch result");
        }
    }
}
