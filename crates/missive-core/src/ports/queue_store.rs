//! QueueStore port - durable storage for queue items and the audit trail.
//!
//! The store is the only shared mutable resource. Everything the processor
//! writes goes through either [`QueueStore::claim`] (atomic) or
//! [`QueueStore::update`] (point write by the claimant).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::status::QueueCounts;
use crate::domain::{AuditRecord, QueueItem, QueueItemId, QueueStatus, StoreError};

/// Result of the claim transaction.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// This caller owns the item until it writes a [`ItemTransition`].
    Claimed(Claim),

    /// The item was no longer scheduled (claimed concurrently, or cancelled).
    NotClaimed,
}

/// A successful claim.
#[derive(Debug, Clone)]
pub struct Claim {
    /// Item data as read inside the transaction, before the transition.
    pub item: QueueItem,

    /// Attempt number assigned by this claim (`item.attempts + 1`).
    pub attempt: u32,
}

/// Post-dispatch write performed by the claimant.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemTransition {
    Sent {
        message_id: String,
        at: DateTime<Utc>,
    },
    Failed {
        error: String,
        at: DateTime<Utc>,
    },
    Rescheduled {
        error: String,
        next_run_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}

impl ItemTransition {
    pub fn target(&self) -> QueueStatus {
        match self {
            ItemTransition::Sent { .. } => QueueStatus::Sent,
            ItemTransition::Failed { .. } => QueueStatus::Failed,
            ItemTransition::Rescheduled { .. } => QueueStatus::Scheduled,
        }
    }
}

/// Sort order for owner listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    ScheduledAtAsc,
    UpdatedAtDesc,
}

/// Durable queue store.
///
/// # Atomicity
/// `claim` must be a read-then-conditionally-write primitive (optimistic
/// transaction, compare-and-swap, or row lock + re-check): of any number of
/// concurrent claims on one item, exactly one returns `Claimed`.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Scheduled items with `scheduled_at <= now`, oldest due first, at most `limit`.
    async fn query_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueueItem>, StoreError>;

    /// Atomically move a scheduled item to processing and count the attempt.
    async fn claim(&self, id: QueueItemId, now: DateTime<Utc>) -> Result<ClaimOutcome, StoreError>;

    /// Point update after dispatch. Only valid on a processing item.
    async fn update(&self, id: QueueItemId, transition: ItemTransition) -> Result<(), StoreError>;

    async fn append_audit(&self, record: AuditRecord) -> Result<(), StoreError>;

    /// Delete up to `batch_size` records older than the newest `retention`.
    /// Returns the number deleted.
    async fn prune_audit(&self, retention: usize, batch_size: usize) -> Result<usize, StoreError>;

    // Producer side.

    async fn insert(&self, item: QueueItem) -> Result<(), StoreError>;

    async fn get(&self, id: QueueItemId) -> Result<Option<QueueItem>, StoreError>;

    /// Cancel a scheduled item. Fails with `IllegalTransition` otherwise.
    async fn cancel(&self, id: QueueItemId, now: DateTime<Utc>) -> Result<QueueItem, StoreError>;

    async fn list_for_owner(
        &self,
        owner_id: &str,
        statuses: &[QueueStatus],
        order: ListOrder,
        limit: usize,
    ) -> Result<Vec<QueueItem>, StoreError>;

    // Observability.

    async fn counts_by_status(&self) -> Result<QueueCounts, StoreError>;

    async fn audit_len(&self) -> Result<usize, StoreError>;
}
