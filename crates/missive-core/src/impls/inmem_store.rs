//! In-memory queue store.
//!
//! Suitable for tests and single-process deployments. All reads and writes
//! of one operation happen under a single lock acquisition with no `.await`
//! in between, which makes `claim` a true read-then-conditionally-write
//! transaction.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::app::status::QueueCounts;
use crate::domain::{
    AuditRecord, QueueItem, QueueItemId, QueueStatus, StoreError, TransitionRejected,
};
use crate::ports::{Claim, ClaimOutcome, ItemTransition, ListOrder, QueueStore};

/// Due-time index entry. Ordered by due time, then id, so the oldest-due
/// item comes first and ties are deterministic.
type DueEntry = (DateTime<Utc>, QueueItemId);

#[derive(Default)]
struct InMemoryState {
    /// All queue items (single source of truth).
    items: HashMap<QueueItemId, QueueItem>,

    /// Index of items currently `Scheduled`.
    scheduled: BTreeSet<DueEntry>,

    /// Audit trail in append order, tagged with a sequence number.
    audit: Vec<(u64, AuditRecord)>,

    next_audit_seq: u64,
}

impl InMemoryState {
    fn item_mut(&mut self, id: QueueItemId) -> Result<&mut QueueItem, StoreError> {
        self.items.get_mut(&id).ok_or(StoreError::NotFound(id))
    }

    fn counts_by_status(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for item in self.items.values() {
            counts.record(item.status);
        }
        counts
    }
}

fn rejected(id: QueueItemId, e: TransitionRejected) -> StoreError {
    StoreError::IllegalTransition {
        id,
        from: e.from,
        to: e.to,
    }
}

/// In-memory [`QueueStore`]. Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryQueueStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit trail, newest first.
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        let state = self.state.lock().await;
        state.audit.iter().rev().map(|(_, r)| r.clone()).collect()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn query_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueueItem>, StoreError> {
        let state = self.state.lock().await;
        let due = state
            .scheduled
            .iter()
            .filter_map(|(_, id)| state.items.get(id))
            .take_while(|item| item.is_due(now))
            .take(limit)
            .cloned()
            .collect();
        Ok(due)
    }

    async fn claim(&self, id: QueueItemId, now: DateTime<Utc>) -> Result<ClaimOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let item = state.item_mut(id)?;
        if !item.status.is_claimable() {
            return Ok(ClaimOutcome::NotClaimed);
        }

        let before = item.clone();
        item.start_attempt(now).map_err(|e| rejected(id, e))?;
        let attempt = item.attempts;
        state.scheduled.remove(&(before.scheduled_at, id));

        Ok(ClaimOutcome::Claimed(Claim {
            item: before,
            attempt,
        }))
    }

    async fn update(&self, id: QueueItemId, transition: ItemTransition) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let item = state.item_mut(id)?;
        if item.status != QueueStatus::Processing {
            return Err(StoreError::IllegalTransition {
                id,
                from: item.status,
                to: transition.target(),
            });
        }

        let result = match transition {
            ItemTransition::Sent { message_id, at } => item.mark_sent(message_id, at),
            ItemTransition::Failed { error, at } => item.mark_failed(error, at),
            ItemTransition::Rescheduled {
                error,
                next_run_at,
                at,
            } => item.reschedule(next_run_at, error, at),
        };
        result.map_err(|e| rejected(id, e))?;

        if item.status == QueueStatus::Scheduled {
            let entry = (item.scheduled_at, id);
            state.scheduled.insert(entry);
        }
        Ok(())
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let seq = state.next_audit_seq;
        state.next_audit_seq += 1;
        state.audit.push((seq, record));
        Ok(())
    }

    async fn prune_audit(&self, retention: usize, batch_size: usize) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;

        // Newest first: creation time, then append order.
        let mut order: Vec<(DateTime<Utc>, u64)> = state
            .audit
            .iter()
            .map(|(seq, r)| (r.created_at, *seq))
            .collect();
        order.sort_unstable_by(|a, b| b.cmp(a));

        let doomed: BTreeSet<u64> = order
            .into_iter()
            .skip(retention)
            .take(batch_size)
            .map(|(_, seq)| seq)
            .collect();

        state.audit.retain(|(seq, _)| !doomed.contains(seq));
        Ok(doomed.len())
    }

    async fn insert(&self, item: QueueItem) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.items.contains_key(&item.id) {
            return Err(StoreError::Duplicate(item.id));
        }
        if item.status == QueueStatus::Scheduled {
            state.scheduled.insert((item.scheduled_at, item.id));
        }
        state.items.insert(item.id, item);
        Ok(())
    }

    async fn get(&self, id: QueueItemId) -> Result<Option<QueueItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.items.get(&id).cloned())
    }

    async fn cancel(&self, id: QueueItemId, now: DateTime<Utc>) -> Result<QueueItem, StoreError> {
        let mut state = self.state.lock().await;
        let item = state.item_mut(id)?;
        let due_at = item.scheduled_at;
        item.cancel(now).map_err(|e| rejected(id, e))?;
        let cancelled = item.clone();
        state.scheduled.remove(&(due_at, id));
        Ok(cancelled)
    }

    async fn list_for_owner(
        &self,
        owner_id: &str,
        statuses: &[QueueStatus],
        order: ListOrder,
        limit: usize,
    ) -> Result<Vec<QueueItem>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<QueueItem> = state
            .items
            .values()
            .filter(|item| item.owner_id.as_deref() == Some(owner_id))
            .filter(|item| statuses.contains(&item.status))
            .cloned()
            .collect();

        match order {
            ListOrder::ScheduledAtAsc => items.sort_by_key(|item| (item.scheduled_at, item.id)),
            ListOrder::UpdatedAtDesc => {
                items.sort_by(|a, b| (b.updated_at, b.id).cmp(&(a.updated_at, a.id)))
            }
        }
        items.truncate(limit);
        Ok(items)
    }

    async fn counts_by_status(&self) -> Result<QueueCounts, StoreError> {
        let state = self.state.lock().await;
        Ok(state.counts_by_status())
    }

    async fn audit_len(&self) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state.audit.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuditRecordId, SendPayload};
    use chrono::{Duration, TimeZone};
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn item_due_at(offset_min: i64, owner: &str) -> QueueItem {
        QueueItem::new(
            QueueItemId::from_ulid(Ulid::new()),
            Some(owner.to_string()),
            SendPayload::new("guest@example.com", "RSVP", "Please reply"),
            t0() + Duration::minutes(offset_min),
            t0() - Duration::hours(1),
        )
    }

    fn audit_at(created_at: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id: AuditRecordId::from_ulid(Ulid::new()),
            processed: 1,
            success_count: 1,
            failed_count: 0,
            skipped_count: 0,
            limit: 25,
            duration_ms: 3,
            started_at: created_at,
            finished_at: created_at,
            created_at,
        }
    }

    #[tokio::test]
    async fn query_due_orders_by_due_time_and_respects_limit() {
        let store = InMemoryQueueStore::new();
        let late = item_due_at(-1, "a");
        let early = item_due_at(-30, "a");
        let middle = item_due_at(-10, "a");
        let future = item_due_at(5, "a");
        for item in [&late, &early, &middle, &future] {
            store.insert(item.clone()).await.unwrap();
        }

        let due = store.query_due(t0(), 10).await.unwrap();
        let ids: Vec<_> = due.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![early.id, middle.id, late.id]);

        let capped = store.query_due(t0(), 2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].id, early.id);
    }

    #[tokio::test]
    async fn claim_is_exclusive() {
        let store = InMemoryQueueStore::new();
        let item = item_due_at(-1, "a");
        store.insert(item.clone()).await.unwrap();

        let first = store.claim(item.id, t0()).await.unwrap();
        let second = store.claim(item.id, t0()).await.unwrap();

        let ClaimOutcome::Claimed(claim) = first else {
            panic!("first claim must win");
        };
        assert_eq!(claim.attempt, 1);
        assert_eq!(claim.item.status, QueueStatus::Scheduled);
        assert!(matches!(second, ClaimOutcome::NotClaimed));

        let stored = store.get(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Processing);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_attempt_at, Some(t0()));
        assert!(store.query_due(t0(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let store = InMemoryQueueStore::new();
        let item = item_due_at(-1, "a");
        store.insert(item.clone()).await.unwrap();
        let id = item.id;

        let mut joins = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            joins.push(tokio::spawn(async move { store.claim(id, t0()).await }));
        }

        let mut winners = 0;
        for join in joins {
            if let ClaimOutcome::Claimed(_) = join.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.get(id).await.unwrap().unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn reschedule_returns_item_to_due_index() {
        let store = InMemoryQueueStore::new();
        let item = item_due_at(-1, "a");
        store.insert(item.clone()).await.unwrap();
        store.claim(item.id, t0()).await.unwrap();

        let next = t0() + Duration::minutes(5);
        store
            .update(
                item.id,
                ItemTransition::Rescheduled {
                    error: "smtp 421".into(),
                    next_run_at: next,
                    at: t0(),
                },
            )
            .await
            .unwrap();

        assert!(store.query_due(t0(), 10).await.unwrap().is_empty());
        let due = store.query_due(next, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].last_error.as_deref(), Some("smtp 421"));
    }

    #[tokio::test]
    async fn update_refuses_terminal_items() {
        let store = InMemoryQueueStore::new();
        let item = item_due_at(-1, "a");
        store.insert(item.clone()).await.unwrap();
        store.claim(item.id, t0()).await.unwrap();
        store
            .update(
                item.id,
                ItemTransition::Sent {
                    message_id: "mid".into(),
                    at: t0(),
                },
            )
            .await
            .unwrap();

        let err = store
            .update(
                item.id,
                ItemTransition::Failed {
                    error: "late".into(),
                    at: t0(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::IllegalTransition {
                from: QueueStatus::Sent,
                to: QueueStatus::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancelled_items_are_never_due() {
        let store = InMemoryQueueStore::new();
        let item = item_due_at(-1, "a");
        store.insert(item.clone()).await.unwrap();

        let cancelled = store.cancel(item.id, t0()).await.unwrap();
        assert_eq!(cancelled.status, QueueStatus::Cancelled);
        assert_eq!(cancelled.cancelled_at, Some(t0()));
        assert!(store.query_due(t0(), 10).await.unwrap().is_empty());
        assert!(matches!(
            store.claim(item.id, t0()).await.unwrap(),
            ClaimOutcome::NotClaimed
        ));
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryQueueStore::new();
        let item = item_due_at(1, "a");
        store.insert(item.clone()).await.unwrap();
        assert!(matches!(
            store.insert(item).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn prune_keeps_newest_records() {
        let store = InMemoryQueueStore::new();
        for i in 0..10 {
            store
                .append_audit(audit_at(t0() + Duration::seconds(i)))
                .await
                .unwrap();
        }

        let deleted = store.prune_audit(4, 3).await.unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(store.audit_len().await.unwrap(), 7);

        let kept = store.audit_records().await;
        assert_eq!(kept[0].created_at, t0() + Duration::seconds(9));
        // records 3, 4, 5 (zero-based) went; 0..=2 survive beyond the window
        assert_eq!(kept[6].created_at, t0());
        assert!(kept.iter().all(|r| r.created_at != t0() + Duration::seconds(5)));
    }

    #[tokio::test]
    async fn list_for_owner_filters_and_orders() {
        let store = InMemoryQueueStore::new();
        let later = item_due_at(20, "alice");
        let sooner = item_due_at(10, "alice");
        let other = item_due_at(5, "bob");
        for item in [&later, &sooner, &other] {
            store.insert(item.clone()).await.unwrap();
        }

        let upcoming = store
            .list_for_owner("alice", &[QueueStatus::Scheduled], ListOrder::ScheduledAtAsc, 100)
            .await
            .unwrap();
        let ids: Vec<_> = upcoming.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![sooner.id, later.id]);

        let counts = store.counts_by_status().await.unwrap();
        assert_eq!(counts.scheduled, 3);
        assert_eq!(counts.total(), 3);
    }
}
