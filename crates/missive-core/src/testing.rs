//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Semaphore;
use ulid::Ulid;

use crate::app::batch::BatchProcessor;
use crate::app::status::QueueCounts;
use crate::domain::{
    AuditRecord, DispatchError, QueueItem, QueueItemId, QueueStatus, SendPayload, StoreError,
};
use crate::impls::InMemoryQueueStore;
use crate::ports::{
    ClaimOutcome, Delivery, DispatchExecutor, FixedClock, ItemTransition, ListOrder, OwnerContext,
    QueueStore, UlidGenerator,
};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
}

/// A valid item addressed to `to`, due `minutes_ago` before `t0()`.
pub(crate) fn due_item(to: &str, minutes_ago: i64) -> QueueItem {
    QueueItem::new(
        QueueItemId::from_ulid(Ulid::new()),
        Some("owner-1".to_string()),
        SendPayload::new(to, "Save the date", "We are getting married!"),
        t0() - Duration::minutes(minutes_ago),
        t0() - Duration::days(1),
    )
}

pub(crate) fn processor(
    store: Arc<dyn QueueStore>,
    dispatch: Arc<dyn DispatchExecutor>,
    clock: FixedClock,
) -> BatchProcessor {
    BatchProcessor::new(
        store,
        dispatch,
        Arc::new(clock.clone()),
        Arc::new(UlidGenerator::new(clock)),
    )
}

/// Executor whose behaviour is scripted per recipient address.
#[derive(Default)]
pub(crate) struct ScriptedDispatch {
    failures_left: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<QueueItemId>>,
}

impl ScriptedDispatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` sends to `to`, then succeed.
    pub(crate) fn fail_times(self, to: &str, n: u32) -> Self {
        self.failures_left
            .lock()
            .unwrap()
            .insert(to.to_string(), n);
        self
    }

    pub(crate) fn calls(&self) -> Vec<QueueItemId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DispatchExecutor for ScriptedDispatch {
    async fn send(&self, payload: &SendPayload, owner: &OwnerContext) -> Result<Delivery, DispatchError> {
        self.calls.lock().unwrap().push(owner.item_id);
        let mut failures = self.failures_left.lock().unwrap();
        if let Some(left) = failures.get_mut(&payload.to)
            && *left > 0
        {
            *left -= 1;
            return Err(DispatchError::Rejected(format!("smtp 421 for {}", payload.to)));
        }
        Ok(Delivery {
            message_id: format!("mid-{}", owner.item_id),
        })
    }
}

/// In-memory store with switchable failures and an optional gate that
/// holds every `query_due` until a permit is released.
#[derive(Default)]
pub(crate) struct FaultyStore {
    pub(crate) inner: InMemoryQueueStore,
    pub(crate) query_calls: AtomicUsize,
    pub(crate) fail_query: AtomicBool,
    pub(crate) fail_claim: AtomicBool,
    pub(crate) fail_update: AtomicBool,
    pub(crate) fail_append: AtomicBool,
    pub(crate) fail_prune: AtomicBool,
    pub(crate) gate: Option<Arc<Semaphore>>,
}

impl FaultyStore {
    pub(crate) fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("{op} failed")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueStore for FaultyStore {
    async fn query_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueueItem>, StoreError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?
                .forget();
        }
        Self::check(&self.fail_query, "query")?;
        self.inner.query_due(now, limit).await
    }

    async fn claim(&self, id: QueueItemId, now: DateTime<Utc>) -> Result<ClaimOutcome, StoreError> {
        Self::check(&self.fail_claim, "claim")?;
        self.inner.claim(id, now).await
    }

    async fn update(&self, id: QueueItemId, transition: ItemTransition) -> Result<(), StoreError> {
        Self::check(&self.fail_update, "update")?;
        self.inner.update(id, transition).await
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<(), StoreError> {
        Self::check(&self.fail_append, "append")?;
        self.inner.append_audit(record).await
    }

    async fn prune_audit(&self, retention: usize, batch_size: usize) -> Result<usize, StoreError> {
        Self::check(&self.fail_prune, "prune")?;
        self.inner.prune_audit(retention, batch_size).await
    }

    async fn insert(&self, item: QueueItem) -> Result<(), StoreError> {
        self.inner.insert(item).await
    }

    async fn get(&self, id: QueueItemId) -> Result<Option<QueueItem>, StoreError> {
        self.inner.get(id).await
    }

    async fn cancel(&self, id: QueueItemId, now: DateTime<Utc>) -> Result<QueueItem, StoreError> {
        self.inner.cancel(id, now).await
    }

    async fn list_for_owner(
        &self,
        owner_id: &str,
        statuses: &[QueueStatus],
        order: ListOrder,
        limit: usize,
    ) -> Result<Vec<QueueItem>, StoreError> {
        self.inner.list_for_owner(owner_id, statuses, order, limit).await
    }

    async fn counts_by_status(&self) -> Result<QueueCounts, StoreError> {
        self.inner.counts_by_status().await
    }

    async fn audit_len(&self) -> Result<usize, StoreError> {
        self.inner.audit_len().await
    }
}
