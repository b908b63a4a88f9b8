//! ScheduleService - producer side of the queue.
//!
//! Owners enqueue messages for later, cancel them while they are still
//! waiting, and list what is upcoming and what already happened.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{QueueItem, QueueItemId, QueueStatus, ScheduleError, SendPayload, StoreError};
use crate::ports::{Clock, IdGenerator, ListOrder, QueueStore};

/// How far ahead of now a message must be scheduled.
pub const MIN_LEAD_SECS: i64 = 60;

/// Page size of both halves of [`OwnerQueue`].
pub const LIST_LIMIT: usize = 100;

const UPCOMING: &[QueueStatus] = &[QueueStatus::Scheduled, QueueStatus::Processing];
const HISTORY: &[QueueStatus] = &[QueueStatus::Sent, QueueStatus::Failed, QueueStatus::Cancelled];

/// An owner's view of the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerQueue {
    /// Waiting or in flight, soonest first.
    pub upcoming: Vec<QueueItem>,
    /// Finished one way or another, most recently touched first.
    pub history: Vec<QueueItem>,
}

pub struct ScheduleService {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn QueueStore>, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { store, clock, ids }
    }

    /// Sanitise a caller-supplied payload and enqueue it.
    pub async fn schedule(
        &self,
        owner_id: &str,
        raw_payload: &Value,
        scheduled_at: DateTime<Utc>,
    ) -> Result<QueueItem, ScheduleError> {
        self.schedule_payload(owner_id, SendPayload::from_raw(raw_payload), scheduled_at)
            .await
    }

    pub async fn schedule_payload(
        &self,
        owner_id: &str,
        payload: SendPayload,
        scheduled_at: DateTime<Utc>,
    ) -> Result<QueueItem, ScheduleError> {
        if !payload.is_valid() {
            return Err(ScheduleError::InvalidPayload);
        }

        let now = self.clock.now();
        if scheduled_at < now + Duration::seconds(MIN_LEAD_SECS) {
            return Err(ScheduleError::TooSoon);
        }

        let item = QueueItem::new(
            self.ids.queue_item_id(),
            Some(owner_id.to_string()),
            payload,
            scheduled_at,
            now,
        );
        self.store.insert(item.clone()).await?;

        tracing::info!(
            item_id = %item.id,
            owner_id,
            scheduled_at = %item.scheduled_at,
            "message scheduled"
        );
        Ok(item)
    }

    /// Cancel a message that has not been picked up yet.
    pub async fn cancel(&self, owner_id: &str, id: QueueItemId) -> Result<QueueItem, ScheduleError> {
        let item = self.store.get(id).await?.ok_or(ScheduleError::NotFound)?;
        if item.owner_id.as_deref() != Some(owner_id) {
            return Err(ScheduleError::Forbidden);
        }
        if item.status != QueueStatus::Scheduled {
            return Err(ScheduleError::NotCancellable(item.status));
        }

        // a worker may claim it between get() and cancel()
        let cancelled = self
            .store
            .cancel(id, self.clock.now())
            .await
            .map_err(|e| match e {
                StoreError::IllegalTransition { from, .. } => ScheduleError::NotCancellable(from),
                StoreError::NotFound(_) => ScheduleError::NotFound,
                other => ScheduleError::Store(other),
            })?;

        tracing::info!(item_id = %id, owner_id, "scheduled message cancelled");
        Ok(cancelled)
    }

    pub async fn list(&self, owner_id: &str) -> Result<OwnerQueue, ScheduleError> {
        let upcoming = self
            .store
            .list_for_owner(owner_id, UPCOMING, ListOrder::ScheduledAtAsc, LIST_LIMIT)
            .await?;
        let history = self
            .store
            .list_for_owner(owner_id, HISTORY, ListOrder::UpdatedAtDesc, LIST_LIMIT)
            .await?;
        Ok(OwnerQueue { upcoming, history })
    }
}
