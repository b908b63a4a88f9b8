//! Queue item: payload + delivery bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{QueueItemId, QueueStatus, SendPayload};

/// One scheduled message.
///
/// Design:
/// - This is the single source of truth for a message's delivery state.
/// - All state transitions go through the methods below; each one checks
///   [`QueueStatus::can_transition_to`] before touching any field.
/// - `*_at` milestones are written the first time the transition happens and
///   never reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: QueueItemId,
    pub owner_id: Option<String>,
    pub payload: SendPayload,
    pub status: QueueStatus,

    /// Number of claims so far (including the current one while Processing).
    pub attempts: u32,

    /// Due time. Pushed forward on retry.
    pub scheduled_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,

    /// Delivery id returned by the executor. Only set on success.
    pub message_id: Option<String>,
}

/// Returned by a transition method when the current status forbids it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRejected {
    pub from: QueueStatus,
    pub to: QueueStatus,
}

impl QueueItem {
    pub fn new(
        id: QueueItemId,
        owner_id: Option<String>,
        payload: SendPayload,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            payload,
            status: QueueStatus::Scheduled,
            attempts: 0,
            scheduled_at,
            created_at: now,
            updated_at: now,
            last_attempt_at: None,
            sent_at: None,
            failed_at: None,
            cancelled_at: None,
            last_error: None,
            message_id: None,
        }
    }

    /// Scheduled and past its due time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Scheduled && self.scheduled_at <= now
    }

    fn transition(&mut self, to: QueueStatus, now: DateTime<Utc>) -> Result<(), TransitionRejected> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionRejected {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Claim: mark as processing and count the attempt.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) -> Result<(), TransitionRejected> {
        self.transition(QueueStatus::Processing, now)?;
        self.attempts += 1;
        self.last_attempt_at.get_or_insert(now);
        Ok(())
    }

    pub fn mark_sent(&mut self, message_id: String, now: DateTime<Utc>) -> Result<(), TransitionRejected> {
        self.transition(QueueStatus::Sent, now)?;
        self.message_id = Some(message_id);
        self.last_error = None;
        self.sent_at.get_or_insert(now);
        Ok(())
    }

    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) -> Result<(), TransitionRejected> {
        self.transition(QueueStatus::Failed, now)?;
        self.last_error = Some(error);
        self.failed_at.get_or_insert(now);
        Ok(())
    }

    /// Put back in the queue with a later due time.
    pub fn reschedule(
        &mut self,
        next_run_at: DateTime<Utc>,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionRejected> {
        self.transition(QueueStatus::Scheduled, now)?;
        self.scheduled_at = next_run_at;
        self.last_error = Some(error);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), TransitionRejected> {
        self.transition(QueueStatus::Cancelled, now)?;
        self.cancelled_at.get_or_insert(now);
        Ok(())
    }
}
