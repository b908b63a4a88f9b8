//! Queue item state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a scheduled message.
///
/// State transitions:
/// - Scheduled -> Processing -> Sent
/// - Scheduled -> Processing -> Scheduled (transient failure, attempts < max)
/// - Scheduled -> Processing -> Failed (attempts exhausted, or invalid payload)
/// - Scheduled -> Cancelled (external cancel)
///
/// `Processing` is only held between a claim and the write-back of that
/// claim's dispatch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for its due time (initial, re-enterable).
    Scheduled,

    /// Claimed by one batch; dispatch in flight.
    Processing,

    /// Delivered.
    Sent,

    /// Failed permanently.
    Failed,

    /// Cancelled by its owner before it was claimed.
    Cancelled,
}

impl QueueStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueueStatus::Sent | QueueStatus::Failed | QueueStatus::Cancelled
        )
    }

    /// Only scheduled items may be claimed.
    pub fn is_claimable(self) -> bool {
        matches!(self, QueueStatus::Scheduled)
    }

    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, next),
            (Scheduled, Processing)
                | (Scheduled, Cancelled)
                | (Processing, Sent)
                | (Processing, Scheduled)
                | (Processing, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Scheduled => "scheduled",
            QueueStatus::Processing => "processing",
            QueueStatus::Sent => "sent",
            QueueStatus::Failed => "failed",
            QueueStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
