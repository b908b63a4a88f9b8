//! Status - queue counts by status.

use serde::{Deserialize, Serialize};

use crate::domain::QueueStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub scheduled: usize,
    pub processing: usize,
    pub sent: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueCounts {
    pub fn record(&mut self, status: QueueStatus) {
        match status {
            QueueStatus::Scheduled => self.scheduled += 1,
            QueueStatus::Processing => self.processing += 1,
            QueueStatus::Sent => self.sent += 1,
            QueueStatus::Failed => self.failed += 1,
            QueueStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.scheduled + self.processing + self.sent + self.failed + self.cancelled
    }
}
