//! Error types, one enum per concern.

use std::time::Duration;

use thiserror::Error;

use super::{QueueItemId, QueueStatus};

/// Failures raised by a [`crate::ports::QueueStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("queue item not found: {0}")]
    NotFound(QueueItemId),

    #[error("duplicate queue item: {0}")]
    Duplicate(QueueItemId),

    /// A write would break the state machine (e.g. touching a terminal item).
    #[error("illegal transition for {id}: {from} -> {to}")]
    IllegalTransition {
        id: QueueItemId,
        from: QueueStatus,
        to: QueueStatus,
    },

    /// Backend unreachable or the operation failed for infrastructure reasons.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures raised by a [`crate::ports::DispatchExecutor`].
///
/// Every variant is treated as transient by the batch processor.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Rejected(String),

    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),
}

/// Producer-side scheduling errors. The `Display` strings are stable codes.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("payload-invalid")]
    InvalidPayload,

    #[error("scheduled-at-too-soon")]
    TooSoon,

    #[error("not-found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("not-cancellable: item is {0}")]
    NotCancellable(QueueStatus),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Worker configuration that cannot be used.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("worker interval must be a positive, finite number of milliseconds (got {0:?})")]
    InvalidInterval(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
