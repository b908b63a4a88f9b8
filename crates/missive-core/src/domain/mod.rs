//! Domain model (ids, payloads, queue items, audit records, errors).

pub mod audit;
pub mod errors;
pub mod ids;
pub mod item;
pub mod payload;
pub mod status;

pub use audit::AuditRecord;
pub use errors::{ConfigError, DispatchError, ScheduleError, StoreError};
pub use ids::{AuditRecordId, Id, IdMarker, QueueItemId};
pub use item::{QueueItem, TransitionRejected};
pub use payload::{Attachment, SendPayload};
pub use status::QueueStatus;
