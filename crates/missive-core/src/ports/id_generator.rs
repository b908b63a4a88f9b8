//! IdGenerator port - id generation.
//!
//! - **UlidGenerator**: ULID ids timestamped by a [`Clock`]

use crate::domain::{AuditRecordId, QueueItemId};
use crate::ports::Clock;
use ulid::Ulid;

/// Generates ids that can be minted on several nodes without coordination.
pub trait IdGenerator: Send + Sync {
    fn queue_item_id(&self) -> QueueItemId;

    fn audit_record_id(&self) -> AuditRecordId;
}

/// ULID generator whose timestamp part comes from the injected clock, so a
/// `FixedClock` yields ids with a deterministic time prefix.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn queue_item_id(&self) -> QueueItemId {
        QueueItemId::from(self.next_ulid())
    }

    fn audit_record_id(&self) -> AuditRecordId {
        AuditRecordId::from(self.next_ulid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.queue_item_id();
        let id2 = id_gen.queue_item_id();

        assert_ne!(id1, id2);
    }

    #[test]
    fn fixed_clock_pins_timestamp_part() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.queue_item_id();
        let id2 = id_gen.audit_record_id();

        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert!(id2.to_string().starts_with("audit-"));
    }
}
