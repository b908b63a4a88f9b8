//! Batch summary written to the audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuditRecordId;

/// One summary per processed, non-dry-run batch with at least one result.
///
/// Records are append-only: created once, never mutated, eventually pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: AuditRecordId,
    pub processed: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub limit: usize,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
