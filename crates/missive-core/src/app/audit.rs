//! AuditRecorder - best-effort batch summaries with self-pruning.

use std::sync::Arc;

use crate::domain::AuditRecord;
use crate::ports::QueueStore;

/// Appends one record per batch and trims the trail afterwards.
///
/// Neither step can fail the batch: errors are logged and swallowed, since
/// the queue items have already been mutated by the time we get here.
pub struct AuditRecorder {
    store: Arc<dyn QueueStore>,
    retention: usize,
    prune_batch: usize,
}

impl AuditRecorder {
    pub const RETENTION: usize = 200;
    pub const PRUNE_BATCH: usize = 50;

    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self::with_bounds(store, Self::RETENTION, Self::PRUNE_BATCH)
    }

    pub fn with_bounds(store: Arc<dyn QueueStore>, retention: usize, prune_batch: usize) -> Self {
        Self {
            store,
            retention,
            prune_batch,
        }
    }

    /// Append `record`, then prune. Pruning only runs after a successful append.
    pub async fn record(&self, record: AuditRecord) {
        let id = record.id;
        if let Err(e) = self.store.append_audit(record).await {
            tracing::warn!(audit_id = %id, error = %e, "failed to append audit record");
            return;
        }

        match self.store.prune_audit(self.retention, self.prune_batch).await {
            Ok(0) => {}
            Ok(deleted) => tracing::debug!(deleted, "pruned audit trail"),
            Err(e) => tracing::warn!(error = %e, "failed to prune audit trail"),
        }
    }
}
