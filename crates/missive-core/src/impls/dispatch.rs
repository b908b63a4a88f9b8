//! LogDispatch - executor that records sends in the log instead of
//! delivering them. Used by the CLI and for local development.

use async_trait::async_trait;
use ulid::Ulid;

use crate::domain::{DispatchError, SendPayload};
use crate::ports::{Delivery, DispatchExecutor, OwnerContext};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatch;

impl LogDispatch {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DispatchExecutor for LogDispatch {
    async fn send(&self, payload: &SendPayload, owner: &OwnerContext) -> Result<Delivery, DispatchError> {
        let message_id = format!("log-{}", Ulid::new());
        tracing::info!(
            item_id = %owner.item_id,
            owner_id = owner.owner_id.as_deref().unwrap_or("-"),
            to = %payload.to,
            subject = %payload.subject,
            attachments = payload.attachments.len(),
            record_only = payload.record_only,
            %message_id,
            "message dispatched to log"
        );
        Ok(Delivery { message_id })
    }
}
