//! DispatchExecutor port - the actual send.
//!
//! Rendering, address resolution and transport all live behind this trait;
//! the processor only sees a delivery id or an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{DispatchError, QueueItemId, SendPayload};

/// Who asked for the message. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContext {
    pub item_id: QueueItemId,
    pub owner_id: Option<String>,
}

/// Successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub message_id: String,
}

#[async_trait]
pub trait DispatchExecutor: Send + Sync {
    async fn send(&self, payload: &SendPayload, owner: &OwnerContext) -> Result<Delivery, DispatchError>;
}
