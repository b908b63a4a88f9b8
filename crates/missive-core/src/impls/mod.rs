//! Impls - port implementations for development, tests and single-process
//! deployments.
//!
//! - **InMemoryQueueStore**: `QueueStore` backed by a mutex-guarded map
//! - **LogDispatch**: `DispatchExecutor` that only logs
//!
//! Production backends (a document database, a mail transport) implement the
//! same ports in the embedding service.

pub mod dispatch;
pub mod inmem_store;

pub use self::dispatch::LogDispatch;
pub use self::inmem_store::InMemoryQueueStore;
