//! Queue policy shared by the batch processor and the store implementations.

mod retry;

pub use retry::RetryPolicy;
