//! Ports - abstraction layer.
//!
//! Each trait is a seam to something outside the core: wall time, id minting,
//! the document store holding the queue, and the message transport.

pub mod clock;
pub mod dispatch;
pub mod id_generator;
pub mod queue_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dispatch::{Delivery, DispatchExecutor, OwnerContext};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::queue_store::{Claim, ClaimOutcome, ItemTransition, ListOrder, QueueStore};
