//! Task lifecycle building blocks.
//!
//! Pure types and capability traits shared by the infrastructure crates
//! (no I/O here).

pub mod backoff;
pub mod dead_letter;
pub mod delivery;
pub mod error;
pub mod task;

pub use backoff::{
    BackoffConfig, BackoffPolicy, BackoffStrategy, ExponentialBackoff, FixedBackoff,
    JitteredBackoff, LinearBackoff,
};
pub use dead_letter::{DeadLetterReason, DeadLetterSink, LoggingDeadLetterSink};
pub use delivery::Delivery;
pub use error::{RelayError, RelayResult};
pub use task::{Payload, Task};
