//! Retry broadcast and confirmation engine.
//!
//! [`RetrySender`] owns the lifecycle of exactly one transaction: send it
//! everywhere, keep rebroadcasting, and race every confirmation channel
//! until one produces a terminal status or the transaction can no longer
//! land. Create a fresh sender per transaction.

mod confirm;
mod engine;

pub use engine::RetrySender;
