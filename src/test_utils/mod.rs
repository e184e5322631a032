//! Helpers for testing code built on this crate: a scripted transport, log builders, and
//! assertion macros for snapshot streams.

pub mod logs;
pub mod macros;
mod mock;

pub use logs::{block_hash, event_log, log_at, logs_every, pending_log, tx_hash};
pub use mock::MockTransport;
