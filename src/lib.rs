//! Adaptive EVM event log fetching over a pool of unreliable RPC endpoints.
//!
//! The main entry point is [`ContractEventsBuilder`]: describe the logs you want with an
//! [`EventQuery`], connect the builder to a [`transport::TransportRegistry`] and
//! [`run`](ContractEvents::run) it. The returned [`ContractEventsHandle`] streams
//! [`Snapshot`]s: every matching log fetched so far, in chain order, plus progress telemetry.
//!
//! # How ranges are fetched
//!
//! RPC providers differ wildly in how many blocks a single `eth_getLogs` call may span and how
//! reliably they answer. Instead of hard-coding limits, the fetcher learns them:
//!
//! 1. Every attempt is recorded as a [`strategy::RequestStat`].
//! 2. [`strategy::compute_strategy`] folds recent stats into an ordered fallback chain of
//!    (transport, range size, timeout, retries) entries, probing the next range size up while a
//!    transport keeps succeeding.
//! 3. [`scheduler::get_remaining_segments`] splits the not yet fetched part of the query range
//!    into segments; one at a time while the strategy converges, in batches once it is stable.
//! 4. [`fetch_segment`] walks the chain for every segment until some entry succeeds.
//!
//! An optional [`capability benchmark`](benchmark) seeds the statistics before real work
//! starts, and a [`latency probe`](probe) calibrates timeouts for transports without history.
//!
//! # Caching and finality
//!
//! With a [`cache::LogStore`] configured, every fetched range is persisted as soon as it
//! arrives, clipped to the finalized block. On startup the cached ranges are
//! [`rehydrated`](cache::rehydrate): merged into contiguous spans, clipped to the current
//! finalized block, and written back, so only missing blocks are fetched again.
//!
//! # Ordering and duplicates
//!
//! Snapshot logs are ordered by (block number, transaction index, log index) with pending logs
//! last, and deduplicated by (block hash, transaction hash, log index).

#[macro_use]
mod logging;

pub mod aggregator;
pub mod benchmark;
pub mod block_numbers;
pub mod cache;
pub mod fetcher;
pub mod probe;
pub mod scheduler;
pub mod strategy;
pub mod transport;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod error;
mod executor;

pub use aggregator::{Snapshot, aggregate, fraction_fetched, log_order_key};
pub use benchmark::{BenchmarkCache, BenchmarkReport, CapabilityBenchmark};
pub use cache::{JsonFileStore, LogStore, MemoryStore, coalesce_entries, rehydrate};
pub use error::FetchError;
pub use executor::{FetchedRange, SegmentOutcome, fetch_segment};
pub use fetcher::{ContractEvents, ContractEventsBuilder, ContractEventsHandle, EventQuery};
pub use probe::{LatencyProbe, PingSource};
pub use scheduler::get_remaining_segments;
pub use strategy::compute_strategy;
