//! Adaptive selection of (transport, range size, timeout, retries) combinations.
//!
//! Every `eth_getLogs` attempt produces a [`RequestStat`]. The most recent ones are kept in a
//! bounded [`RequestStats`] ring and folded by [`compute_strategy`] into per-transport
//! [`BLOCK_BINS`] statistics (EMA latency, EMA stability), from which an ordered fallback chain,
//! the [`Strategy`], is derived.
//!
//! The loop is closed: the fetch executor walks the strategy, its outcomes are pushed back into
//! the ring, and the strategy is recomputed. A transport that keeps succeeding at one bin is
//! offered the next bin as an exploratory entry; repeated failures there withdraw the offer.

mod bins;
mod engine;
mod stats;

pub use bins::{BLOCK_BINS, MaxBlocks, bin_index};
pub use engine::{
    BinStats, DEFAULT_EMA_ALPHA, DEFAULT_EXPLORATION_CANCELLATION, DEFAULT_EXPLORATION_INITIATION,
    DEFAULT_EXPLORATORY_RETRIES, DEFAULT_FALLBACK_TIMEOUT, DEFAULT_LOOKBACK_WINDOW,
    DEFAULT_MAX_TIMEOUT, DEFAULT_MIN_STABILITY, DEFAULT_MIN_TIMEOUT, DEFAULT_ORDINARY_RETRIES,
    DEFAULT_STRATEGY_RETRY_DELAY, Strategy, StrategyConfig, StrategyEntry, TransportBins,
    collect_bin_stats, compute_strategy,
};
pub use stats::{
    DEFAULT_MAX_REQUESTS_TO_TRACK, RequestStat, RequestStats, RequestStatus, StatRecord,
};
