use std::{sync::Arc, time::Duration};

use crate::{
    FetchError,
    cache::LogStore,
    fetcher::{
        ContractEvents, EventQuery,
        controller::{ControllerConfig, DEFAULT_MAX_SEGMENT_ATTEMPTS, DEFAULT_SEGMENT_RETRY_DELAY},
    },
    probe::PingSource,
    scheduler::{DEFAULT_REQUESTS_PER_BATCH, DEFAULT_STABILIZATION_WINDOW},
    strategy::{DEFAULT_MAX_REQUESTS_TO_TRACK, StrategyConfig},
    transport::{RequestOptions, TransportRegistry},
};

/// Default period of the scheduling timer.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);
/// Default period between refreshes of the required range and the finalized block.
pub const DEFAULT_BLOCK_REFRESH_INTERVAL: Duration = Duration::from_secs(12);

/// Builder/configuration for a [`ContractEvents`] fetcher.
#[derive(Clone, Debug)]
pub struct ContractEventsBuilder {
    pub(crate) query: EventQuery,
    /// Segments scheduled at once when the strategy is stable.
    pub requests_per_batch: usize,
    /// How long the best range size must stay unchanged before full batches are scheduled.
    pub stabilization_window: Duration,
    /// Capacity of the request statistics ring.
    pub max_requests_to_track: usize,
    /// Attempts per segment before it is abandoned.
    pub max_segment_attempts: u32,
    /// Delay before the first retry of a failed segment.
    pub segment_retry_delay: Duration,
    pub tick_interval: Duration,
    pub block_refresh_interval: Duration,
    /// Run the capability benchmark whenever a session starts.
    pub benchmark_on_start: bool,
    pub ping: PingSource,
    pub store: Option<Arc<dyn LogStore>>,
    pub strategy_config: StrategyConfig,
    /// Budget for block number lookups.
    pub block_request_options: RequestOptions,
    /// Report every known-range inconsistency instead of only the first one.
    pub debug: bool,
}

impl ContractEventsBuilder {
    /// Creates a builder for `query` with default configuration.
    #[must_use]
    pub fn new(query: EventQuery) -> Self {
        Self {
            query,
            requests_per_batch: DEFAULT_REQUESTS_PER_BATCH,
            stabilization_window: DEFAULT_STABILIZATION_WINDOW,
            max_requests_to_track: DEFAULT_MAX_REQUESTS_TO_TRACK,
            max_segment_attempts: DEFAULT_MAX_SEGMENT_ATTEMPTS,
            segment_retry_delay: DEFAULT_SEGMENT_RETRY_DELAY,
            tick_interval: DEFAULT_TICK_INTERVAL,
            block_refresh_interval: DEFAULT_BLOCK_REFRESH_INTERVAL,
            benchmark_on_start: false,
            ping: PingSource::Disabled,
            store: None,
            strategy_config: StrategyConfig::default(),
            block_request_options: RequestOptions::default(),
            debug: false,
        }
    }

    /// Sets how many segments may be in flight once the strategy is stable.
    ///
    /// Must be greater than 0.
    #[must_use]
    pub fn requests_per_batch(mut self, requests_per_batch: usize) -> Self {
        self.requests_per_batch = requests_per_batch;
        self
    }

    #[must_use]
    pub fn stabilization_window(mut self, window: Duration) -> Self {
        self.stabilization_window = window;
        self
    }

    /// Sets how many request outcomes feed the strategy engine.
    ///
    /// Must be greater than 0.
    #[must_use]
    pub fn max_requests_to_track(mut self, max_requests_to_track: usize) -> Self {
        self.max_requests_to_track = max_requests_to_track;
        self
    }

    /// Sets how many times a segment is attempted before it is reported as stalled.
    ///
    /// Must be greater than 0.
    #[must_use]
    pub fn max_segment_attempts(mut self, attempts: u32) -> Self {
        self.max_segment_attempts = attempts;
        self
    }

    #[must_use]
    pub fn segment_retry_delay(mut self, delay: Duration) -> Self {
        self.segment_retry_delay = delay;
        self
    }

    /// Sets the period of the scheduling timer. Must be non-zero.
    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    #[must_use]
    pub fn block_refresh_interval(mut self, interval: Duration) -> Self {
        self.block_refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn benchmark_on_start(mut self, benchmark: bool) -> Self {
        self.benchmark_on_start = benchmark;
        self
    }

    #[must_use]
    pub fn ping(mut self, ping: PingSource) -> Self {
        self.ping = ping;
        self
    }

    /// Persists fetched ranges in `store` and loads them back on startup.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn LogStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn strategy_config(mut self, config: StrategyConfig) -> Self {
        self.strategy_config = config;
        self
    }

    #[must_use]
    pub fn block_request_options(mut self, options: RequestOptions) -> Self {
        self.block_request_options = options;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validates the configuration and binds it to `registry`.
    ///
    /// # Errors
    ///
    /// * [`FetchError::InvalidRequestsPerBatch`] if `requests_per_batch` is 0.
    /// * [`FetchError::InvalidMaxRequestsToTrack`] if `max_requests_to_track` is 0.
    /// * [`FetchError::InvalidMaxSegmentAttempts`] if `max_segment_attempts` is 0.
    /// * [`FetchError::InvalidTickInterval`] if `tick_interval` or `block_refresh_interval` is
    ///   zero.
    /// * [`FetchError::InvalidPingInterval`] if the ping source measures on a zero interval.
    pub fn connect(self, registry: TransportRegistry) -> Result<ContractEvents, FetchError> {
        if self.requests_per_batch == 0 {
            return Err(FetchError::InvalidRequestsPerBatch);
        }
        if self.max_requests_to_track == 0 {
            return Err(FetchError::InvalidMaxRequestsToTrack);
        }
        if self.max_segment_attempts == 0 {
            return Err(FetchError::InvalidMaxSegmentAttempts);
        }
        if self.tick_interval.is_zero() || self.block_refresh_interval.is_zero() {
            return Err(FetchError::InvalidTickInterval);
        }
        if let PingSource::Probe { interval, .. } = &self.ping
            && interval.is_zero()
        {
            return Err(FetchError::InvalidPingInterval);
        }

        let controller = ControllerConfig {
            requests_per_batch: self.requests_per_batch,
            stabilization_window: self.stabilization_window,
            max_requests_to_track: self.max_requests_to_track,
            max_segment_attempts: self.max_segment_attempts,
            segment_retry_delay: self.segment_retry_delay,
            strategy: self.strategy_config,
            debug: self.debug,
        };

        Ok(ContractEvents {
            query: self.query,
            registry,
            controller,
            tick_interval: self.tick_interval,
            block_refresh_interval: self.block_refresh_interval,
            benchmark_on_start: self.benchmark_on_start,
            ping: self.ping,
            store: self.store,
            block_request_options: self.block_request_options,
        })
    }
}
