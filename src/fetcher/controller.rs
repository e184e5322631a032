use std::{collections::BTreeMap, time::Duration};

use alloy::rpc::types::Filter;
use tokio::time::Instant;

use crate::{
    aggregator::{Snapshot, aggregate},
    cache::{CacheEntry, QuerySignature, clip_to_finalized},
    executor::{FetchedRange, SegmentOutcome},
    scheduler::{
        DEFAULT_REQUESTS_PER_BATCH, DEFAULT_STABILIZATION_WINDOW, KnownRanges, StrategyStabilizer,
        get_remaining_segments,
    },
    strategy::{
        DEFAULT_MAX_REQUESTS_TO_TRACK, MaxBlocks, RequestStat, RequestStats, StatRecord, Strategy,
        StrategyConfig, compute_strategy,
    },
    transport::Transport,
};

/// Default number of attempts (each a full walk of the strategy) before a segment is abandoned.
pub const DEFAULT_MAX_SEGMENT_ATTEMPTS: u32 = 8;
/// Default delay before the first retry of a failed segment. Doubles with every failure.
pub const DEFAULT_SEGMENT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Upper bound of the per-segment retry delay.
pub const MAX_SEGMENT_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub requests_per_batch: usize,
    pub stabilization_window: Duration,
    pub max_requests_to_track: usize,
    pub max_segment_attempts: u32,
    pub segment_retry_delay: Duration,
    pub strategy: StrategyConfig,
    /// Report every known-range inconsistency instead of only the first one.
    pub debug: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requests_per_batch: DEFAULT_REQUESTS_PER_BATCH,
            stabilization_window: DEFAULT_STABILIZATION_WINDOW,
            max_requests_to_track: DEFAULT_MAX_REQUESTS_TO_TRACK,
            max_segment_attempts: DEFAULT_MAX_SEGMENT_ATTEMPTS,
            segment_retry_delay: DEFAULT_SEGMENT_RETRY_DELAY,
            strategy: StrategyConfig::default(),
            debug: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SeedState {
    InFlight,
    Backoff { until: Instant },
    Abandoned,
    Done,
}

/// A scheduled `from_block` and the furthest block it may fetch up to.
#[derive(Clone, Copy, Debug)]
struct Seed {
    to_block_max: u64,
    attempts: u32,
    state: SeedState,
}

/// A segment the caller should fetch with [`fetch_segment`](crate::fetch_segment).
#[derive(Clone, Debug)]
pub struct SegmentTask {
    pub from_block: u64,
    pub to_block_max: u64,
    pub strategy: Strategy,
    pub filter: Filter,
}

/// Synchronous fetch state machine.
///
/// Owns every piece of state of one query: seeds, fetched results, known ranges, request
/// statistics and the derived strategy. It performs no I/O: callers feed it events (`on_*`) and
/// execute the [`SegmentTask`]s returned by [`Controller::on_tick`].
#[derive(Debug)]
pub struct Controller {
    config: ControllerConfig,
    signature: QuerySignature,
    filter: Filter,
    transports: Vec<Transport>,
    enabled: bool,
    cache_loaded: bool,
    required: Option<(u64, u64)>,
    finalized: Option<u64>,
    ping: Option<Duration>,
    stats: RequestStats,
    strategy: Strategy,
    stabilizer: StrategyStabilizer,
    seeds: BTreeMap<u64, Seed>,
    results: BTreeMap<u64, FetchedRange>,
    known: KnownRanges,
    version: u64,
}

impl Controller {
    #[must_use]
    pub fn new(
        config: ControllerConfig,
        signature: QuerySignature,
        filter: Filter,
        enabled: bool,
    ) -> Self {
        Self {
            stats: RequestStats::new(config.max_requests_to_track),
            stabilizer: StrategyStabilizer::new(
                config.stabilization_window,
                config.requests_per_batch,
            ),
            config,
            signature,
            filter,
            transports: vec![],
            enabled,
            cache_loaded: false,
            required: None,
            finalized: None,
            ping: None,
            strategy: Strategy::default(),
            seeds: BTreeMap::new(),
            results: BTreeMap::new(),
            known: KnownRanges::new(),
            version: 0,
        }
    }

    #[must_use]
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    #[must_use]
    pub fn stats(&self) -> &RequestStats {
        &self.stats
    }

    #[must_use]
    pub fn known_ranges(&self) -> &KnownRanges {
        &self.known
    }

    #[must_use]
    pub fn required_range(&self) -> Option<(u64, u64)> {
        self.required
    }

    #[must_use]
    pub fn finalized(&self) -> Option<u64> {
        self.finalized
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of segments currently being fetched.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.seeds.values().filter(|seed| seed.state == SeedState::InFlight).count()
    }

    /// Start blocks of segments given up on.
    #[must_use]
    pub fn stalled(&self) -> Vec<u64> {
        self.seeds
            .iter()
            .filter(|(_, seed)| seed.state == SeedState::Abandoned)
            .map(|(&from, _)| from)
            .collect()
    }

    /// Earliest instant at which a backing-off segment becomes eligible again.
    #[must_use]
    pub fn next_retry_at(&self) -> Option<Instant> {
        self.seeds
            .values()
            .filter_map(|seed| match seed.state {
                SeedState::Backoff { until } => Some(until),
                _ => None,
            })
            .min()
    }

    /// Replaces the transports of the current chain.
    pub fn on_transports_changed(&mut self, transports: Vec<Transport>, now: Instant) {
        self.transports = transports;
        self.recompute_strategy(now);
    }

    /// Switches to another chain: every piece of chain-specific state is dropped and the cache
    /// has to be read again.
    pub fn on_chain_changed(&mut self, transports: Vec<Transport>, now: Instant) {
        info!(transports = transports.len(), "Chain changed, resetting fetch state");
        self.seeds.clear();
        self.results.clear();
        self.known.clear();
        self.stats.clear();
        self.stabilizer.reset();
        self.cache_loaded = false;
        self.required = None;
        self.finalized = None;
        self.on_transports_changed(transports, now);
    }

    /// Seeds results and known ranges from coalesced cache entries.
    pub fn on_cache_loaded(&mut self, entries: Vec<CacheEntry>) {
        let previous = self.result_spans();

        for entry in entries {
            let Some(logs) = entry.logs else { continue };
            self.seeds.insert(
                entry.from_block,
                Seed { to_block_max: entry.to_block, attempts: 0, state: SeedState::Done },
            );
            self.results.insert(
                entry.from_block,
                FetchedRange { from_block: entry.from_block, to_block: entry.to_block, logs },
            );
        }

        self.cache_loaded = true;
        self.refresh_known_ranges(&previous);
        debug!(known_ranges = self.known.len(), "Cache loaded");
        self.bump();
    }

    pub fn on_required_range(&mut self, from_block: u64, to_block: u64) {
        if self.required != Some((from_block, to_block)) {
            debug!(from_block, to_block, "Required range updated");
            self.required = Some((from_block, to_block));
            self.bump();
        }
    }

    pub fn on_finalized(&mut self, finalized: u64) {
        if self.finalized != Some(finalized) {
            trace!(finalized, "Finalized block updated");
            self.finalized = Some(finalized);
            self.bump();
        }
    }

    pub fn on_ping(&mut self, ping: Option<Duration>, now: Instant) {
        if self.ping != ping {
            self.ping = ping;
            self.recompute_strategy(now);
        }
    }

    /// Pauses or resumes fetching. In-flight results that arrive while paused are discarded.
    pub fn on_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            debug!(enabled, "Fetching toggled");
            self.enabled = enabled;
            self.bump();
        }
    }

    /// Folds externally produced request outcomes, such as benchmark attempts.
    pub fn on_stats(&mut self, stats: Vec<RequestStat>, now: Instant) {
        if stats.is_empty() {
            return;
        }
        self.stats.extend(stats);
        self.recompute_strategy(now);
    }

    /// Applies the outcome of the segment starting at `from_block`.
    ///
    /// Returns the cache entry to persist for a successful fetch, clipped to the finalized
    /// block, or `None` when there is nothing final to persist.
    pub fn on_query_result(
        &mut self,
        from_block: u64,
        outcome: SegmentOutcome,
        now: Instant,
    ) -> Option<CacheEntry> {
        if !self.seeds.get(&from_block).is_some_and(|seed| seed.state == SeedState::InFlight) {
            trace!(from_block, "Ignoring result of a segment that is no longer in flight");
            return None;
        }

        let SegmentOutcome { fetched, stats } = outcome;
        let records: Vec<StatRecord> = stats.iter().map(StatRecord::from).collect();
        self.stats.extend(stats);
        self.recompute_strategy(now);

        if !self.enabled {
            debug!(from_block, "Fetching disabled, releasing segment");
            self.seeds.remove(&from_block);
            self.bump();
            return None;
        }

        let entry = match fetched {
            Some(fetched) => self.record_success(fetched, records),
            None => {
                self.record_failure(from_block, now);
                None
            }
        };
        self.bump();
        entry
    }

    /// Schedules the next segments.
    ///
    /// Nothing is scheduled until the cache has been read and the required range, the finalized
    /// block and a strategy are known, or while fetching is disabled. Otherwise up to the
    /// stabilizer's batch size minus the segments already in flight are returned, retries whose
    /// backoff elapsed first.
    pub fn on_tick(&mut self, now: Instant) -> Vec<SegmentTask> {
        let Some((from, to)) = self.required else { return vec![] };
        if !self.cache_loaded || self.finalized.is_none() || self.strategy.is_empty() || !self.enabled
        {
            return vec![];
        }

        let mut capacity = self.stabilizer.batch_size(now).saturating_sub(self.in_flight());
        let mut tasks = Vec::new();

        for (&from_block, seed) in &mut self.seeds {
            if capacity == 0 {
                break;
            }
            if let SeedState::Backoff { until } = seed.state
                && until <= now
            {
                seed.state = SeedState::InFlight;
                capacity -= 1;
                tasks.push(SegmentTask {
                    from_block,
                    to_block_max: seed.to_block_max,
                    strategy: self.strategy.clone(),
                    filter: self.filter.clone(),
                });
            }
        }

        if capacity > 0 {
            let max_segment = self.optimistic_max_blocks();
            let occupied = self.occupied_ranges(max_segment);
            for segment in get_remaining_segments((from, to), &occupied, max_segment, capacity) {
                if self.seeds.contains_key(&segment.from_block) {
                    continue;
                }
                trace!(
                    from_block = segment.from_block,
                    to_block_max = segment.to_block,
                    is_gap = segment.is_gap,
                    "Scheduling segment"
                );
                self.seeds.insert(
                    segment.from_block,
                    Seed { to_block_max: segment.to_block, attempts: 0, state: SeedState::InFlight },
                );
                tasks.push(SegmentTask {
                    from_block: segment.from_block,
                    to_block_max: segment.to_block,
                    strategy: self.strategy.clone(),
                    filter: self.filter.clone(),
                });
            }
        }

        if !tasks.is_empty() {
            self.bump();
        }
        tasks
    }

    /// Aggregates the current results into a [`Snapshot`].
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let stalled = self.stalled();
        let Some(required) = self.required else {
            return Snapshot { version: self.version, stalled, ..Snapshot::default() };
        };

        let mut snapshot =
            aggregate(self.results.values(), &self.signature, required, &self.known, self.is_fetching());
        snapshot.stalled = stalled;
        snapshot.version = self.version;
        snapshot
    }

    /// Whether any segment is pending or outstanding work remains to be scheduled.
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        let pending = self.seeds.values().any(|seed| {
            matches!(seed.state, SeedState::InFlight | SeedState::Backoff { .. })
        });
        if pending {
            return true;
        }
        let Some((from, to)) = self.required else { return false };
        self.enabled && !self.occupied_ranges(self.optimistic_max_blocks()).covers(from, to)
    }

    fn record_success(&mut self, fetched: FetchedRange, stats: Vec<StatRecord>) -> Option<CacheEntry> {
        let previous = self.result_spans();
        let from_block = fetched.from_block;

        if let Some(seed) = self.seeds.get_mut(&from_block) {
            seed.state = SeedState::Done;
        }
        let entry = CacheEntry {
            from_block,
            to_block: fetched.to_block,
            logs: Some(fetched.logs.clone()),
            finalized_block_number: self.finalized.unwrap_or(0),
            stats,
        };
        self.results.insert(from_block, fetched);
        self.refresh_known_ranges(&previous);

        clip_to_finalized(entry, self.finalized.unwrap_or(0))
    }

    fn record_failure(&mut self, from_block: u64, now: Instant) {
        let Some(seed) = self.seeds.get_mut(&from_block) else { return };
        seed.attempts += 1;

        if seed.attempts >= self.config.max_segment_attempts {
            warn!(from_block, attempts = seed.attempts, "Giving up on segment");
            seed.state = SeedState::Abandoned;
            return;
        }

        let exponent = seed.attempts.saturating_sub(1).min(16);
        let delay = self
            .config
            .segment_retry_delay
            .saturating_mul(1 << exponent)
            .min(MAX_SEGMENT_RETRY_DELAY);
        debug!(from_block, attempts = seed.attempts, retry_in_ms = delay.as_millis(), "Segment failed, backing off");
        seed.state = SeedState::Backoff { until: now + delay };
    }

    fn recompute_strategy(&mut self, now: Instant) {
        self.strategy =
            compute_strategy(&self.transports, &self.stats, self.ping, now, &self.config.strategy);
        self.stabilizer.observe(self.strategy.best_max_blocks(), now);
        self.bump();
    }

    /// Range size that in-flight segments are expected to cover.
    fn optimistic_max_blocks(&self) -> MaxBlocks {
        self.strategy
            .best_max_blocks()
            .unwrap_or_else(|| self.config.strategy.default_max_blocks())
    }

    /// Known ranges plus the optimistic span of every unfinished seed.
    fn occupied_ranges(&self, max_segment: MaxBlocks) -> KnownRanges {
        let mut occupied = self.known.clone();
        for (&from_block, seed) in &self.seeds {
            if seed.state != SeedState::Done {
                occupied.insert(from_block, max_segment.clamp_to_block(from_block, seed.to_block_max));
            }
        }
        occupied
    }

    fn result_spans(&self) -> BTreeMap<u64, u64> {
        self.results.iter().map(|(&from, range)| (from, range.to_block)).collect()
    }

    fn refresh_known_ranges(&mut self, previous: &BTreeMap<u64, u64>) {
        let current = self.result_spans();

        for (from_block, &to_block) in previous {
            match current.get(from_block) {
                None => {
                    warn!(from_block, to_block, "Span was dropped from known block ranges");
                }
                Some(&new_to_block) if new_to_block != to_block => {
                    warn!(from_block, to_block, new_to_block, "Known range changed");
                }
                _ => continue,
            }
            if !self.config.debug {
                break;
            }
        }

        self.known = current.into_iter().collect();
    }

    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}
