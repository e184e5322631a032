use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;

use crate::{
    strategy::{BLOCK_BINS, MaxBlocks, RequestStat, RequestStats, bin_index},
    transport::{RequestOptions, Transport, hints},
};

/// Weight given to history when folding a new sample into an EMA.
pub const DEFAULT_EMA_ALPHA: f64 = 0.8;
/// Outcomes older than this are ignored.
pub const DEFAULT_LOOKBACK_WINDOW: Duration = Duration::from_secs(30);
pub const DEFAULT_ORDINARY_RETRIES: usize = 4;
pub const DEFAULT_EXPLORATORY_RETRIES: usize = 1;
pub const DEFAULT_STRATEGY_RETRY_DELAY: Duration = Duration::from_millis(50);
/// Successes needed at the best-proven bin before the next bin is explored.
pub const DEFAULT_EXPLORATION_INITIATION: u32 = 1;
/// Consecutive failures at a bin after which it is no longer explored.
pub const DEFAULT_EXPLORATION_CANCELLATION: u32 = 3;
/// Stability EMA a bin needs to count as proven.
pub const DEFAULT_MIN_STABILITY: f64 = 0.5;
/// Timeout used when neither latency history nor a ping measurement is available.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MIN_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(30);

const STABILITY_WEIGHT: f64 = 0.5;
const PROVEN_SIZE_WEIGHT: f64 = 0.3;
const TIMEOUT_WEIGHT: f64 = 0.2;

/// Tuning knobs of [`compute_strategy`].
#[derive(Clone, Debug, PartialEq)]
pub struct StrategyConfig {
    pub lookback_window: Duration,
    pub ema_alpha: f64,
    pub ordinary_retries: usize,
    pub exploratory_retries: usize,
    pub retry_delay: Duration,
    pub exploration_initiation: u32,
    pub exploration_cancellation: u32,
    pub min_stability: f64,
    /// Timeout = latency EMA x this.
    pub latency_multiplier: u32,
    /// Timeout = ping x this, when the bin has no latency history.
    pub ping_multiplier: u32,
    pub fallback_timeout: Duration,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    /// Bin assigned to transports without a proven bin.
    pub default_bin: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            lookback_window: DEFAULT_LOOKBACK_WINDOW,
            ema_alpha: DEFAULT_EMA_ALPHA,
            ordinary_retries: DEFAULT_ORDINARY_RETRIES,
            exploratory_retries: DEFAULT_EXPLORATORY_RETRIES,
            retry_delay: DEFAULT_STRATEGY_RETRY_DELAY,
            exploration_initiation: DEFAULT_EXPLORATION_INITIATION,
            exploration_cancellation: DEFAULT_EXPLORATION_CANCELLATION,
            min_stability: DEFAULT_MIN_STABILITY,
            latency_multiplier: 5,
            ping_multiplier: 10,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            min_timeout: DEFAULT_MIN_TIMEOUT,
            max_timeout: DEFAULT_MAX_TIMEOUT,
            default_bin: 0,
        }
    }
}

impl StrategyConfig {
    #[must_use]
    pub fn lookback_window(mut self, window: Duration) -> Self {
        self.lookback_window = window;
        self
    }

    /// Sets the history weight of every EMA, clamped to `[0, 1]`.
    #[must_use]
    pub fn ema_alpha(mut self, alpha: f64) -> Self {
        self.ema_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn retries(mut self, ordinary: usize, exploratory: usize) -> Self {
        self.ordinary_retries = ordinary;
        self.exploratory_retries = exploratory;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn exploration_thresholds(mut self, initiation: u32, cancellation: u32) -> Self {
        self.exploration_initiation = initiation;
        self.exploration_cancellation = cancellation;
        self
    }

    #[must_use]
    pub fn min_stability(mut self, min_stability: f64) -> Self {
        self.min_stability = min_stability;
        self
    }

    #[must_use]
    pub fn fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    #[must_use]
    pub fn timeout_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_timeout = min;
        self.max_timeout = max.max(min);
        self
    }

    #[must_use]
    pub fn default_bin(mut self, bin: usize) -> Self {
        self.default_bin = bin.min(BLOCK_BINS.len() - 1);
        self
    }

    /// Range size tried by transports without a proven bin.
    #[must_use]
    pub fn default_max_blocks(&self) -> MaxBlocks {
        BLOCK_BINS[self.default_bin.min(BLOCK_BINS.len() - 1)]
    }

    fn clamp_timeout(&self, timeout: Duration) -> Duration {
        timeout.max(self.min_timeout).min(self.max_timeout)
    }
}

/// Accumulated outcomes of one (transport, bin) pair within the lookback window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BinStats {
    pub successes: u32,
    pub failures: u32,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// EMA of the success rate.
    pub stability: Option<f64>,
    /// EMA of successful request latency.
    pub latency: Option<Duration>,
    /// EMA of blocks per second over successful requests.
    pub throughput: Option<f64>,
}

fn ema(previous: Option<f64>, sample: f64, alpha: f64) -> f64 {
    previous.map_or(sample, |prev| alpha * prev + (1.0 - alpha) * sample)
}

impl BinStats {
    #[allow(clippy::cast_precision_loss)]
    fn record(&mut self, success: bool, latency: Duration, num_blocks: u64, alpha: f64) {
        self.stability = Some(ema(self.stability, if success { 1.0 } else { 0.0 }, alpha));

        if success {
            self.successes += 1;
            self.consecutive_failures = 0;

            let latency_secs =
                ema(self.latency.map(|l| l.as_secs_f64()), latency.as_secs_f64(), alpha);
            self.latency = Some(Duration::from_secs_f64(latency_secs.max(0.0)));

            let per_second = num_blocks as f64 / latency.as_secs_f64().max(1e-3);
            self.throughput = Some(ema(self.throughput, per_second, alpha));
        } else {
            self.failures += 1;
            self.consecutive_failures += 1;
        }
    }

    fn is_proven(&self, min_stability: f64) -> bool {
        self.successes >= 1 && self.stability.is_some_and(|s| s >= min_stability)
    }
}

pub type TransportBins = [BinStats; BLOCK_BINS.len()];

/// Folds recent outcomes into per-transport bin statistics in the order they were started.
///
/// Concurrent requests complete out of order, so arrival order in `stats` is not meaningful.
#[must_use]
pub fn collect_bin_stats<'a>(
    stats: &'a RequestStats,
    now: Instant,
    config: &StrategyConfig,
) -> HashMap<&'a str, TransportBins> {
    let mut recent: Vec<&RequestStat> = stats
        .iter()
        .filter(|stat| now.saturating_duration_since(stat.started_at) <= config.lookback_window)
        .collect();
    recent.sort_by_key(|stat| stat.started_at);

    let mut table: HashMap<&str, TransportBins> = HashMap::new();
    for stat in recent {
        let bins = table.entry(stat.transport_id.as_ref()).or_default();
        bins[bin_index(stat.max_blocks)].record(
            stat.is_success(),
            stat.latency,
            stat.num_blocks,
            config.ema_alpha,
        );
    }

    table
}

/// One candidate of the fallback chain.
#[derive(Clone, Debug)]
pub struct StrategyEntry {
    pub transport: Transport,
    pub max_blocks: MaxBlocks,
    pub timeout: Duration,
    pub retry_count: usize,
    pub retry_delay: Duration,
    /// Tries a bin above the transport's best-proven one.
    pub exploratory: bool,
    pub score: f64,
}

impl StrategyEntry {
    #[must_use]
    pub fn options(&self) -> RequestOptions {
        RequestOptions {
            timeout: self.timeout,
            retry_count: self.retry_count,
            retry_delay: self.retry_delay,
        }
    }
}

/// Ordered fallback chain, most preferred first.
#[derive(Clone, Debug, Default)]
pub struct Strategy {
    entries: Vec<StrategyEntry>,
}

impl Strategy {
    #[must_use]
    pub fn entries(&self) -> &[StrategyEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StrategyEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Range size of the most preferred entry.
    #[must_use]
    pub fn best_max_blocks(&self) -> Option<MaxBlocks> {
        self.entries.first().map(|entry| entry.max_blocks)
    }
}

impl<'a> IntoIterator for &'a Strategy {
    type Item = &'a StrategyEntry;
    type IntoIter = std::slice::Iter<'a, StrategyEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<StrategyEntry> for Strategy {
    fn from_iter<T: IntoIterator<Item = StrategyEntry>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

/// Derives the fallback chain from recent request outcomes.
///
/// Every transport contributes at least one entry. A transport without a proven bin gets a single
/// conservative entry at [`StrategyConfig::default_bin`] with the worst-case timeout. Otherwise it
/// gets an ordinary entry for every bin up to its best-proven one, plus an exploratory entry for
/// the next bin while that bin has not failed
/// [`StrategyConfig::exploration_cancellation`] times in a row.
///
/// Entries are ordered by descending range size (unconstrained first), then by score, then by
/// ascending timeout.
#[must_use]
pub fn compute_strategy(
    transports: &[Transport],
    stats: &RequestStats,
    ping: Option<Duration>,
    now: Instant,
    config: &StrategyConfig,
) -> Strategy {
    let table = collect_bin_stats(stats, now, config);
    let mut entries = Vec::new();

    for transport in transports {
        let bins = table.get(transport.id()).copied().unwrap_or_default();
        let supported =
            |bin: usize| hints::supports_num_blocks(transport.id(), BLOCK_BINS[bin]) != Some(false);

        let best = (0..BLOCK_BINS.len())
            .rev()
            .find(|&bin| supported(bin) && bins[bin].is_proven(config.min_stability));

        let Some(best) = best else {
            let timeout = worst_case_timeout(ping, config);
            let default_bin = (0..=bin_index(config.default_max_blocks()))
                .rev()
                .find(|&bin| supported(bin))
                .unwrap_or(0);
            entries.push(StrategyEntry {
                transport: transport.clone(),
                max_blocks: BLOCK_BINS[default_bin],
                timeout,
                retry_count: config.ordinary_retries,
                retry_delay: config.retry_delay,
                exploratory: false,
                score: score(&bins[default_bin], None, timeout, config),
            });
            continue;
        };

        for bin in (0..=best).filter(|&bin| supported(bin)) {
            let timeout = bin_timeout(&bins, bin, ping, config);
            entries.push(StrategyEntry {
                transport: transport.clone(),
                max_blocks: BLOCK_BINS[bin],
                timeout,
                retry_count: config.ordinary_retries,
                retry_delay: config.retry_delay,
                exploratory: false,
                score: score(&bins[bin], Some(best), timeout, config),
            });
        }

        let next = best + 1;
        if next < BLOCK_BINS.len()
            && supported(next)
            && bins[best].successes >= config.exploration_initiation
            && bins[next].consecutive_failures < config.exploration_cancellation
        {
            let timeout = bin_timeout(&bins, next, ping, config);
            entries.push(StrategyEntry {
                transport: transport.clone(),
                max_blocks: BLOCK_BINS[next],
                timeout,
                retry_count: config.exploratory_retries,
                retry_delay: config.retry_delay,
                exploratory: true,
                score: score(&bins[next], Some(best), timeout, config),
            });
        }
    }

    entries.sort_by(|a, b| {
        b.max_blocks
            .cmp(&a.max_blocks)
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| a.timeout.cmp(&b.timeout))
            .then_with(|| a.transport.id().cmp(b.transport.id()))
    });

    trace!(entries = entries.len(), "Strategy recomputed");
    Strategy { entries }
}

fn worst_case_timeout(ping: Option<Duration>, config: &StrategyConfig) -> Duration {
    config.clamp_timeout(ping.map_or(config.fallback_timeout, |ping| ping * config.ping_multiplier))
}

/// Latency-based timeout for `bin`, borrowing the nearest larger bin's latency when the bin has
/// none of its own.
fn bin_timeout(
    bins: &TransportBins,
    bin: usize,
    ping: Option<Duration>,
    config: &StrategyConfig,
) -> Duration {
    match bins[bin..].iter().find_map(|stats| stats.latency) {
        Some(latency) => config.clamp_timeout(latency * config.latency_multiplier),
        None => worst_case_timeout(ping, config),
    }
}

#[allow(clippy::cast_precision_loss)]
fn score(
    stats: &BinStats,
    best_proven: Option<usize>,
    timeout: Duration,
    config: &StrategyConfig,
) -> f64 {
    let stability = stats.stability.unwrap_or(0.0);
    let proven_size = best_proven.map_or(0.0, |bin| bin as f64 / (BLOCK_BINS.len() - 1) as f64);
    let timeout_penalty = timeout.as_secs_f64() / config.max_timeout.as_secs_f64().max(1e-3);

    STABILITY_WEIGHT * stability + PROVEN_SIZE_WEIGHT * proven_size - TIMEOUT_WEIGHT * timeout_penalty
}
