use std::time::Duration;

use tokio::time::Instant;

use crate::strategy::MaxBlocks;

/// Default number of segments scheduled per batch once the strategy is stable.
pub const DEFAULT_REQUESTS_PER_BATCH: usize = 33;
/// Default time the best range size must stay unchanged before full batches are scheduled.
pub const DEFAULT_STABILIZATION_WINDOW: Duration = Duration::from_secs(1);

/// Throttles scheduling to one segment at a time while the strategy is still converging.
#[derive(Clone, Debug)]
pub struct StrategyStabilizer {
    window: Duration,
    requests_per_batch: usize,
    best: Option<MaxBlocks>,
    changed_at: Option<Instant>,
}

impl StrategyStabilizer {
    #[must_use]
    pub fn new(window: Duration, requests_per_batch: usize) -> Self {
        Self { window, requests_per_batch, best: None, changed_at: None }
    }

    /// Records the strategy's current best range size.
    pub fn observe(&mut self, best: Option<MaxBlocks>, now: Instant) {
        if best != self.best || self.changed_at.is_none() {
            if self.best.is_some() {
                trace!(from = ?self.best, to = ?best, "Best range size changed");
            }
            self.best = best;
            self.changed_at = Some(now);
        }
    }

    /// Number of segments that may be in flight at `now`.
    #[must_use]
    pub fn batch_size(&self, now: Instant) -> usize {
        match (self.best, self.changed_at) {
            (Some(_), Some(changed_at)) if now.saturating_duration_since(changed_at) >= self.window => {
                self.requests_per_batch
            }
            _ => 1,
        }
    }

    pub fn reset(&mut self) {
        self.best = None;
        self.changed_at = None;
    }
}

impl Default for StrategyStabilizer {
    fn default() -> Self {
        Self::new(DEFAULT_STABILIZATION_WINDOW, DEFAULT_REQUESTS_PER_BATCH)
    }
}
