use std::{collections::VecDeque, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::strategy::MaxBlocks;

/// Default number of request outcomes retained for strategy computation.
pub const DEFAULT_MAX_REQUESTS_TO_TRACK: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Success,
    Failure,
}

/// Outcome of one `eth_getLogs` attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestStat {
    pub transport_id: Arc<str>,
    pub status: RequestStatus,
    pub started_at: Instant,
    pub latency: Duration,
    /// Blocks actually spanned by the query.
    pub num_blocks: u64,
    /// Range limit of the strategy entry (or benchmark candidate) that issued the query.
    pub max_blocks: MaxBlocks,
}

impl RequestStat {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RequestStatus::Success
    }
}

/// Serializable summary of a [`RequestStat`], stored alongside cached log ranges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    pub transport_id: String,
    pub status: RequestStatus,
    pub latency_ms: u64,
    pub num_blocks: u64,
}

impl From<&RequestStat> for StatRecord {
    fn from(stat: &RequestStat) -> Self {
        Self {
            transport_id: stat.transport_id.to_string(),
            status: stat.status,
            latency_ms: u64::try_from(stat.latency.as_millis()).unwrap_or(u64::MAX),
            num_blocks: stat.num_blocks,
        }
    }
}

/// Bounded ring of the most recent request outcomes, oldest evicted first.
#[derive(Clone, Debug)]
pub struct RequestStats {
    inner: VecDeque<RequestStat>,
    capacity: usize,
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS_TO_TRACK)
    }
}

impl RequestStats {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { inner: VecDeque::with_capacity(capacity), capacity }
    }

    /// Appends an outcome, evicting the oldest one when full.
    pub fn push(&mut self, stat: RequestStat) {
        if self.capacity == 0 {
            return;
        }
        if self.inner.len() == self.capacity {
            self.inner.pop_front();
        }
        self.inner.push_back(stat);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RequestStat> + ExactSizeIterator {
        self.inner.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl Extend<RequestStat> for RequestStats {
    fn extend<T: IntoIterator<Item = RequestStat>>(&mut self, iter: T) {
        for stat in iter {
            self.push(stat);
        }
    }
}
