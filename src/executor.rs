//! Executes one scheduled segment against the strategy's fallback chain.

use alloy::rpc::types::{Filter, Log};
use tokio::time::Instant;

use crate::{
    FetchError,
    strategy::{RequestStat, RequestStatus, Strategy},
};

/// Logs of a successfully fetched inclusive block span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedRange {
    pub from_block: u64,
    pub to_block: u64,
    pub logs: Vec<Log>,
}

/// Result of [`fetch_segment`]: the fetched range, if any entry succeeded, and one stat per
/// attempt.
#[derive(Clone, Debug, Default)]
pub struct SegmentOutcome {
    pub fetched: Option<FetchedRange>,
    pub stats: Vec<RequestStat>,
}

impl SegmentOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.fetched.is_some()
    }

    #[must_use]
    pub fn from_block(&self) -> Option<u64> {
        self.fetched.as_ref().map(|f| f.from_block)
    }

    #[must_use]
    pub fn to_block(&self) -> Option<u64> {
        self.fetched.as_ref().map(|f| f.to_block)
    }

    #[must_use]
    pub fn logs(&self) -> Option<&[Log]> {
        self.fetched.as_ref().map(|f| f.logs.as_slice())
    }
}

/// Fetches logs for `from_block..=to_block_max`, walking `strategy` in order.
///
/// Each entry narrows the upper bound to its own range size and gets its own timeout and retry
/// budget. The first success wins; failures are recorded and the next entry is tried. When every
/// entry fails the outcome carries no range, only the failure stats, and the segment is left for
/// the caller to reschedule.
///
/// # Errors
///
/// Returns [`FetchError::InvalidRange`] if `to_block_max < from_block`. Transport errors are never
/// returned.
pub async fn fetch_segment(
    strategy: &Strategy,
    filter: &Filter,
    from_block: u64,
    to_block_max: u64,
) -> Result<SegmentOutcome, FetchError> {
    if to_block_max < from_block {
        return Err(FetchError::InvalidRange { from_block, to_block: to_block_max });
    }

    let mut stats = Vec::with_capacity(1);

    for entry in strategy {
        let to_block = entry.max_blocks.clamp_to_block(from_block, to_block_max);
        let query = filter.clone().from_block(from_block).to_block(to_block);

        let started_at = Instant::now();
        let result = entry.transport.request_logs(&query, entry.options()).await;
        let latency = started_at.elapsed();

        let status = if result.is_ok() { RequestStatus::Success } else { RequestStatus::Failure };
        stats.push(RequestStat {
            transport_id: entry.transport.id().into(),
            status,
            started_at,
            latency,
            num_blocks: (to_block - from_block).saturating_add(1),
            max_blocks: entry.max_blocks,
        });

        match result {
            Ok(logs) => {
                debug!(
                    transport = %entry.transport.id(),
                    from_block,
                    to_block,
                    logs = logs.len(),
                    latency_ms = latency.as_millis(),
                    "Fetched segment"
                );
                return Ok(SegmentOutcome {
                    fetched: Some(FetchedRange { from_block, to_block, logs }),
                    stats,
                });
            }
            Err(e) => {
                debug!(
                    transport = %entry.transport.id(),
                    max_blocks = %entry.max_blocks,
                    exploratory = entry.exploratory,
                    error = %e,
                    "Strategy entry failed, falling back"
                );
            }
        }
    }

    warn!(from_block, to_block_max, attempts = stats.len(), "All strategy entries failed");
    Ok(SegmentOutcome { fetched: None, stats })
}
