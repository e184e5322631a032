//! Merging fetched ranges into a single ordered, deduplicated view.

use std::collections::HashSet;

use alloy::{
    primitives::B256,
    rpc::types::Log,
    sol_types::{self, SolEvent},
};

use crate::{cache::QuerySignature, executor::FetchedRange, scheduler::KnownRanges};

/// Ordering key of a log: chain position, with pending logs (no block number) last.
#[must_use]
pub fn log_order_key(log: &Log) -> (bool, Option<u64>, Option<u64>, Option<u64>) {
    (log.block_number.is_none(), log.block_number, log.transaction_index, log.log_index)
}

fn identity(log: &Log) -> (Option<B256>, Option<B256>, Option<u64>) {
    (log.block_hash, log.transaction_hash, log.log_index)
}

/// Share of `required` covered by the known span that starts at its lower bound.
///
/// Islands fetched further up do not count until the span from the lower bound reaches them.
#[must_use]
pub fn fraction_fetched(required: (u64, u64), known: &KnownRanges) -> f64 {
    let (from, to) = required;
    let Some(covered_to) = known.span_end(from).map(|end| end.min(to)) else {
        return 0.0;
    };
    if from >= to {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let fraction = (covered_to - from) as f64 / (to - from) as f64;
    fraction.clamp(0.0, 1.0)
}

/// Published view of a query's progress.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Matching logs in chain order, pending logs last.
    pub logs: Vec<Log>,
    /// Whether segments are still in flight or pending.
    pub is_fetching: bool,
    /// See [`fraction_fetched`].
    pub fraction_fetched: f64,
    /// Resolved `[from, to]` of the query, once known.
    pub required_range: Option<(u64, u64)>,
    /// Coalesced spans fetched so far.
    pub known_ranges: Vec<(u64, u64)>,
    /// Segment starts that were given up on after exhausting their attempt budget.
    pub stalled: Vec<u64>,
    /// Bumped every time the fetcher state changes.
    pub version: u64,
}

impl Snapshot {
    /// Decodes every log carrying `E`'s signature, skipping logs of other events.
    ///
    /// # Errors
    ///
    /// Returns the first decoding error of a log whose signature matches `E`.
    pub fn decode<E: SolEvent>(&self) -> Result<Vec<alloy::rpc::types::Log<E>>, sol_types::Error> {
        self.logs
            .iter()
            .filter(|log| log.topic0() == Some(&E::SIGNATURE_HASH))
            .map(|log| log.log_decode::<E>())
            .collect()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.is_fetching && self.fraction_fetched >= 1.0
    }
}

/// Builds a [`Snapshot`] from fetched ranges.
///
/// Logs are kept when they match `signature` and fall inside `required` (pending logs are always
/// kept), duplicates are dropped by (block hash, transaction hash, log index), and the result is
/// sorted by [`log_order_key`]. The returned snapshot has version 0.
#[must_use]
pub fn aggregate<'a>(
    results: impl IntoIterator<Item = &'a FetchedRange>,
    signature: &QuerySignature,
    required: (u64, u64),
    known: &KnownRanges,
    is_fetching: bool,
) -> Snapshot {
    let (from, to) = required;
    let mut seen = HashSet::new();

    let mut logs: Vec<Log> = results
        .into_iter()
        .flat_map(|range| range.logs.iter())
        .filter(|log| log.block_number.is_none_or(|block| block >= from && block <= to))
        .filter(|log| signature.matches(log))
        .filter(|log| seen.insert(identity(log)))
        .cloned()
        .collect();
    logs.sort_by_key(log_order_key);

    Snapshot {
        logs,
        is_fetching,
        fraction_fetched: fraction_fetched(required, known),
        required_range: Some(required),
        known_ranges: known.iter().collect(),
        stalled: vec![],
        version: 0,
    }
}

#[cfg(test)]
mod tests {
    use alloy::{
        primitives::{Address, U256},
        sol,
    };

    use super::*;
    use crate::{
        assert_ordered_logs,
        test_utils::{event_log, log_at, pending_log},
    };

    sol! {
        #[derive(Debug, PartialEq)]
        event Transfer(address indexed from, address indexed to, uint256 value);
    }

    const TOPIC: B256 = B256::repeat_byte(7);

    fn range(from: u64, to: u64, logs: Vec<Log>) -> FetchedRange {
        FetchedRange { from_block: from, to_block: to, logs }
    }

    fn known(spans: &[(u64, u64)]) -> KnownRanges {
        spans.iter().copied().collect()
    }

    #[test]
    fn logs_are_sorted_and_deduplicated() {
        let a = Address::repeat_byte(1);
        let results = [
            range(10, 20, vec![log_at(a, vec![TOPIC], 15, 1, 3), log_at(a, vec![TOPIC], 12, 0, 0)]),
            range(15, 30, vec![log_at(a, vec![TOPIC], 15, 1, 3), log_at(a, vec![TOPIC], 15, 0, 1)]),
            range(0, 0, vec![pending_log(a, vec![TOPIC], 0)]),
        ];

        let snapshot =
            aggregate(&results, &QuerySignature::default(), (0, 30), &known(&[(0, 30)]), false);

        let positions: Vec<_> = snapshot.logs.iter().map(log_order_key).collect();
        assert_eq!(
            positions,
            vec![
                (false, Some(12), Some(0), Some(0)),
                (false, Some(15), Some(0), Some(1)),
                (false, Some(15), Some(1), Some(3)),
                (true, None, None, Some(0)),
            ]
        );
        assert_ordered_logs!(snapshot.logs);
        assert!(snapshot.is_complete());
    }

    #[test]
    fn logs_outside_query_are_dropped() {
        let ours = Address::repeat_byte(1);
        let signature = QuerySignature::new([ours], [vec![TOPIC], vec![], vec![], vec![]], None);
        let results = [range(
            0,
            100,
            vec![
                log_at(ours, vec![TOPIC], 5, 0, 0),
                log_at(Address::repeat_byte(2), vec![TOPIC], 6, 0, 0),
                log_at(ours, vec![B256::ZERO], 7, 0, 0),
                log_at(ours, vec![TOPIC], 101, 0, 0),
            ],
        )];

        let snapshot = aggregate(&results, &signature, (0, 100), &known(&[(0, 100)]), false);

        assert_eq!(snapshot.logs.len(), 1);
        assert_eq!(snapshot.logs[0].block_number, Some(5));
    }

    #[test]
    fn fraction_counts_only_the_span_from_the_lower_bound() {
        assert!((fraction_fetched((0, 100), &known(&[(0, 50)])) - 0.5).abs() < f64::EPSILON);
        assert!(fraction_fetched((0, 100), &known(&[(10, 100)])).abs() < f64::EPSILON);
        assert!((fraction_fetched((0, 100), &known(&[(0, 500)])) - 1.0).abs() < f64::EPSILON);
        assert!((fraction_fetched((7, 7), &known(&[(7, 7)])) - 1.0).abs() < f64::EPSILON);
        assert!(fraction_fetched((7, 7), &KnownRanges::new()).abs() < f64::EPSILON);
    }

    #[test]
    fn decode_skips_other_events() -> anyhow::Result<()> {
        let token = Address::repeat_byte(1);
        let transfer = Transfer { from: Address::ZERO, to: token, value: U256::from(5) };
        let snapshot = Snapshot {
            logs: vec![event_log(token, &transfer, 1, 0), log_at(token, vec![TOPIC], 2, 0, 0)],
            ..Snapshot::default()
        };

        let decoded = snapshot.decode::<Transfer>()?;

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].inner.data, transfer);
        Ok(())
    }
}
