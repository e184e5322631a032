use std::time::Duration;

use alloy::rpc::types::Log;
use tokio_stream::{Stream, StreamExt};

use crate::{Snapshot, aggregator::log_order_key};

/// Waits until the snapshot stream yields a snapshot matching the predicate and returns it.
///
/// # Examples
///
/// ```no_run
/// # use adaptive_log_fetcher::assert_snapshot;
/// # async fn example(handle: adaptive_log_fetcher::ContractEventsHandle) {
/// let mut stream = handle.subscribe();
/// let snapshot = assert_snapshot!(stream, |s| s.fraction_fetched == 1.0 && !s.is_fetching);
/// assert!(snapshot.known_ranges.len() <= 1);
/// # }
/// ```
///
/// # Panics
///
/// * The stream ends before a matching snapshot arrives.
/// * No matching snapshot arrives within the timeout (default 5 seconds, configurable via
///   `timeout = N`).
#[macro_export]
macro_rules! assert_snapshot {
    ($stream: expr, $predicate: expr) => {
        $crate::assert_snapshot!($stream, $predicate, timeout = 5)
    };
    ($stream: expr, $predicate: expr, timeout = $secs: expr) => {
        $crate::test_utils::macros::wait_for_snapshot(&mut $stream, $predicate, $secs).await
    };
}

/// Asserts that logs are in chain order with pending logs last and no duplicates.
#[macro_export]
macro_rules! assert_ordered_logs {
    ($logs: expr) => {
        $crate::test_utils::macros::assert_ordered_logs(&$logs)
    };
}

/// Asserts that a strategy's most preferred entry uses the given transport and range size.
#[macro_export]
macro_rules! assert_strategy_head {
    ($strategy: expr, $transport_id: expr, $max_blocks: expr) => {
        let head = $strategy.entries().first().expect("strategy is empty");
        assert_eq!(head.transport.id(), $transport_id, "unexpected head transport: {head:?}");
        assert_eq!(head.max_blocks, $max_blocks, "unexpected head range size: {head:?}");
    };
}

#[allow(clippy::missing_panics_doc)]
pub async fn wait_for_snapshot<S, F>(stream: &mut S, mut predicate: F, timeout_secs: u64) -> Snapshot
where
    S: Stream<Item = Snapshot> + Unpin,
    F: FnMut(&Snapshot) -> bool,
{
    let mut last = None;
    let result = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
        while let Some(snapshot) = stream.next().await {
            if predicate(&snapshot) {
                return Some(snapshot);
            }
            last = Some(snapshot);
        }
        None
    })
    .await;

    match result {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => panic!("snapshot stream closed, last snapshot: {last:?}"),
        Err(_) => panic!("timed out waiting for snapshot, last snapshot: {last:?}"),
    }
}

#[allow(clippy::missing_panics_doc)]
pub fn assert_ordered_logs(logs: &[Log]) {
    for pair in logs.windows(2) {
        let (a, b) = (log_order_key(&pair[0]), log_order_key(&pair[1]));
        assert!(a < b, "logs out of order or duplicated: {:?} then {:?}", pair[0], pair[1]);
    }
}
