use std::collections::BTreeSet;

use crate::{
    aggregator::log_order_key,
    cache::{CacheEntry, CacheError, CachePrefix, LogStore},
};

/// Merges inclusive ranges that overlap or touch (`next.0 <= last.1 + 1`).
///
/// The result is sorted by start and pairwise disjoint with at least one block between spans.
#[must_use]
pub fn coalesce_ranges(ranges: impl IntoIterator<Item = (u64, u64)>) -> Vec<(u64, u64)> {
    let mut ranges: Vec<_> = ranges.into_iter().filter(|(from, to)| from <= to).collect();
    ranges.sort_unstable();

    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(ranges.len());
    for (from, to) in ranges {
        match merged.last_mut() {
            Some(last) if from <= last.1.saturating_add(1) => last.1 = last.1.max(to),
            _ => merged.push((from, to)),
        }
    }
    merged
}

/// Clips an entry so it only covers blocks that were final both when it was fetched and now.
///
/// Logs above the clip point and logs without a block number are dropped. Returns `None` when
/// nothing final remains or the entry has no logs.
#[must_use]
pub fn clip_to_finalized(entry: CacheEntry, finalized: u64) -> Option<CacheEntry> {
    let clip = finalized.min(entry.finalized_block_number);
    let to_block = entry.to_block.min(clip);
    if to_block < entry.from_block {
        return None;
    }

    let logs = entry
        .logs?
        .into_iter()
        .filter(|log| log.block_number.is_some_and(|block| block <= to_block))
        .collect();

    Some(CacheEntry { to_block, logs: Some(logs), ..entry })
}

/// Clips every entry to `finalized` and merges overlapping or adjacent ones.
///
/// When two entries overlap, the earlier entry's logs win for the shared blocks. The merged
/// entry records the highest finalized block of its parts and keeps their stats.
#[must_use]
pub fn coalesce_entries(entries: Vec<CacheEntry>, finalized: u64) -> Vec<CacheEntry> {
    let mut entries: Vec<_> = entries
        .into_iter()
        .filter_map(|entry| clip_to_finalized(entry, finalized))
        .collect();
    entries.sort_by_key(|entry| (entry.from_block, entry.to_block));

    let mut merged: Vec<CacheEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match merged.last_mut() {
            Some(last) if entry.from_block <= last.to_block.saturating_add(1) => {
                let covered_to = last.to_block;
                if let (Some(into), Some(logs)) = (last.logs.as_mut(), entry.logs) {
                    into.extend(
                        logs.into_iter()
                            .filter(|log| log.block_number.is_some_and(|block| block > covered_to)),
                    );
                }
                last.to_block = last.to_block.max(entry.to_block);
                last.finalized_block_number =
                    last.finalized_block_number.max(entry.finalized_block_number);
                last.stats.extend(entry.stats);
            }
            _ => merged.push(entry),
        }
    }

    for entry in &mut merged {
        if let Some(logs) = entry.logs.as_mut() {
            logs.sort_by_key(log_order_key);
        }
    }
    merged
}

/// Loads every cached entry under `prefix`, coalesces them against `finalized` and rewrites the
/// store so that it holds only the coalesced entries.
///
/// Coalesced entries are written before superseded ones are deleted, so an interrupted rehydrate
/// leaves the store with duplicates rather than holes.
///
/// # Errors
///
/// Returns the first store error encountered.
pub async fn rehydrate(
    store: &dyn LogStore,
    prefix: &CachePrefix,
    finalized: u64,
) -> Result<Vec<CacheEntry>, CacheError> {
    let listed = store.list_by_prefix(prefix).await?;
    let stored_count = listed.len();

    let mut stale: BTreeSet<_> = listed.iter().map(|(key, _)| key.clone()).collect();
    let merged = coalesce_entries(listed.into_iter().map(|(_, entry)| entry).collect(), finalized);

    for entry in &merged {
        let key = prefix.key(entry.from_block);
        store.set(key.clone(), entry.clone()).await?;
        stale.remove(&key);
    }
    for key in &stale {
        store.delete(key).await?;
    }

    debug!(
        stored = stored_count,
        merged = merged.len(),
        deleted = stale.len(),
        finalized = finalized,
        "Rehydrated cached log ranges"
    );

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, B256};
    use proptest::prelude::*;

    use super::*;
    use crate::{
        cache::{MemoryStore, QuerySignature},
        test_utils::{log_at, logs_every},
    };

    const TOPIC: B256 = B256::repeat_byte(7);

    fn address() -> Address {
        Address::repeat_byte(1)
    }

    fn entry(from: u64, to: u64, finalized: u64) -> CacheEntry {
        CacheEntry {
            from_block: from,
            to_block: to,
            logs: Some(logs_every(address(), TOPIC, from, to, 10)),
            finalized_block_number: finalized,
            stats: vec![],
        }
    }

    fn spans(entries: &[CacheEntry]) -> Vec<(u64, u64)> {
        entries.iter().map(|e| (e.from_block, e.to_block)).collect()
    }

    #[test]
    fn adjacent_ranges_merge_and_gaps_survive() {
        assert_eq!(
            coalesce_ranges([(500, 600), (201, 300), (100, 200)]),
            vec![(100, 300), (500, 600)]
        );
    }

    #[test]
    fn contained_ranges_are_absorbed() {
        assert_eq!(coalesce_ranges([(0, 1000), (10, 20), (990, 1005)]), vec![(0, 1005)]);
    }

    #[test]
    fn entries_merge_with_logs_from_each() {
        let merged = coalesce_entries(
            vec![entry(500, 600, 10_000), entry(201, 300, 10_000), entry(100, 200, 10_000)],
            10_000,
        );

        assert_eq!(spans(&merged), vec![(100, 300), (500, 600)]);
        let logs = merged[0].logs.as_ref().unwrap();
        assert_eq!(logs.len(), logs_every(address(), TOPIC, 100, 300, 10).len());
        crate::assert_ordered_logs!(logs);
    }

    #[test]
    fn overlapping_entries_do_not_duplicate_logs() {
        let merged = coalesce_entries(vec![entry(100, 200, 1000), entry(150, 250, 1000)], 1000);

        assert_eq!(spans(&merged), vec![(100, 250)]);
        crate::assert_ordered_logs!(merged[0].logs.as_ref().unwrap());
    }

    #[test]
    fn entries_are_clipped_to_finality() {
        let mut tail = entry(900, 1050, 1050);
        tail.logs.as_mut().unwrap().push(log_at(address(), vec![TOPIC], 1045, 0, 0));

        let merged = coalesce_entries(vec![entry(0, 899, 1050), tail], 1000);

        assert_eq!(spans(&merged), vec![(0, 1000)]);
        assert!(
            merged[0]
                .logs
                .as_ref()
                .unwrap()
                .iter()
                .all(|log| log.block_number.is_some_and(|b| b <= 1000))
        );
    }

    #[test]
    fn entry_fetched_under_older_finality_is_clipped_to_it() {
        let clipped = clip_to_finalized(entry(100, 300, 250), 1000).unwrap();
        assert_eq!((clipped.from_block, clipped.to_block), (100, 250));
    }

    #[test]
    fn non_final_entries_and_entries_without_logs_are_dropped() {
        assert!(clip_to_finalized(entry(1001, 1100, 2000), 1000).is_none());
        let empty = CacheEntry { logs: None, ..entry(0, 10, 100) };
        assert!(clip_to_finalized(empty, 100).is_none());
    }

    #[tokio::test]
    async fn rehydrate_rewrites_store_with_merged_entries() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let prefix = CachePrefix {
            chain_id: 1,
            signature: QuerySignature::new([address()], [vec![TOPIC], vec![], vec![], vec![]], None),
        };
        for e in [entry(100, 200, 1000), entry(201, 300, 1000), entry(500, 600, 1000)] {
            store.set(prefix.key(e.from_block), e).await?;
        }

        let merged = rehydrate(&store, &prefix, 1000).await?;
        assert_eq!(spans(&merged), vec![(100, 300), (500, 600)]);

        let stored = store.list_by_prefix(&prefix).await?;
        let stored: Vec<_> = stored.into_iter().map(|(k, e)| (k.from_block, e.to_block)).collect();
        assert_eq!(stored, vec![(100, 300), (500, 600)]);
        Ok(())
    }

    #[tokio::test]
    async fn rehydrate_leaves_other_queries_untouched() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let ours = CachePrefix { chain_id: 1, signature: QuerySignature::default() };
        let theirs = CachePrefix { chain_id: 2, signature: QuerySignature::default() };
        store.set(ours.key(0), entry(0, 10, 100)).await?;
        store.set(ours.key(11), entry(11, 20, 100)).await?;
        store.set(theirs.key(0), entry(0, 10, 100)).await?;

        rehydrate(&store, &ours, 100).await?;

        assert_eq!(store.list_by_prefix(&ours).await?.len(), 1);
        assert_eq!(store.list_by_prefix(&theirs).await?.len(), 1);
        Ok(())
    }

    proptest! {
        #[test]
        fn coalescing_is_idempotent(
            ranges in prop::collection::vec((0u64..2_000, 0u64..300), 0..24),
            finalized in 0u64..2_500,
        ) {
            let entries: Vec<_> =
                ranges.iter().map(|&(from, len)| entry(from, from + len, 2_500)).collect();

            let once = coalesce_entries(entries, finalized);
            let twice = coalesce_entries(once.clone(), finalized);
            prop_assert_eq!(&once, &twice);

            for pair in once.windows(2) {
                prop_assert!(pair[0].to_block + 1 < pair[1].from_block);
            }
            for e in &once {
                prop_assert!(e.to_block <= finalized);
            }
        }
    }
}
