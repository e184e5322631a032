use crate::{
    scheduler::{BlockChunks, KnownRanges},
    strategy::MaxBlocks,
};

/// A unit of fetch work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Segment {
    pub from_block: u64,
    /// Upper bound the fetch may extend to. The executor shrinks it to whatever range size the
    /// chosen transport accepts.
    pub to_block: u64,
    /// The segment fills a hole below an already known span and is capped so it cannot overlap
    /// it. Frontier segments are not capped and extend to the end of the required range.
    pub is_gap: bool,
}

/// Computes up to `count_hint` unfetched segments of `required` (inclusive).
///
/// The walk starts at the lower bound and skips every block already in `known`:
/// * a stretch bounded above by a known span is a gap, chunked into segments of at most
///   `max_segment` blocks
/// * the trailing stretch is the frontier; its segments start `max_segment` blocks apart but all
///   extend to the end of `required`
///
/// Returns nothing exactly when `known` covers `required`. No two segments share a
/// `from_block`.
#[must_use]
pub fn get_remaining_segments(
    required: (u64, u64),
    known: &KnownRanges,
    max_segment: MaxBlocks,
    count_hint: usize,
) -> Vec<Segment> {
    let (from, to) = required;
    let mut segments = Vec::new();
    let mut cursor = from;

    while cursor <= to && segments.len() < count_hint {
        if let Some(end) = known.span_end(cursor) {
            if end >= to {
                break;
            }
            cursor = end + 1;
            continue;
        }

        match known.next_start_after(cursor).filter(|&start| start <= to) {
            Some(next_known) => {
                let gap_end = next_known - 1;
                let remaining = count_hint - segments.len();
                segments.extend(BlockChunks::new(cursor, gap_end, max_segment).take(remaining).map(
                    |chunk| Segment { from_block: *chunk.start(), to_block: *chunk.end(), is_gap: true },
                ));
                cursor = next_known;
            }
            None => {
                let remaining = count_hint - segments.len();
                segments.extend(BlockChunks::new(cursor, to, max_segment).take(remaining).map(
                    |chunk| Segment { from_block: *chunk.start(), to_block: to, is_gap: false },
                ));
                break;
            }
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    fn known(spans: &[(u64, u64)]) -> KnownRanges {
        spans.iter().copied().collect()
    }

    #[test]
    fn empty_cache_splits_frontier() {
        let segments = get_remaining_segments(
            (1_000_000, 1_009_999),
            &KnownRanges::new(),
            MaxBlocks::Limited(2_000),
            usize::MAX,
        );

        let starts: Vec<_> = segments.iter().map(|s| s.from_block).collect();
        assert_eq!(starts, [1_000_000, 1_002_000, 1_004_000, 1_006_000, 1_008_000]);
        assert!(segments.iter().all(|s| s.to_block == 1_009_999 && !s.is_gap));
    }

    #[test]
    fn gaps_are_capped_below_next_known_span() {
        let segments = get_remaining_segments(
            (100, 600),
            &known(&[(100, 200), (201, 300), (500, 600)]),
            MaxBlocks::Limited(150),
            10,
        );

        assert_eq!(
            segments,
            [
                Segment { from_block: 301, to_block: 450, is_gap: true },
                Segment { from_block: 451, to_block: 499, is_gap: true },
            ]
        );
    }

    #[test]
    fn leading_and_trailing_stretches() {
        let segments =
            get_remaining_segments((0, 100), &known(&[(40, 60)]), MaxBlocks::Unconstrained, 10);

        assert_eq!(
            segments,
            [
                Segment { from_block: 0, to_block: 39, is_gap: true },
                Segment { from_block: 61, to_block: 100, is_gap: false },
            ]
        );
    }

    #[test]
    fn count_hint_limits_output() {
        let segments =
            get_remaining_segments((0, 999), &KnownRanges::new(), MaxBlocks::Limited(10), 3);
        assert_eq!(segments.len(), 3);

        let none = get_remaining_segments((0, 999), &KnownRanges::new(), MaxBlocks::Limited(10), 0);
        assert!(none.is_empty());
    }

    #[test]
    fn fully_known_range_has_no_segments() {
        let segments =
            get_remaining_segments((10, 20), &known(&[(0, 30)]), MaxBlocks::Limited(1), 100);
        assert!(segments.is_empty());
    }

    #[test]
    fn single_block_range() {
        let segments =
            get_remaining_segments((5, 5), &KnownRanges::new(), MaxBlocks::Limited(1_000), 10);
        assert_eq!(segments, [Segment { from_block: 5, to_block: 5, is_gap: false }]);
    }

    #[test]
    fn inverted_range_has_no_segments() {
        let segments =
            get_remaining_segments((10, 5), &KnownRanges::new(), MaxBlocks::Limited(1), 10);
        assert!(segments.is_empty());
    }

    fn spans_strategy() -> impl Strategy<Value = Vec<(u64, u64)>> {
        prop::collection::vec((0u64..2_000, 0u64..200), 0..12)
            .prop_map(|raw| raw.into_iter().map(|(start, len)| (start, start + len)).collect())
    }

    proptest! {
        #[test]
        fn segments_never_share_a_start_or_touch_known_blocks(
            spans in spans_strategy(),
            from in 0u64..1_500,
            len in 0u64..1_500,
            max in 1u64..700,
        ) {
            let known = known(&spans);
            let to = from + len;
            let segments = get_remaining_segments((from, to), &known, MaxBlocks::Limited(max), 64);

            let starts: HashSet<_> = segments.iter().map(|s| s.from_block).collect();
            prop_assert_eq!(starts.len(), segments.len());

            for segment in &segments {
                prop_assert!(segment.from_block >= from && segment.to_block <= to);
                prop_assert!(known.span_end(segment.from_block).is_none());
                if segment.is_gap {
                    prop_assert!(segment.to_block - segment.from_block < max);
                    prop_assert!(!known.iter().any(|(s, e)| s <= segment.to_block && e >= segment.from_block));
                }
            }
        }

        #[test]
        fn fetching_every_segment_reaches_full_coverage(
            spans in spans_strategy(),
            from in 0u64..1_500,
            len in 0u64..1_500,
            max in 1u64..700,
        ) {
            let mut known = known(&spans);
            let to = from + len;

            for _ in 0..10_000 {
                let segments = get_remaining_segments((from, to), &known, MaxBlocks::Limited(max), 8);
                if segments.is_empty() {
                    break;
                }
                for segment in segments {
                    let fetched_to = MaxBlocks::Limited(max).clamp_to_block(segment.from_block, segment.to_block);
                    known.insert(segment.from_block, fetched_to);
                }
            }

            prop_assert!(known.covers(from, to));
            prop_assert!(get_remaining_segments((from, to), &known, MaxBlocks::Limited(max), 8).is_empty());
        }
    }
}
