use std::ops::RangeInclusive;

use alloy::primitives::BlockNumber;

use crate::strategy::MaxBlocks;

/// Splits an inclusive block range into consecutive chunks of at most `max_blocks` blocks,
/// oldest first.
#[derive(Debug, Clone)]
pub struct BlockChunks {
    next: BlockNumber,
    end: BlockNumber,
    chunk_size: u64,
    exhausted: bool,
}

impl BlockChunks {
    /// Chunks `start..=end`; yields nothing when `start > end`.
    #[must_use]
    pub fn new(start: BlockNumber, end: BlockNumber, max_blocks: MaxBlocks) -> Self {
        Self { next: start, end, chunk_size: max_blocks.chunk_size(), exhausted: start > end }
    }
}

impl Iterator for BlockChunks {
    type Item = RangeInclusive<BlockNumber>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let chunk_start = self.next;
        let chunk_end = chunk_start.saturating_add(self.chunk_size - 1).min(self.end);

        if chunk_end == self.end {
            self.exhausted = true;
        } else {
            self.next = chunk_end + 1;
        }

        Some(chunk_start..=chunk_end)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.exhausted {
            return (0, Some(0));
        }
        let remaining = (self.end - self.next) / self.chunk_size + 1;
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(start: u64, end: u64, max: MaxBlocks) -> Vec<RangeInclusive<u64>> {
        BlockChunks::new(start, end, max).collect()
    }

    #[test]
    fn splits_into_equal_chunks_with_short_tail() {
        assert_eq!(chunks(100, 150, MaxBlocks::Limited(20)), vec![100..=119, 120..=139, 140..=150]);
    }

    #[test]
    fn exact_boundary() {
        assert_eq!(chunks(1, 10, MaxBlocks::Limited(5)), vec![1..=5, 6..=10]);
    }

    #[test]
    fn single_block_range() {
        assert_eq!(chunks(7, 7, MaxBlocks::Limited(5)), vec![7..=7]);
    }

    #[test]
    fn empty_when_start_after_end() {
        assert!(chunks(10, 9, MaxBlocks::Limited(5)).is_empty());
    }

    #[test]
    fn unconstrained_yields_one_chunk() {
        assert_eq!(chunks(0, u64::MAX, MaxBlocks::Unconstrained), vec![0..=u64::MAX]);
    }

    #[test]
    fn chunk_of_one_block() {
        assert_eq!(chunks(3, 5, MaxBlocks::Limited(1)), vec![3..=3, 4..=4, 5..=5]);
    }

    #[test]
    fn size_hint_is_exact() {
        let iter = BlockChunks::new(0, 99, MaxBlocks::Limited(10));
        assert_eq!(iter.size_hint(), (10, Some(10)));
    }

    #[test]
    fn reaches_u64_max_without_overflow() {
        let last = BlockChunks::new(u64::MAX - 5, u64::MAX, MaxBlocks::Limited(4)).last();
        assert_eq!(last, Some(u64::MAX - 1..=u64::MAX));
    }
}
