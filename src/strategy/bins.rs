use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest number of blocks a single log query may span.
///
/// `Unconstrained` orders above every `Limited` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MaxBlocks {
    Limited(u64),
    Unconstrained,
}

impl MaxBlocks {
    /// Whether a query spanning `num_blocks` fits.
    #[must_use]
    pub fn covers(self, num_blocks: u64) -> bool {
        match self {
            MaxBlocks::Limited(limit) => num_blocks <= limit,
            MaxBlocks::Unconstrained => true,
        }
    }

    /// Upper bound of a query starting at `from_block` that may extend up to `to_block_max`.
    ///
    /// Inclusive on both ends, so `Limited(n)` spans at most `n` blocks.
    #[must_use]
    pub fn clamp_to_block(self, from_block: u64, to_block_max: u64) -> u64 {
        match self {
            MaxBlocks::Limited(limit) => {
                to_block_max.min(from_block.saturating_add(limit.max(1) - 1))
            }
            MaxBlocks::Unconstrained => to_block_max,
        }
    }

    /// Chunk width to use when splitting a range, `u64::MAX` when unconstrained.
    #[must_use]
    pub fn chunk_size(self) -> u64 {
        match self {
            MaxBlocks::Limited(limit) => limit.max(1),
            MaxBlocks::Unconstrained => u64::MAX,
        }
    }
}

impl fmt::Display for MaxBlocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxBlocks::Limited(limit) => write!(f, "{limit}"),
            MaxBlocks::Unconstrained => f.write_str("unconstrained"),
        }
    }
}

impl From<u64> for MaxBlocks {
    fn from(limit: u64) -> Self {
        MaxBlocks::Limited(limit)
    }
}

/// Ascending block-count thresholds request statistics are bucketed into.
pub const BLOCK_BINS: [MaxBlocks; 7] = [
    MaxBlocks::Limited(1),
    MaxBlocks::Limited(1_000),
    MaxBlocks::Limited(2_000),
    MaxBlocks::Limited(5_000),
    MaxBlocks::Limited(10_000),
    MaxBlocks::Limited(100_000),
    MaxBlocks::Unconstrained,
];

/// Index of the smallest bin able to hold `max_blocks`.
#[must_use]
pub fn bin_index(max_blocks: MaxBlocks) -> usize {
    BLOCK_BINS.iter().position(|bin| *bin >= max_blocks).unwrap_or(BLOCK_BINS.len() - 1)
}
