//! Block-range scheduling.
//!
//! [`get_remaining_segments`] turns a required range and the set of [`KnownRanges`] into the next
//! unfetched [`Segment`]s. [`StrategyStabilizer`] decides how many of them may run at once: a
//! single segment while the strategy's best range size keeps changing, a full batch once it has
//! been stable for the stabilization window.

mod chunks;
mod known_ranges;
mod segments;
mod stabilizer;

pub use chunks::BlockChunks;
pub use known_ranges::KnownRanges;
pub use segments::{Segment, get_remaining_segments};
pub use stabilizer::{DEFAULT_REQUESTS_PER_BATCH, DEFAULT_STABILIZATION_WINDOW, StrategyStabilizer};
