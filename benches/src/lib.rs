//! Shared fixtures for the fetcher benchmarks.
//!
//! Everything runs against [`MockTransport`]s, so results measure the fetcher's own overhead:
//! scheduling, strategy computation, coalescing and aggregation.

use std::{sync::Arc, time::Duration};

use adaptive_log_fetcher::{
    ContractEventsBuilder, EventQuery,
    cache::{CacheEntry, CachePrefix},
    test_utils::{MockTransport, logs_every},
    transport::TransportRegistry,
};
use alloy::{
    primitives::{Address, address},
    sol,
    sol_types::SolEvent,
};

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

pub const TOKEN: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

/// Shape of a simulated chain.
#[derive(Clone, Copy, Debug)]
pub struct ChainShape {
    pub latest: u64,
    pub finalized: u64,
    /// One log every `log_step` blocks.
    pub log_step: u64,
    /// Provider range limit, `None` for unlimited.
    pub max_blocks: Option<u64>,
}

impl ChainShape {
    #[must_use]
    pub fn expected_logs(&self) -> usize {
        usize::try_from(self.latest / self.log_step + 1).unwrap_or(usize::MAX)
    }
}

#[must_use]
pub fn transfer_query() -> EventQuery {
    EventQuery::new().address(TOKEN).event::<Transfer>()
}

#[must_use]
pub fn mock_node(id: &str, shape: ChainShape) -> Arc<MockTransport> {
    let node = MockTransport::new(id)
        .latest(shape.latest)
        .finalized(shape.finalized)
        .logs(logs_every(TOKEN, Transfer::SIGNATURE_HASH, 0, shape.latest, shape.log_step));
    Arc::new(match shape.max_blocks {
        Some(max) => node.max_blocks(max),
        None => node,
    })
}

/// A registry of `count` identical nodes.
///
/// # Errors
///
/// Returns an error if `count` is 0.
pub fn registry(chain_id: u64, shape: ChainShape, count: usize) -> anyhow::Result<TransportRegistry> {
    let registry = (0..count)
        .fold(TransportRegistry::builder(chain_id), |builder, i| {
            builder.shared(mock_node(&format!("node-{i}"), shape))
        })
        .build()?;
    Ok(registry)
}

/// Builder tuned for benchmarking: fast ticks and no stabilization delay.
#[must_use]
pub fn bench_builder() -> ContractEventsBuilder {
    ContractEventsBuilder::new(transfer_query())
        .tick_interval(Duration::from_millis(5))
        .stabilization_window(Duration::ZERO)
}

/// `count` adjacent cache entries of `width` blocks each, as left behind by a fetch session.
#[must_use]
pub fn fragmented_entries(count: u64, width: u64, log_step: u64) -> Vec<CacheEntry> {
    let finalized = count * width;
    (0..count)
        .map(|i| {
            let from_block = i * width;
            let to_block = from_block + width - 1;
            CacheEntry {
                from_block,
                to_block,
                logs: Some(logs_every(TOKEN, Transfer::SIGNATURE_HASH, from_block, to_block, log_step)),
                finalized_block_number: finalized,
                stats: vec![],
            }
        })
        .collect()
}

#[must_use]
pub fn cache_prefix(chain_id: u64) -> CachePrefix {
    CachePrefix { chain_id, signature: transfer_query().signature() }
}
