#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use adaptive_log_fetcher::{
    ContractEventsBuilder, EventQuery,
    test_utils::{MockTransport, logs_every},
    transport::TransportRegistry,
};
use alloy::{
    primitives::{Address, address},
    rpc::types::Log,
    sol,
    sol_types::SolEvent,
};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    event Transfer(address indexed from, address indexed to, uint256 value);
}

pub const TOKEN: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

/// Snapshot waits run on paused time, so a generous virtual timeout costs nothing.
pub const WAIT_SECS: u64 = 600;

/// One `Transfer`-tagged log every `step` blocks over `from..=to`.
pub fn transfers(from: u64, to: u64, step: u64) -> Vec<Log> {
    logs_every(TOKEN, Transfer::SIGNATURE_HASH, from, to, step)
}

pub fn transfer_query() -> EventQuery {
    EventQuery::new().address(TOKEN).event::<Transfer>()
}

/// A chain head at 20 000 with finality at 19 000, serving transfers every 250 blocks and
/// rejecting ranges wider than 2 000 blocks.
pub fn limited_node(id: &str) -> Arc<MockTransport> {
    Arc::new(
        MockTransport::new(id)
            .max_blocks(2_000)
            .latest(20_000)
            .finalized(19_000)
            .logs(transfers(0, 20_000, 250)),
    )
}

pub fn registry(chain_id: u64, transports: &[Arc<MockTransport>]) -> anyhow::Result<TransportRegistry> {
    let registry = transports
        .iter()
        .fold(TransportRegistry::builder(chain_id), |builder, transport| {
            builder.shared(transport.clone())
        })
        .build()?;
    Ok(registry)
}

pub fn fast_builder(query: EventQuery) -> ContractEventsBuilder {
    ContractEventsBuilder::new(query)
        .tick_interval(Duration::from_millis(50))
        .segment_retry_delay(Duration::from_millis(100))
}
