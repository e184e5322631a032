use std::{
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy::{
    eips::BlockNumberOrTag,
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportErrorKind},
};
use futures::future::BoxFuture;

use crate::transport::LogTransport;

/// Scripted in-memory [`LogTransport`].
///
/// Serves the logs it was given for any requested range, optionally rejecting ranges wider than
/// `max_blocks`, and records every `eth_getLogs` range it receives.
#[derive(Debug)]
pub struct MockTransport {
    id: String,
    max_blocks: Option<u64>,
    latency: Duration,
    failing: AtomicBool,
    block_numbers_failing: AtomicBool,
    panic_next: AtomicBool,
    latest: u64,
    finalized: Option<u64>,
    logs: Vec<Log>,
    calls: AtomicUsize,
    requested: Mutex<Vec<(u64, u64)>>,
}

impl MockTransport {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            max_blocks: None,
            latency: Duration::ZERO,
            failing: AtomicBool::new(false),
            block_numbers_failing: AtomicBool::new(false),
            panic_next: AtomicBool::new(false),
            latest: 0,
            finalized: None,
            logs: vec![],
            calls: AtomicUsize::new(0),
            requested: Mutex::new(vec![]),
        }
    }

    /// Rejects queries spanning more than `max_blocks` blocks.
    #[must_use]
    pub fn max_blocks(mut self, max_blocks: u64) -> Self {
        self.max_blocks = Some(max_blocks);
        self
    }

    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails every `eth_getLogs` call until [`MockTransport::set_failing`] says otherwise.
    #[must_use]
    pub fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    /// Fails every block number lookup until [`MockTransport::set_block_numbers_failing`] says
    /// otherwise.
    #[must_use]
    pub fn failing_block_numbers(self) -> Self {
        self.block_numbers_failing.store(true, Ordering::SeqCst);
        self
    }

    /// Panics inside the next `eth_getLogs` call, then behaves normally.
    #[must_use]
    pub fn panic_once(self) -> Self {
        self.panic_next.store(true, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn latest(mut self, latest: u64) -> Self {
        self.latest = latest;
        self
    }

    #[must_use]
    pub fn finalized(mut self, finalized: u64) -> Self {
        self.finalized = Some(finalized);
        self
    }

    #[must_use]
    pub fn logs(mut self, logs: impl IntoIterator<Item = Log>) -> Self {
        self.logs.extend(logs);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_block_numbers_failing(&self, failing: bool) {
        self.block_numbers_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `eth_getLogs` calls received, retries included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every `eth_getLogs` range received, in call order.
    #[must_use]
    pub fn requested_ranges(&self) -> Vec<(u64, u64)> {
        self.requested.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn resolve(&self, tag: Option<BlockNumberOrTag>, default: u64) -> u64 {
        match tag {
            Some(BlockNumberOrTag::Number(number)) => number,
            Some(BlockNumberOrTag::Earliest) => 0,
            Some(_) => self.latest,
            None => default,
        }
    }
}

impl LogTransport for MockTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn get_logs<'a>(
        &'a self,
        filter: &'a Filter,
    ) -> BoxFuture<'a, Result<Vec<Log>, RpcError<TransportErrorKind>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let from = self.resolve(filter.block_option.get_from_block().copied(), 0);
            let to = self.resolve(filter.block_option.get_to_block().copied(), self.latest);
            self.requested.lock().unwrap_or_else(PoisonError::into_inner).push((from, to));

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            if self.panic_next.swap(false, Ordering::SeqCst) {
                panic!("mock transport panicked serving {from}..={to}");
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(TransportErrorKind::custom_str("mock transport failure"));
            }
            if let Some(max) = self.max_blocks
                && to.saturating_sub(from).saturating_add(1) > max
            {
                return Err(TransportErrorKind::custom_str("query exceeds max block range"));
            }

            Ok(self
                .logs
                .iter()
                .filter(|log| log.block_number.is_some_and(|block| block >= from && block <= to))
                .cloned()
                .collect())
        })
    }

    fn get_block_number(
        &self,
        tag: BlockNumberOrTag,
    ) -> BoxFuture<'_, Result<Option<u64>, RpcError<TransportErrorKind>>> {
        Box::pin(async move {
            if self.block_numbers_failing.load(Ordering::SeqCst) {
                return Err(TransportErrorKind::custom_str("mock block number failure"));
            }
            Ok(match tag {
                BlockNumberOrTag::Number(number) => Some(number),
                BlockNumberOrTag::Earliest => Some(0),
                BlockNumberOrTag::Finalized | BlockNumberOrTag::Safe => self.finalized,
                _ => Some(self.latest),
            })
        })
    }
}
