//! The adaptive fetcher: a background service that keeps one query's logs up to date.
//!
//! [`ContractEventsBuilder`] configures the fetcher, [`ContractEventsBuilder::connect`] binds it
//! to a [`TransportRegistry`] and [`ContractEvents::run`] spawns the service, returning a
//! [`ContractEventsHandle`]. The handle publishes [`Snapshot`](crate::Snapshot)s and accepts
//! commands (pause/resume, transport changes, range changes, shutdown).
//!
//! All decisions are taken by the synchronous [`Controller`]; the service only performs I/O on
//! its behalf: block number resolution, cache reads and writes, segment fetches and ping updates.
//!
//! # Examples
//!
//! ```rust,no_run
//! use adaptive_log_fetcher::{
//!     ContractEventsBuilder, EventQuery, MemoryStore,
//!     transport::TransportRegistry,
//! };
//! use alloy::{primitives::address, sol};
//! use std::sync::Arc;
//! use tokio_stream::StreamExt;
//!
//! sol! {
//!     event Transfer(address indexed from, address indexed to, uint256 value);
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = TransportRegistry::builder(1).url("https://eth.llamarpc.com".parse()?).build()?;
//! let query = EventQuery::new()
//!     .address(address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"))
//!     .event::<Transfer>()
//!     .from_block(21_000_000);
//!
//! let handle = ContractEventsBuilder::new(query)
//!     .store(Arc::new(MemoryStore::new()))
//!     .benchmark_on_start(true)
//!     .connect(registry)?
//!     .run();
//!
//! let mut snapshots = handle.subscribe();
//! while let Some(snapshot) = snapshots.next().await {
//!     println!("{:.0}% fetched, {} transfers", snapshot.fraction_fetched * 100.0, snapshot.logs.len());
//!     if snapshot.is_complete() {
//!         break;
//!     }
//! }
//! handle.shutdown().await?;
//! # Ok(()) }
//! ```

mod builder;
mod controller;
mod handle;
mod query;
mod service;

use std::{sync::Arc, time::Duration};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    aggregator::Snapshot, cache::LogStore, probe::PingSource, transport::{RequestOptions, TransportRegistry},
};

pub use builder::{ContractEventsBuilder, DEFAULT_BLOCK_REFRESH_INTERVAL, DEFAULT_TICK_INTERVAL};
pub use controller::{
    Controller, ControllerConfig, DEFAULT_MAX_SEGMENT_ATTEMPTS, DEFAULT_SEGMENT_RETRY_DELAY,
    MAX_SEGMENT_RETRY_DELAY, SegmentTask,
};
pub use handle::ContractEventsHandle;
pub use query::EventQuery;

use service::Service;

/// Buffer of the command channel between handles and the service.
const COMMAND_CHANNEL_CAPACITY: usize = 100;

/// A validated fetcher bound to a transport registry, ready to [`run`](ContractEvents::run).
#[derive(Debug)]
pub struct ContractEvents {
    pub(crate) query: EventQuery,
    pub(crate) registry: TransportRegistry,
    pub(crate) controller: ControllerConfig,
    pub(crate) tick_interval: Duration,
    pub(crate) block_refresh_interval: Duration,
    pub(crate) benchmark_on_start: bool,
    pub(crate) ping: PingSource,
    pub(crate) store: Option<Arc<dyn LogStore>>,
    pub(crate) block_request_options: RequestOptions,
}

impl ContractEvents {
    #[must_use]
    pub fn query(&self) -> &EventQuery {
        &self.query
    }

    #[must_use]
    pub fn registry(&self) -> &TransportRegistry {
        &self.registry
    }

    /// Spawns the fetch service and returns a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn run(self) -> ContractEventsHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        let cancel = CancellationToken::new();
        let ping = self.ping.clone().start(cancel.child_token());

        let service = Service::new(self, command_rx, snapshot_tx, ping, cancel.clone());
        tokio::spawn(async move {
            service.run().await;
        });

        ContractEventsHandle::new(command_tx, snapshot_rx, cancel)
    }
}
