use std::{collections::HashMap, ops::ControlFlow, sync::Arc, time::Duration};

use alloy::eips::BlockNumberOrTag;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::{self, JoinError, JoinSet},
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;

use crate::{
    FetchError,
    aggregator::Snapshot,
    benchmark::BenchmarkCache,
    block_numbers::resolve_block_range,
    cache::{CachePrefix, LogStore, rehydrate},
    executor::{SegmentOutcome, fetch_segment},
    fetcher::{ContractEvents, controller::Controller},
    transport::{RequestOptions, TransportRegistry},
};

#[derive(Debug)]
pub(crate) enum Command {
    SetEnabled {
        enabled: bool,
        response: oneshot::Sender<Result<(), FetchError>>,
    },
    SetTransports {
        registry: TransportRegistry,
        response: oneshot::Sender<Result<(), FetchError>>,
    },
    SetBlockRange {
        from_block: BlockNumberOrTag,
        to_block: BlockNumberOrTag,
        response: oneshot::Sender<Result<(), FetchError>>,
    },
    Shutdown {
        response: oneshot::Sender<Result<(), FetchError>>,
    },
}

/// Result of a spawned segment fetch, tagged with the session it belongs to.
type Fetched = (u64, u64, Result<SegmentOutcome, FetchError>);

pub(crate) struct Service {
    registry: TransportRegistry,
    block_range: (BlockNumberOrTag, BlockNumberOrTag),
    prefix: CachePrefix,
    store: Option<Arc<dyn LogStore>>,
    controller: Controller,
    benchmarks: BenchmarkCache,
    benchmark_on_start: bool,
    block_request_options: RequestOptions,
    tick_interval: Duration,
    block_refresh_interval: Duration,
    /// Bumped on chain changes; results of older sessions are dropped.
    session: u64,
    session_started: bool,
    tasks: JoinSet<Fetched>,
    /// Session and segment start of every spawned fetch, so a panicked task still releases its
    /// segment.
    task_segments: HashMap<task::Id, (u64, u64)>,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Snapshot>,
    published_version: Option<u64>,
    ping: watch::Receiver<Option<Duration>>,
    ping_open: bool,
    cancel: CancellationToken,
}

impl Service {
    pub fn new(
        fetcher: ContractEvents,
        commands: mpsc::Receiver<Command>,
        snapshots: watch::Sender<Snapshot>,
        ping: watch::Receiver<Option<Duration>>,
        cancel: CancellationToken,
    ) -> Self {
        let query = fetcher.query;
        let controller =
            Controller::new(fetcher.controller, query.signature(), query.filter(), query.is_enabled());

        Self {
            prefix: CachePrefix { chain_id: fetcher.registry.chain_id(), signature: query.signature() },
            block_range: query.block_range(),
            registry: fetcher.registry,
            store: fetcher.store,
            controller,
            benchmarks: BenchmarkCache::default(),
            benchmark_on_start: fetcher.benchmark_on_start,
            block_request_options: fetcher.block_request_options,
            tick_interval: fetcher.tick_interval,
            block_refresh_interval: fetcher.block_refresh_interval,
            session: 0,
            session_started: false,
            tasks: JoinSet::new(),
            task_segments: HashMap::new(),
            commands,
            snapshots,
            published_version: None,
            ping,
            ping_open: true,
            cancel,
        }
    }

    pub async fn run(mut self) {
        info!(chain_id = self.registry.chain_id(), "Starting fetch service");

        let now = Instant::now();
        self.controller.on_transports_changed(self.registry.transports().to_vec(), now);
        self.controller.on_ping(*self.ping.borrow_and_update(), now);
        self.start_session().await;

        let mut ticker = interval_at(now + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresher = interval_at(now + self.block_refresh_interval, self.block_refresh_interval);
        refresher.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shutdown_response = None;

        loop {
            self.schedule();
            self.publish();

            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("Fetch service cancelled");
                    break;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        warn!("Command channel closed, shutting down");
                        break;
                    };
                    if let ControlFlow::Break(response) = self.handle_command(command).await {
                        shutdown_response = response;
                        break;
                    }
                }
                Some(joined) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    self.handle_fetched(joined).await;
                }
                changed = self.ping.changed(), if self.ping_open => {
                    if changed.is_ok() {
                        let ping = *self.ping.borrow_and_update();
                        self.controller.on_ping(ping, Instant::now());
                    } else {
                        self.ping_open = false;
                    }
                }
                _ = ticker.tick() => {}
                _ = refresher.tick() => {
                    self.refresh_blocks().await;
                }
            }
        }

        self.tasks.abort_all();
        self.cancel.cancel();
        self.publish();
        if let Some(response) = shutdown_response {
            let _ = response.send(Ok(()));
        }
        info!("Fetch service stopped");
    }

    async fn handle_command(
        &mut self,
        command: Command,
    ) -> ControlFlow<Option<oneshot::Sender<Result<(), FetchError>>>> {
        match command {
            Command::SetEnabled { enabled, response } => {
                self.controller.on_enabled(enabled);
                let _ = response.send(Ok(()));
            }
            Command::SetTransports { registry, response } => {
                self.set_transports(registry).await;
                let _ = response.send(Ok(()));
            }
            Command::SetBlockRange { from_block, to_block, response } => {
                info!(from_block = ?from_block, to_block = ?to_block, "Changing block range");
                self.block_range = (from_block, to_block);
                let result = self.resolve_blocks().await;
                let _ = response.send(result.map(|_| ()));
            }
            Command::Shutdown { response } => {
                info!("Shutdown requested");
                return ControlFlow::Break(Some(response));
            }
        }
        ControlFlow::Continue(())
    }

    async fn set_transports(&mut self, registry: TransportRegistry) {
        if registry.chain_id() != self.registry.chain_id() {
            info!(from = self.registry.chain_id(), to = registry.chain_id(), "Switching chains");
            self.session += 1;
            self.tasks.abort_all();
            self.task_segments.clear();
            self.controller.on_chain_changed(registry.transports().to_vec(), Instant::now());
            self.prefix.chain_id = registry.chain_id();
            self.registry = registry;
            self.start_session().await;
        } else if registry.same_transports(&self.registry) {
            debug!("Transports unchanged, ignoring update");
        } else {
            debug!(transports = registry.transports().len(), "Replacing transports");
            self.controller.on_transports_changed(registry.transports().to_vec(), Instant::now());
            self.registry = registry;
        }
    }

    /// Resolves the block range, loads the cache and optionally benchmarks the transports.
    ///
    /// On failure the session stays unstarted and is retried on the next block refresh.
    async fn start_session(&mut self) {
        self.session_started = false;
        let finalized = match self.resolve_blocks().await {
            Ok(finalized) => finalized,
            Err(e) => {
                error!(error = %e, "Failed to resolve block range, retrying on next refresh");
                return;
            }
        };
        self.session_started = true;

        self.load_cache(finalized).await;

        if self.benchmark_on_start
            && let Some((_, to_block)) = self.controller.required_range()
        {
            let (report, ran) = self.benchmarks.get_or_run(&self.registry, to_block, true).await;
            if ran {
                self.controller.on_stats(report.attempts, Instant::now());
            }
        }
    }

    /// Resolves the configured range and the finalized block, returning the latter.
    async fn resolve_blocks(&mut self) -> Result<Option<u64>, FetchError> {
        let (from, to) = self.block_range;
        let resolved =
            resolve_block_range(self.registry.transports(), from, to, self.block_request_options)
                .await?;

        self.controller.on_required_range(resolved.from_block, resolved.to_block);
        // Without a finalized block nothing is final, so nothing gets persisted.
        self.controller.on_finalized(resolved.finalized.unwrap_or(0));
        Ok(resolved.finalized)
    }

    async fn load_cache(&mut self, finalized: Option<u64>) {
        let entries = match (&self.store, finalized) {
            (Some(store), Some(finalized)) => {
                match rehydrate(store.as_ref(), &self.prefix, finalized).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(error = %e, "Failed to read log cache, starting empty");
                        vec![]
                    }
                }
            }
            _ => vec![],
        };
        self.controller.on_cache_loaded(entries);
    }

    async fn refresh_blocks(&mut self) {
        if !self.session_started {
            self.start_session().await;
            return;
        }
        if let Err(e) = self.resolve_blocks().await {
            warn!(error = %e, "Failed to refresh block numbers");
        }
    }

    fn schedule(&mut self) {
        for task in self.controller.on_tick(Instant::now()) {
            let session = self.session;
            let from_block = task.from_block;
            let handle = self.tasks.spawn(async move {
                let result =
                    fetch_segment(&task.strategy, &task.filter, task.from_block, task.to_block_max)
                        .await;
                (session, task.from_block, result)
            });
            self.task_segments.insert(handle.id(), (session, from_block));
        }
    }

    async fn handle_fetched(&mut self, joined: Result<(task::Id, Fetched), JoinError>) {
        let (session, from_block, result) = match joined {
            Ok((id, fetched)) => {
                self.task_segments.remove(&id);
                fetched
            }
            Err(e) => {
                let segment = self.task_segments.remove(&e.id());
                if e.is_cancelled() {
                    return;
                }
                let Some((session, from_block)) = segment else {
                    error!(error = %e, "Untracked segment fetch task failed");
                    return;
                };
                error!(from_block, error = %e, "Segment fetch task failed");
                (session, from_block, Ok(SegmentOutcome { fetched: None, stats: vec![] }))
            }
        };
        if session != self.session {
            trace!(from_block, "Dropping result of a previous session");
            return;
        }

        let outcome = result.unwrap_or_else(|e| {
            error!(from_block, error = %e, "Segment fetch rejected");
            SegmentOutcome { fetched: None, stats: vec![] }
        });

        let entry = self.controller.on_query_result(from_block, outcome, Instant::now());
        if let (Some(store), Some(entry)) = (&self.store, entry) {
            let key = self.prefix.key(entry.from_block);
            if let Err(e) = store.set(key, entry).await {
                warn!(from_block, error = %e, "Failed to persist fetched range");
            }
        }
    }

    fn publish(&mut self) {
        let version = self.controller.version();
        if self.published_version == Some(version) {
            return;
        }
        self.published_version = Some(version);
        self.snapshots.send_replace(self.controller.snapshot());
    }
}
