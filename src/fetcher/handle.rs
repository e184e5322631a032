use alloy::eips::BlockNumberOrTag;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::{FetchError, aggregator::Snapshot, fetcher::service::Command, transport::TransportRegistry};

/// Client side of a running fetcher.
///
/// Cheap to clone. The service stops when [`shutdown`](Self::shutdown) is called or when every
/// handle has been dropped.
#[derive(Clone, Debug)]
pub struct ContractEventsHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    cancel: CancellationToken,
}

impl ContractEventsHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        snapshots: watch::Receiver<Snapshot>,
        cancel: CancellationToken,
    ) -> Self {
        Self { commands, snapshots, cancel }
    }

    /// Stream of snapshots, starting with the current one.
    ///
    /// Intermediate snapshots may be skipped when the consumer is slower than the service; the
    /// latest one is always delivered.
    #[must_use]
    pub fn subscribe(&self) -> WatchStream<Snapshot> {
        WatchStream::new(self.snapshots.clone())
    }

    /// The most recently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Whether the service has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Pauses or resumes fetching.
    ///
    /// Fetches already in flight complete, but their results are discarded while paused.
    ///
    /// # Errors
    ///
    /// * [`FetchError::ServiceShutdown`] - if the service is no longer running.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), FetchError> {
        self.request(|response| Command::SetEnabled { enabled, response }).await
    }

    /// Replaces the transport registry.
    ///
    /// A registry for another chain resets all fetch state and starts a new session. A registry
    /// with the same chain and transport ids is ignored.
    ///
    /// # Errors
    ///
    /// * [`FetchError::ServiceShutdown`] - if the service is no longer running.
    pub async fn set_transports(&self, registry: TransportRegistry) -> Result<(), FetchError> {
        self.request(|response| Command::SetTransports { registry, response }).await
    }

    /// Changes the queried block range.
    ///
    /// Already fetched ranges are kept; only missing blocks of the new range are fetched.
    ///
    /// # Errors
    ///
    /// * [`FetchError::ServiceShutdown`] - if the service is no longer running.
    /// * [`FetchError::InvalidRange`] - if the new range resolves to `to < from`.
    /// * [`FetchError::RpcError`] / [`FetchError::Timeout`] - if no transport could resolve the
    ///   block tags.
    pub async fn set_block_range(
        &self,
        from_block: impl Into<BlockNumberOrTag>,
        to_block: impl Into<BlockNumberOrTag>,
    ) -> Result<(), FetchError> {
        let (from_block, to_block) = (from_block.into(), to_block.into());
        self.request(|response| Command::SetBlockRange { from_block, to_block, response }).await
    }

    /// Stops the service and waits until it has.
    ///
    /// # Errors
    ///
    /// * [`FetchError::ServiceShutdown`] - if the service had already stopped.
    pub async fn shutdown(&self) -> Result<(), FetchError> {
        let result = self.request(|response| Command::Shutdown { response }).await;
        self.cancel.cancel();
        result
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<(), FetchError>>) -> Command,
    ) -> Result<(), FetchError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.commands.send(command(response_tx)).await.map_err(|_| FetchError::ServiceShutdown)?;
        response_rx.await.map_err(|_| FetchError::ServiceShutdown)?
    }
}
