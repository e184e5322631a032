use std::{fmt, sync::Arc, time::Duration};

use alloy::{
    eips::BlockNumberOrTag,
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportErrorKind},
};
use backon::{ExponentialBuilder, Retryable};
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::time::{error::Elapsed, timeout};

/// Default total timeout for a single request, retries included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_COUNT: usize = 3;
/// Default base delay between retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Operation timed out")]
    Timeout,
    #[error("RPC call failed after exhausting all retry attempts: {0}")]
    RpcError(Arc<RpcError<TransportErrorKind>>),
    #[error("Block not found, block tag: {0}")]
    BlockNotFound(BlockNumberOrTag),
}

impl From<RpcError<TransportErrorKind>> for Error {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        Error::RpcError(Arc::new(err))
    }
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::Timeout
    }
}

/// A single RPC endpoint able to answer log and block number queries.
///
/// Implementations perform exactly one attempt per call. Timeouts and retries are layered on top
/// by [`Transport`], so the same implementation can be driven with different budgets by
/// different strategy entries.
pub trait LogTransport: Send + Sync + fmt::Debug {
    /// Stable identity used to correlate request statistics across the session.
    fn id(&self) -> &str;

    /// Issues one `eth_getLogs` call.
    fn get_logs<'a>(
        &'a self,
        filter: &'a Filter,
    ) -> BoxFuture<'a, Result<Vec<Log>, RpcError<TransportErrorKind>>>;

    /// Resolves a block tag to a number, `None` when the node does not know the block.
    fn get_block_number(
        &self,
        tag: BlockNumberOrTag,
    ) -> BoxFuture<'_, Result<Option<u64>, RpcError<TransportErrorKind>>>;
}

/// Per-call budget applied by [`Transport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestOptions {
    /// Total time allowed for the call, retries included.
    pub timeout: Duration,
    /// Number of retries after the first failed attempt.
    pub retry_count: usize,
    /// Base delay of the exponential backoff between retries.
    pub retry_delay: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Uniform, cheaply clonable handle over a [`LogTransport`].
#[derive(Clone)]
pub struct Transport {
    inner: Arc<dyn LogTransport>,
}

impl Transport {
    #[must_use]
    pub fn new(transport: impl LogTransport + 'static) -> Self {
        Self { inner: Arc::new(transport) }
    }

    #[must_use]
    pub fn from_arc(transport: Arc<dyn LogTransport>) -> Self {
        Self { inner: transport }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.inner.id()
    }

    /// Fetches logs for `filter` within the given budget.
    ///
    /// # Errors
    ///
    /// * [`Error::Timeout`] if `options.timeout` elapses, retries included.
    /// * [`Error::RpcError`] with the last error once all retries are exhausted.
    pub async fn request_logs(
        &self,
        filter: &Filter,
        options: RequestOptions,
    ) -> Result<Vec<Log>, Error> {
        let result = self.with_retries(options, || self.inner.get_logs(filter)).await;
        if let Err(e) = &result {
            debug!(transport = %self.id(), error = %e, "eth_getLogs failed");
        }
        result
    }

    /// Resolves `tag` to a block number within the given budget.
    ///
    /// # Errors
    ///
    /// * [`Error::Timeout`] if `options.timeout` elapses, retries included.
    /// * [`Error::RpcError`] with the last error once all retries are exhausted.
    /// * [`Error::BlockNotFound`] if the node does not know the block.
    pub async fn block_number(
        &self,
        tag: BlockNumberOrTag,
        options: RequestOptions,
    ) -> Result<u64, Error> {
        self.with_retries(options, || self.inner.get_block_number(tag))
            .await?
            .ok_or(Error::BlockNotFound(tag))
    }

    /// Execute `operation` with exponential backoff and a total timeout.
    ///
    /// The timeout wraps the whole retry loop, so time spent sleeping between attempts counts
    /// against the budget.
    async fn with_retries<T, F, Fut>(&self, options: RequestOptions, operation: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let retry_strategy = ExponentialBuilder::default()
            .with_max_times(options.retry_count)
            .with_min_delay(options.retry_delay);

        timeout(
            options.timeout,
            operation
                .retry(retry_strategy)
                .notify(|err: &RpcError<TransportErrorKind>, dur: Duration| {
                    trace!(transport = %self.id(), error = %err, "RPC error retrying after {:?}", dur);
                })
                .sleep(tokio::time::sleep),
        )
        .await
        .map_err(Error::from)?
        .map_err(Error::from)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transport").field(&self.id()).finish()
    }
}

impl PartialEq for Transport {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Transport {}
