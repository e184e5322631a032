use std::sync::Arc;

use alloy::{
    eips::BlockNumberOrTag,
    transports::{RpcError, TransportErrorKind},
};
use thiserror::Error;

use crate::{cache::CacheError, transport::Error as TransportError};

/// Errors surfaced by the fetcher.
///
/// Transport failures that happen while fetching a segment never reach the caller as a
/// `FetchError`; they are folded into request statistics instead. The variants below are returned
/// by builders, by one-shot helpers such as block number resolution, and by
/// [`ContractEventsHandle`](crate::ContractEventsHandle) commands.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The underlying RPC transport returned an error.
    #[error("RPC error: {0}")]
    RpcError(Arc<RpcError<TransportErrorKind>>),

    /// A block tag could not be resolved to a number.
    #[error("Block not found, Block Id: {0}")]
    BlockNotFound(BlockNumberOrTag),

    /// A timeout elapsed while waiting for an RPC response.
    #[error("Operation timed out")]
    Timeout,

    /// No transport in the registry can serve log queries.
    #[error("No transports available")]
    NoTransports,

    /// A block range whose upper bound is below its lower bound.
    #[error("Invalid block range: {to_block} is below {from_block}")]
    InvalidRange { from_block: u64, to_block: u64 },

    /// The configured batch size is invalid (must be greater than zero).
    #[error("Requests per batch must be greater than 0")]
    InvalidRequestsPerBatch,

    /// The configured request statistics capacity is invalid (must be greater than zero).
    #[error("Max requests to track must be greater than 0")]
    InvalidMaxRequestsToTrack,

    /// The configured per-segment attempt budget is invalid (must be greater than zero).
    #[error("Max segment attempts must be greater than 0")]
    InvalidMaxSegmentAttempts,

    /// The configured scheduling tick is invalid (must be non-zero).
    #[error("Tick interval must be greater than 0")]
    InvalidTickInterval,

    /// The configured latency measurement interval is zero.
    #[error("Ping interval must be greater than 0")]
    InvalidPingInterval,

    /// The persisted log store failed.
    #[error("Cache error: {0}")]
    Cache(Arc<CacheError>),

    /// The background fetch service is no longer running.
    #[error("Fetch service has shut down")]
    ServiceShutdown,
}

impl From<TransportError> for FetchError {
    fn from(error: TransportError) -> FetchError {
        match error {
            TransportError::Timeout => FetchError::Timeout,
            TransportError::RpcError(err) => FetchError::RpcError(err),
            TransportError::BlockNotFound(tag) => FetchError::BlockNotFound(tag),
        }
    }
}

impl From<RpcError<TransportErrorKind>> for FetchError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        FetchError::RpcError(Arc::new(error))
    }
}

impl From<CacheError> for FetchError {
    fn from(error: CacheError) -> Self {
        FetchError::Cache(Arc::new(error))
    }
}
