//! Resolution of block tags into concrete block numbers.

use alloy::eips::BlockNumberOrTag;

use crate::{
    FetchError,
    transport::{RequestOptions, Transport},
};

/// Concrete bounds of a query plus the chain's finalized block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedBlocks {
    pub from_block: u64,
    pub to_block: u64,
    /// `None` when the chain does not expose a finalized block.
    pub finalized: Option<u64>,
}

/// Resolves `from`, `to` and the finalized block through the first transport that answers.
///
/// Transports are tried in order. A transport that fails to resolve either bound is skipped.
/// A missing finalized block is not an error.
///
/// # Errors
///
/// * [`FetchError::NoTransports`] if `transports` is empty.
/// * [`FetchError::InvalidRange`] if the resolved `to` is below the resolved `from`.
/// * The last transport error if no transport could resolve both bounds.
pub async fn resolve_block_range(
    transports: &[Transport],
    from: BlockNumberOrTag,
    to: BlockNumberOrTag,
    options: RequestOptions,
) -> Result<ResolvedBlocks, FetchError> {
    let mut last_error = FetchError::NoTransports;

    for transport in transports {
        let bounds = tokio::try_join!(
            transport.block_number(from, options),
            transport.block_number(to, options)
        );
        let (from_block, to_block) = match bounds {
            Ok(bounds) => bounds,
            Err(e) => {
                warn!(transport = %transport.id(), error = %e, "Failed to resolve block range, trying next transport");
                last_error = e.into();
                continue;
            }
        };

        if to_block < from_block {
            return Err(FetchError::InvalidRange { from_block, to_block });
        }

        let finalized = resolve_finalized(transports, options).await;
        if finalized.is_none() {
            warn!("No transport reports a finalized block");
        }

        debug!(from_block, to_block, finalized = ?finalized, transport = %transport.id(), "Resolved block numbers");
        return Ok(ResolvedBlocks { from_block, to_block, finalized });
    }

    Err(last_error)
}

/// Resolves the finalized block through the first transport that answers.
///
/// Used for the finalized block of [`resolve_block_range`], so a transport without finality
/// support does not hide the finalized block of the others.
pub async fn resolve_finalized(transports: &[Transport], options: RequestOptions) -> Option<u64> {
    for transport in transports {
        match transport.block_number(BlockNumberOrTag::Finalized, options).await {
            Ok(number) => return Some(number),
            Err(e) => trace!(transport = %transport.id(), error = %e, "Finalized block unavailable"),
        }
    }
    None
}
