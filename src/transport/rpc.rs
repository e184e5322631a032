use alloy::{
    consensus::BlockHeader,
    eips::BlockNumberOrTag,
    network::{BlockResponse, Ethereum, Network},
    providers::{Provider, RootProvider},
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportErrorKind, http::reqwest::Url},
};
use futures::future::BoxFuture;

use crate::transport::LogTransport;

/// [`LogTransport`] backed by an Alloy [`RootProvider`].
#[derive(Clone, Debug)]
pub struct RpcTransport<N: Network = Ethereum> {
    id: String,
    provider: RootProvider<N>,
}

impl<N: Network> RpcTransport<N> {
    /// Wraps an existing provider under the given identity.
    #[must_use]
    pub fn new(id: impl Into<String>, provider: RootProvider<N>) -> Self {
        Self { id: id.into(), provider }
    }

    /// Connects over HTTP, using the URL itself as the transport id.
    #[must_use]
    pub fn http(url: Url) -> Self {
        Self { id: url.to_string(), provider: RootProvider::new_http(url) }
    }

    #[must_use]
    pub fn provider(&self) -> &RootProvider<N> {
        &self.provider
    }
}

impl<N: Network> LogTransport for RpcTransport<N> {
    fn id(&self) -> &str {
        &self.id
    }

    fn get_logs<'a>(
        &'a self,
        filter: &'a Filter,
    ) -> BoxFuture<'a, Result<Vec<Log>, RpcError<TransportErrorKind>>> {
        Box::pin(async move { self.provider.get_logs(filter).await })
    }

    fn get_block_number(
        &self,
        tag: BlockNumberOrTag,
    ) -> BoxFuture<'_, Result<Option<u64>, RpcError<TransportErrorKind>>> {
        Box::pin(async move {
            match tag {
                BlockNumberOrTag::Number(number) => Ok(Some(number)),
                BlockNumberOrTag::Latest => self.provider.get_block_number().await.map(Some),
                tag => {
                    let block = self.provider.get_block_by_number(tag).await?;
                    Ok(block.map(|block| block.header().number()))
                }
            }
        })
    }
}
