use std::{collections::HashSet, sync::Arc};

use alloy::{
    network::{Ethereum, Network},
    providers::RootProvider,
    transports::http::reqwest::Url,
};

use crate::{
    FetchError,
    transport::{LogTransport, RpcTransport, Transport, hints},
};

/// Declarative description of where a chain's RPC endpoints live.
///
/// Fan-out configurations are flattened depth-first into individual transports when the registry
/// is built; nothing downstream distinguishes a fallback member from a standalone endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportConfig {
    Http { url: Url, key: Option<String> },
    Fallback(Vec<TransportConfig>),
}

impl TransportConfig {
    #[must_use]
    pub fn http(url: Url) -> Self {
        Self::Http { url, key: None }
    }

    /// An HTTP endpoint identified by `key` instead of its URL.
    #[must_use]
    pub fn keyed(key: impl Into<String>, url: Url) -> Self {
        Self::Http { url, key: Some(key.into()) }
    }

    #[must_use]
    pub fn fallback(configs: impl IntoIterator<Item = TransportConfig>) -> Self {
        Self::Fallback(configs.into_iter().collect())
    }

    fn flatten_into(self, out: &mut Vec<(String, Url)>) {
        match self {
            Self::Http { url, key } => {
                let id = key.unwrap_or_else(|| url.to_string());
                out.push((id, url));
            }
            Self::Fallback(configs) => {
                for config in configs {
                    config.flatten_into(out);
                }
            }
        }
    }
}

/// The flat, deduplicated set of transports available for one chain.
#[derive(Clone, Debug)]
pub struct TransportRegistry {
    chain_id: u64,
    transports: Vec<Transport>,
}

impl TransportRegistry {
    #[must_use]
    pub fn builder(chain_id: u64) -> TransportRegistryBuilder {
        TransportRegistryBuilder::new(chain_id)
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    #[must_use]
    pub fn transports(&self) -> &[Transport] {
        &self.transports
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Transport> {
        self.transports.iter().find(|t| t.id() == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.transports.iter().map(Transport::id)
    }

    /// Whether both registries target the same chain with the same set of transport ids.
    #[must_use]
    pub fn same_transports(&self, other: &TransportRegistry) -> bool {
        if self.chain_id != other.chain_id {
            return false;
        }
        let ours: HashSet<&str> = self.ids().collect();
        let theirs: HashSet<&str> = other.ids().collect();
        ours == theirs
    }
}

/// Builder for [`TransportRegistry`].
pub struct TransportRegistryBuilder {
    chain_id: u64,
    transports: Vec<Transport>,
}

impl TransportRegistryBuilder {
    #[must_use]
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id, transports: vec![] }
    }

    /// Adds an HTTP endpoint identified by its URL.
    #[must_use]
    pub fn url(self, url: Url) -> Self {
        self.config(TransportConfig::http(url))
    }

    /// Adds every endpoint described by `config`.
    #[must_use]
    pub fn config(mut self, config: TransportConfig) -> Self {
        let mut endpoints = vec![];
        config.flatten_into(&mut endpoints);
        for (id, url) in endpoints {
            let provider = RootProvider::<Ethereum>::new_http(url);
            self.transports.push(Transport::new(RpcTransport::new(id, provider)));
        }
        self
    }

    /// Adds an existing provider under the given id.
    #[must_use]
    pub fn provider<N: Network>(self, id: impl Into<String>, provider: RootProvider<N>) -> Self {
        self.transport(RpcTransport::new(id, provider))
    }

    /// Adds a custom transport implementation.
    #[must_use]
    pub fn transport(mut self, transport: impl LogTransport + 'static) -> Self {
        self.transports.push(Transport::new(transport));
        self
    }

    #[must_use]
    pub fn shared(mut self, transport: Arc<dyn LogTransport>) -> Self {
        self.transports.push(Transport::from_arc(transport));
        self
    }

    /// Flattens, deduplicates and filters the configured transports.
    ///
    /// Duplicate ids keep their first occurrence. Hosts known not to serve `eth_getLogs` are
    /// dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NoTransports`] if no usable transport remains.
    pub fn build(self) -> Result<TransportRegistry, FetchError> {
        let mut seen = HashSet::new();
        let mut transports = Vec::with_capacity(self.transports.len());

        for transport in self.transports {
            if !seen.insert(transport.id().to_owned()) {
                debug!(transport = %transport.id(), "Skipping duplicate transport");
                continue;
            }
            if !hints::serves_logs(transport.id()) {
                warn!(transport = %transport.id(), "Transport does not serve eth_getLogs, skipping");
                continue;
            }
            transports.push(transport);
        }

        if transports.is_empty() {
            return Err(FetchError::NoTransports);
        }

        info!(chain_id = self.chain_id, transports = transports.len(), "Transport registry built");
        Ok(TransportRegistry { chain_id: self.chain_id, transports })
    }
}
