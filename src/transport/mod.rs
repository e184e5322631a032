//! RPC transports and the per-chain transport registry.
//!
//! A [`Transport`] is the only way the rest of the crate talks to a node. It wraps a
//! [`LogTransport`] implementation (one attempt per call) with:
//! * a total per-call timeout
//! * exponential backoff retries
//!
//! Both are supplied per call through [`RequestOptions`], since the strategy engine picks a
//! different budget for every (transport, range size) pair.
//!
//! [`TransportRegistry`] collects the transports available for one chain. Fan-out configurations
//! ([`TransportConfig::Fallback`]) are flattened into individual transports, duplicates are
//! dropped by id, and hosts known not to serve `eth_getLogs` are excluded (see [`hints`]).
//!
//! # Examples
//!
//! ```rust,no_run
//! use adaptive_log_fetcher::transport::{TransportConfig, TransportRegistry};
//!
//! # fn example() -> anyhow::Result<()> {
//! let registry = TransportRegistry::builder(1)
//!     .config(TransportConfig::fallback([
//!         TransportConfig::http("https://eth.llamarpc.com".parse()?),
//!         TransportConfig::keyed("drpc", "https://eth.drpc.org".parse()?),
//!     ]))
//!     .build()?;
//! assert_eq!(registry.transports().len(), 2);
//! # Ok(()) }
//! ```

pub mod hints;
mod provider;
mod registry;
mod rpc;

pub use provider::{
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY, Error, LogTransport,
    RequestOptions, Transport,
};
pub use registry::{TransportConfig, TransportRegistry, TransportRegistryBuilder};
pub use rpc::RpcTransport;
