//! Persistent log cache and range coalescing.
//!
//! Fetched ranges are persisted through a [`LogStore`], keyed by a structured [`CacheKey`]:
//! chain id, the query's normalized [`QuerySignature`], and the range's `from_block`. On startup
//! [`rehydrate`] lists every entry under the query's [`CachePrefix`], merges them into contiguous
//! spans clipped to the finalized block, writes the merged spans back and deletes the fine-grained
//! entries they replace.
//!
//! Two stores ship with the crate:
//! * [`MemoryStore`], process-local
//! * [`JsonFileStore`], one JSON document on disk, rewritten atomically on every change

mod coalesce;
mod json_file;
mod memory;

use std::fmt;

use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::StatRecord;

pub use coalesce::{clip_to_finalized, coalesce_entries, coalesce_ranges, rehydrate};
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Normalized identity of a log query: sorted, deduplicated addresses and topic sets.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuerySignature {
    pub addresses: Vec<Address>,
    pub topics: [Vec<B256>; 4],
    pub event_name: Option<String>,
}

impl QuerySignature {
    #[must_use]
    pub fn new(
        addresses: impl IntoIterator<Item = Address>,
        topics: [Vec<B256>; 4],
        event_name: Option<String>,
    ) -> Self {
        let mut addresses: Vec<_> = addresses.into_iter().collect();
        addresses.sort_unstable();
        addresses.dedup();
        let topics = topics.map(|mut set| {
            set.sort_unstable();
            set.dedup();
            set
        });
        Self { addresses, topics, event_name }
    }

    /// Whether `log` satisfies the address and topic constraints. Empty sets match anything.
    #[must_use]
    pub fn matches(&self, log: &Log) -> bool {
        if !self.addresses.is_empty() && self.addresses.binary_search(&log.address()).is_err() {
            return false;
        }
        let topics = log.topics();
        self.topics.iter().enumerate().all(|(i, set)| {
            set.is_empty() || topics.get(i).is_some_and(|topic| set.binary_search(topic).is_ok())
        })
    }
}

/// Every cache entry of one query on one chain shares this prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CachePrefix {
    pub chain_id: u64,
    pub signature: QuerySignature,
}

impl CachePrefix {
    #[must_use]
    pub fn key(&self, from_block: u64) -> CacheKey {
        CacheKey { prefix: self.clone(), from_block }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub prefix: CachePrefix,
    pub from_block: u64,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}:{}", self.prefix.chain_id, self.prefix.signature, self.from_block)
    }
}

/// A persisted fetched range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub from_block: u64,
    pub to_block: u64,
    /// `None` marks an entry written without data; such entries are discarded on load.
    pub logs: Option<Vec<Log>>,
    /// Finalized block number when the range was fetched.
    pub finalized_block_number: u64,
    #[serde(default)]
    pub stats: Vec<StatRecord>,
}

/// Async key/value store for fetched log ranges.
///
/// Entries never expire on their own; only coalescing removes them.
pub trait LogStore: Send + Sync + fmt::Debug {
    fn get<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<Option<CacheEntry>, CacheError>>;

    fn set(&self, key: CacheKey, entry: CacheEntry) -> BoxFuture<'_, Result<(), CacheError>>;

    fn delete<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Every entry under `prefix`, in key order.
    fn list_by_prefix<'a>(
        &'a self,
        prefix: &'a CachePrefix,
    ) -> BoxFuture<'a, Result<Vec<(CacheKey, CacheEntry)>, CacheError>>;
}
