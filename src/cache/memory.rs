use std::collections::BTreeMap;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::cache::{CacheEntry, CacheError, CacheKey, CachePrefix, LogStore};

/// Process-local [`LogStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<CacheKey, CacheEntry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

pub(crate) fn prefix_range(
    entries: &BTreeMap<CacheKey, CacheEntry>,
    prefix: &CachePrefix,
) -> Vec<(CacheKey, CacheEntry)> {
    entries
        .range(prefix.key(0)..=prefix.key(u64::MAX))
        .map(|(key, entry)| (key.clone(), entry.clone()))
        .collect()
}

impl LogStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<Option<CacheEntry>, CacheError>> {
        Box::pin(async move { Ok(self.entries.read().await.get(key).cloned()) })
    }

    fn set(&self, key: CacheKey, entry: CacheEntry) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async move {
            self.entries.write().await.insert(key, entry);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            self.entries.write().await.remove(key);
            Ok(())
        })
    }

    fn list_by_prefix<'a>(
        &'a self,
        prefix: &'a CachePrefix,
    ) -> BoxFuture<'a, Result<Vec<(CacheKey, CacheEntry)>, CacheError>> {
        Box::pin(async move { Ok(prefix_range(&*self.entries.read().await, prefix)) })
    }
}
