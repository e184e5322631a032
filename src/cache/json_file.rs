use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use crate::cache::{
    CacheEntry, CacheError, CacheKey, CachePrefix, LogStore, memory::prefix_range,
};

/// [`LogStore`] persisted as a single JSON document.
///
/// The whole document is kept in memory and rewritten through a temporary file and a rename on
/// every change, so a crash never leaves a truncated file behind. Writes are serialized, and the
/// in-memory view only changes once the file has been written.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<CacheKey, CacheEntry>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// * [`CacheError::Io`] if the file or its parent directory cannot be read or created.
    /// * [`CacheError::Serde`] if the file is not a valid store document.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<(CacheKey, CacheEntry)>>(&bytes)?
                .into_iter()
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), entries = entries.len(), "Opened JSON log store");
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<CacheKey, CacheEntry>) -> Result<(), CacheError> {
        let records: Vec<(&CacheKey, &CacheEntry)> = entries.iter().collect();
        let json = serde_json::to_vec(&records)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl LogStore for JsonFileStore {
    fn get<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<Option<CacheEntry>, CacheError>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn set(&self, key: CacheKey, entry: CacheEntry) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let mut updated = entries.clone();
            updated.insert(key, entry);
            self.persist(&updated).await?;
            *entries = updated;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            if !entries.contains_key(key) {
                return Ok(());
            }
            let mut updated = entries.clone();
            updated.remove(key);
            self.persist(&updated).await?;
            *entries = updated;
            Ok(())
        })
    }

    fn list_by_prefix<'a>(
        &'a self,
        prefix: &'a CachePrefix,
    ) -> BoxFuture<'a, Result<Vec<(CacheKey, CacheEntry)>, CacheError>> {
        Box::pin(async move { Ok(prefix_range(&*self.entries.lock().await, prefix)) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use alloy::primitives::{Address, B256};

    use super::*;
    use crate::{cache::QuerySignature, test_utils::log_at};

    fn scratch_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
        std::env::temp_dir()
            .join(format!("adaptive-log-fetcher-{}-{nanos}", std::process::id()))
            .join(name)
    }

    #[tokio::test]
    async fn entries_survive_reopen() -> anyhow::Result<()> {
        let path = scratch_path("store.json");
        let prefix = CachePrefix {
            chain_id: 1,
            signature: QuerySignature::new([Address::repeat_byte(1)], Default::default(), None),
        };
        let entry = CacheEntry {
            from_block: 10,
            to_block: 20,
            logs: Some(vec![log_at(Address::repeat_byte(1), vec![B256::ZERO], 15, 0, 0)]),
            finalized_block_number: 30,
            stats: vec![],
        };

        {
            let store = JsonFileStore::open(&path).await?;
            store.set(prefix.key(10), entry.clone()).await?;
            store.set(prefix.key(21), entry.clone()).await?;
            store.delete(&prefix.key(21)).await?;
        }

        let reopened = JsonFileStore::open(&path).await?;
        let listed = reopened.list_by_prefix(&prefix).await?;
        assert_eq!(listed, vec![(prefix.key(10), entry)]);

        if let Some(dir) = path.parent() {
            tokio::fs::remove_dir_all(dir).await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() -> anyhow::Result<()> {
        let path = scratch_path("corrupt.json");
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, b"not json").await?;

        let err = JsonFileStore::open(&path).await.unwrap_err();
        assert!(matches!(err, CacheError::Serde(_)));

        if let Some(dir) = path.parent() {
            tokio::fs::remove_dir_all(dir).await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_leaves_store_unchanged() -> anyhow::Result<()> {
        let path = scratch_path("vanishing.json");
        let prefix = CachePrefix::default();
        let entry = CacheEntry {
            from_block: 0,
            to_block: 9,
            logs: Some(vec![]),
            finalized_block_number: 9,
            stats: vec![],
        };

        let store = JsonFileStore::open(&path).await?;
        store.set(prefix.key(0), entry.clone()).await?;
        if let Some(dir) = path.parent() {
            tokio::fs::remove_dir_all(dir).await?;
        }

        let err = store.set(prefix.key(10), entry.clone()).await.unwrap_err();
        assert!(matches!(err, CacheError::Io(_)));
        assert!(store.get(&prefix.key(10)).await?.is_none());

        assert!(store.delete(&prefix.key(0)).await.is_err());
        assert_eq!(store.get(&prefix.key(0)).await?, Some(entry));
        Ok(())
    }
}
