mod common;

use std::{
    path::PathBuf,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use adaptive_log_fetcher::{
    JsonFileStore, MemoryStore, assert_ordered_logs, assert_snapshot,
    cache::{CachePrefix, LogStore, rehydrate},
    test_utils::MockTransport,
};
use alloy::primitives::Address;

use crate::common::{WAIT_SECS, fast_builder, limited_node, registry, transfer_query, transfers};

fn scratch_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    std::env::temp_dir()
        .join(format!("adaptive-log-fetcher-it-{}-{nanos}", std::process::id()))
        .join(name)
}

#[tokio::test(start_paused = true)]
async fn restart_only_fetches_blocks_past_finality() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());

    let first = limited_node("node");
    let handle = fast_builder(transfer_query())
        .store(store.clone())
        .connect(registry(1, &[first])?)?
        .run();
    let mut stream = handle.subscribe();
    assert_snapshot!(stream, |s| s.is_complete(), timeout = WAIT_SECS);
    handle.shutdown().await?;
    assert!(!store.is_empty().await);

    let second = limited_node("node");
    let handle = fast_builder(transfer_query())
        .store(store.clone())
        .connect(registry(1, &[second.clone()])?)?
        .run();
    let mut stream = handle.subscribe();
    let snapshot = assert_snapshot!(stream, |s| s.is_complete(), timeout = WAIT_SECS);

    assert_eq!(snapshot.logs.len(), 81);
    assert_ordered_logs!(snapshot.logs);
    assert!(!second.requested_ranges().is_empty());
    for (from, to) in second.requested_ranges() {
        assert!(from > 19_000, "refetched finalized blocks {from}..={to}");
    }
    // Rehydration collapsed the first run's ranges into one entry; nothing past finality is
    // persisted.
    assert_eq!(store.len().await, 1);

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cache_is_scoped_to_the_query() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());

    let handle = fast_builder(transfer_query())
        .store(store.clone())
        .connect(registry(1, &[limited_node("node")])?)?
        .run();
    let mut stream = handle.subscribe();
    assert_snapshot!(stream, |s| s.is_complete(), timeout = WAIT_SECS);
    handle.shutdown().await?;

    let other = limited_node("node");
    let handle = fast_builder(transfer_query().address(Address::repeat_byte(7)))
        .store(store.clone())
        .connect(registry(1, &[other.clone()])?)?
        .run();
    let mut stream = handle.subscribe();
    assert_snapshot!(stream, |s| s.is_complete(), timeout = WAIT_SECS);

    assert!(other.requested_ranges().iter().any(|&(from, _)| from == 0));

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cache_is_scoped_to_the_chain() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());

    let handle = fast_builder(transfer_query())
        .store(store.clone())
        .connect(registry(1, &[limited_node("node")])?)?
        .run();
    let mut stream = handle.subscribe();
    assert_snapshot!(stream, |s| s.is_complete(), timeout = WAIT_SECS);
    handle.shutdown().await?;

    let other = limited_node("node");
    let handle = fast_builder(transfer_query())
        .store(store.clone())
        .connect(registry(10, &[other.clone()])?)?
        .run();
    let mut stream = handle.subscribe();
    assert_snapshot!(stream, |s| s.is_complete(), timeout = WAIT_SECS);

    assert!(other.requested_ranges().iter().any(|&(from, _)| from == 0));

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn json_store_persists_across_processes() -> anyhow::Result<()> {
    let path = scratch_path("logs.json");
    let node = Arc::new(
        MockTransport::new("node").latest(5_000).finalized(4_000).logs(transfers(0, 5_000, 100)),
    );

    let store = Arc::new(JsonFileStore::open(path.clone()).await?);
    let handle = fast_builder(transfer_query())
        .store(store)
        .connect(registry(1, &[node])?)?
        .run();
    let mut stream = handle.subscribe();
    let snapshot = assert_snapshot!(stream, |s| s.is_complete(), timeout = 30);
    assert_eq!(snapshot.logs.len(), 51);
    handle.shutdown().await?;

    let reopened = JsonFileStore::open(path.clone()).await?;
    let prefix = CachePrefix { chain_id: 1, signature: transfer_query().signature() };
    let merged = rehydrate(&reopened, &prefix, 4_000).await?;

    assert_eq!(merged.len(), 1);
    assert_eq!((merged[0].from_block, merged[0].to_block), (0, 4_000));
    assert_eq!(merged[0].logs.as_ref().map(Vec::len), Some(41));
    assert_eq!(reopened.list_by_prefix(&prefix).await?.len(), 1);

    if let Some(dir) = path.parent() {
        tokio::fs::remove_dir_all(dir).await?;
    }
    Ok(())
}
