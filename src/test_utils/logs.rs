use alloy::{
    primitives::{Address, B256, Bytes, keccak256},
    rpc::types::Log,
    sol_types::SolEvent,
};

/// Deterministic block hash for `block`.
#[must_use]
pub fn block_hash(block: u64) -> B256 {
    B256::left_padding_from(&block.to_be_bytes())
}

/// Deterministic transaction hash for the `tx_index`-th transaction of `block`.
#[must_use]
pub fn tx_hash(block: u64, tx_index: u64) -> B256 {
    let mut preimage = [0u8; 16];
    preimage[..8].copy_from_slice(&block.to_be_bytes());
    preimage[8..].copy_from_slice(&tx_index.to_be_bytes());
    keccak256(preimage)
}

/// A confirmed log at (`block`, `tx_index`, `log_index`).
#[must_use]
pub fn log_at(
    address: Address,
    topics: Vec<B256>,
    block: u64,
    tx_index: u64,
    log_index: u64,
) -> Log {
    Log {
        inner: alloy::primitives::Log::new_unchecked(address, topics, Bytes::new()),
        block_hash: Some(block_hash(block)),
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(tx_hash(block, tx_index)),
        transaction_index: Some(tx_index),
        log_index: Some(log_index),
        removed: false,
    }
}

/// A log emitted by a not yet mined transaction.
#[must_use]
pub fn pending_log(address: Address, topics: Vec<B256>, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log::new_unchecked(address, topics, Bytes::new()),
        block_hash: None,
        block_number: None,
        block_timestamp: None,
        transaction_hash: None,
        transaction_index: None,
        log_index: Some(log_index),
        removed: false,
    }
}

/// Wraps an encoded event into a confirmed log.
#[must_use]
pub fn event_log<E: SolEvent>(address: Address, event: &E, block: u64, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log { address, data: event.encode_log_data() },
        ..log_at(address, vec![], block, 0, log_index)
    }
}

/// One log per `step` blocks over `from..=to`, all carrying `topic0`.
#[must_use]
pub fn logs_every(address: Address, topic0: B256, from: u64, to: u64, step: u64) -> Vec<Log> {
    (from..=to)
        .step_by(usize::try_from(step.max(1)).unwrap_or(usize::MAX))
        .map(|block| log_at(address, vec![topic0], block, 0, 0))
        .collect()
}
