//! Known range limits of popular hosted RPC providers.
//!
//! Hints only ever narrow what the strategy engine will try. A host without a hint is assumed to
//! be capable and left to discover its own limits through request statistics.

use alloy::transports::http::reqwest::Url;

use crate::strategy::MaxBlocks;

/// Largest `eth_getLogs` range accepted by the range-limited providers below.
pub const LIMITED_PROVIDER_MAX_BLOCKS: u64 = 10_000;

const UNLIMITED_HOSTS: &[&str] = &["alchemy", "tenderly.co"];
const LIMITED_HOSTS: &[&str] = &["drpc", "nodies.app", "mainnet.base.org"];
const NO_LOGS_HOSTS: &[&str] = &["lava.build"];

fn host(transport_id: &str) -> String {
    Url::parse(transport_id)
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
        .unwrap_or_else(|| transport_id.to_owned())
}

/// Whether the transport is known to accept a query spanning `max_blocks`.
///
/// `None` means nothing is known about the host.
#[must_use]
pub fn supports_num_blocks(transport_id: &str, max_blocks: MaxBlocks) -> Option<bool> {
    let host = host(transport_id);

    if NO_LOGS_HOSTS.iter().any(|h| host.contains(h)) {
        return Some(false);
    }
    if UNLIMITED_HOSTS.iter().any(|h| host.contains(h)) {
        return Some(true);
    }
    if LIMITED_HOSTS.iter().any(|h| host.contains(h)) {
        return Some(max_blocks <= MaxBlocks::Limited(LIMITED_PROVIDER_MAX_BLOCKS));
    }
    None
}

/// Whether the transport can serve `eth_getLogs` at all.
#[must_use]
pub fn serves_logs(transport_id: &str) -> bool {
    supports_num_blocks(transport_id, MaxBlocks::Limited(1)) != Some(false)
}
