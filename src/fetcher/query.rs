use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, B256},
    rpc::types::{Filter, Log},
    sol_types::SolEvent,
};

use crate::cache::QuerySignature;

/// What to fetch: contract addresses, topic constraints and the block range.
///
/// Empty address or topic sets match anything. The range defaults to
/// `earliest..=latest`.
///
/// # Examples
///
/// ```rust
/// use adaptive_log_fetcher::EventQuery;
/// use alloy::{primitives::address, sol};
///
/// sol! {
///     event Transfer(address indexed from, address indexed to, uint256 value);
/// }
///
/// let query = EventQuery::new()
///     .address(address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"))
///     .event::<Transfer>()
///     .from_block(17_000_000);
/// assert_eq!(query.signature().event_name.as_deref(), Some("Transfer(address,address,uint256)"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventQuery {
    addresses: Vec<Address>,
    topics: [Vec<B256>; 4],
    event_name: Option<String>,
    from_block: BlockNumberOrTag,
    to_block: BlockNumberOrTag,
    enabled: bool,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQuery {
    #[must_use]
    pub fn new() -> Self {
        Self {
            addresses: vec![],
            topics: Default::default(),
            event_name: None,
            from_block: BlockNumberOrTag::Earliest,
            to_block: BlockNumberOrTag::Latest,
            enabled: true,
        }
    }

    /// Adds a contract address. May be called repeatedly.
    #[must_use]
    pub fn address(mut self, address: Address) -> Self {
        self.addresses.push(address);
        self
    }

    #[must_use]
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = Address>) -> Self {
        self.addresses.extend(addresses);
        self
    }

    /// Matches logs of event `E` and records its signature as the event name.
    #[must_use]
    pub fn event<E: SolEvent>(mut self) -> Self {
        self.topics[0].push(E::SIGNATURE_HASH);
        self.event_name = Some(E::SIGNATURE.to_owned());
        self
    }

    /// Adds a raw `topic0` value.
    #[must_use]
    pub fn event_signature(mut self, signature: B256) -> Self {
        self.topics[0].push(signature);
        self
    }

    #[must_use]
    pub fn topic1(mut self, topic: B256) -> Self {
        self.topics[1].push(topic);
        self
    }

    #[must_use]
    pub fn topic2(mut self, topic: B256) -> Self {
        self.topics[2].push(topic);
        self
    }

    #[must_use]
    pub fn topic3(mut self, topic: B256) -> Self {
        self.topics[3].push(topic);
        self
    }

    #[must_use]
    pub fn from_block(mut self, block: impl Into<BlockNumberOrTag>) -> Self {
        self.from_block = block.into();
        self
    }

    #[must_use]
    pub fn to_block(mut self, block: impl Into<BlockNumberOrTag>) -> Self {
        self.to_block = block.into();
        self
    }

    /// A disabled query resolves its range and loads its cache but fetches nothing.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn block_range(&self) -> (BlockNumberOrTag, BlockNumberOrTag) {
        (self.from_block, self.to_block)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `eth_getLogs` filter without block bounds; the executor sets them per segment.
    #[must_use]
    pub fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        if !self.addresses.is_empty() {
            filter = filter.address(self.addresses.clone());
        }
        let [topic0, topic1, topic2, topic3] = &self.topics;
        if !topic0.is_empty() {
            filter = filter.event_signature(topic0.clone());
        }
        if !topic1.is_empty() {
            filter = filter.topic1(topic1.clone());
        }
        if !topic2.is_empty() {
            filter = filter.topic2(topic2.clone());
        }
        if !topic3.is_empty() {
            filter = filter.topic3(topic3.clone());
        }
        filter
    }

    /// Normalized identity of the query, used to key cached ranges.
    #[must_use]
    pub fn signature(&self) -> QuerySignature {
        QuerySignature::new(self.addresses.iter().copied(), self.topics.clone(), self.event_name.clone())
    }

    #[must_use]
    pub fn matches(&self, log: &Log) -> bool {
        self.signature().matches(log)
    }
}

#[cfg(test)]
mod tests {
    use alloy::sol;

    use super::*;
    use crate::test_utils::log_at;

    sol! {
        event Transfer(address indexed from, address indexed to, uint256 value);
    }

    #[test]
    fn event_sets_topic0_and_name() {
        let query = EventQuery::new().event::<Transfer>();
        let signature = query.signature();

        assert_eq!(signature.topics[0], vec![Transfer::SIGNATURE_HASH]);
        assert_eq!(signature.event_name.as_deref(), Some("Transfer(address,address,uint256)"));
    }

    #[test]
    fn filter_carries_addresses_and_topics_without_bounds() {
        let a = Address::repeat_byte(1);
        let recipient = B256::repeat_byte(2);
        let filter = EventQuery::new().address(a).event::<Transfer>().topic2(recipient).filter();

        assert!(filter.address.matches(&a));
        assert!(filter.topics[0].matches(&Transfer::SIGNATURE_HASH));
        assert!(filter.topics[1].is_empty());
        assert!(filter.topics[2].matches(&recipient));
        assert_eq!(filter.block_option.get_from_block(), None);
    }

    #[test]
    fn equal_queries_share_a_signature() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);

        let one = EventQuery::new().address(a).address(b).event::<Transfer>().from_block(5);
        let two = EventQuery::new().addresses([b, a]).event::<Transfer>().to_block(9);

        assert_eq!(one.signature(), two.signature());
    }

    #[test]
    fn matches_honors_topics() {
        let a = Address::repeat_byte(1);
        let query = EventQuery::new().address(a).event_signature(B256::repeat_byte(7));

        assert!(query.matches(&log_at(a, vec![B256::repeat_byte(7)], 1, 0, 0)));
        assert!(!query.matches(&log_at(a, vec![B256::repeat_byte(8)], 1, 0, 0)));
    }
}
