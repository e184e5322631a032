use std::collections::BTreeMap;

/// Coalesced set of block spans already fetched, keyed by `from_block`.
///
/// Spans never overlap and never touch: inserting a span adjacent to or overlapping existing ones
/// merges them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KnownRanges {
    spans: BTreeMap<u64, u64>,
}

impl KnownRanges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the inclusive span `from..=to`. Spans with `to < from` are ignored.
    pub fn insert(&mut self, from: u64, to: u64) {
        if to < from {
            return;
        }

        let (mut from, mut to) = (from, to);
        let touching: Vec<(u64, u64)> = self
            .spans
            .range(..=to.saturating_add(1))
            .rev()
            .take_while(|(_, end)| end.saturating_add(1) >= from)
            .map(|(&start, &end)| (start, end))
            .collect();

        for (start, end) in touching {
            self.spans.remove(&start);
            from = from.min(start);
            to = to.max(end);
        }
        self.spans.insert(from, to);
    }

    /// End of the span containing `block`, if any.
    #[must_use]
    pub fn span_end(&self, block: u64) -> Option<u64> {
        self.spans.range(..=block).next_back().and_then(|(_, &end)| (end >= block).then_some(end))
    }

    /// Start of the first span beginning strictly after `block`.
    #[must_use]
    pub fn next_start_after(&self, block: u64) -> Option<u64> {
        let lower = block.checked_add(1)?;
        self.spans.range(lower..).next().map(|(&start, _)| start)
    }

    /// Whether every block of `from..=to` is known.
    #[must_use]
    pub fn covers(&self, from: u64, to: u64) -> bool {
        from > to || self.span_end(from).is_some_and(|end| end >= to)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.spans.iter().map(|(&from, &to)| (from, to))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn clear(&mut self) {
        self.spans.clear();
    }
}

impl FromIterator<(u64, u64)> for KnownRanges {
    fn from_iter<T: IntoIterator<Item = (u64, u64)>>(iter: T) -> Self {
        let mut ranges = KnownRanges::new();
        ranges.extend(iter);
        ranges
    }
}

impl Extend<(u64, u64)> for KnownRanges {
    fn extend<T: IntoIterator<Item = (u64, u64)>>(&mut self, iter: T) {
        for (from, to) in iter {
            self.insert(from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_and_overlapping_spans_merge() {
        let ranges: KnownRanges = [(100, 200), (201, 300), (500, 600)].into_iter().collect();
        assert_eq!(ranges.iter().collect::<Vec<_>>(), [(100, 300), (500, 600)]);

        let mut ranges = ranges;
        ranges.insert(250, 550);
        assert_eq!(ranges.iter().collect::<Vec<_>>(), [(100, 600)]);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let a: KnownRanges = [(10, 20), (30, 40), (21, 29)].into_iter().collect();
        let b: KnownRanges = [(21, 29), (30, 40), (10, 20)].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.iter().collect::<Vec<_>>(), [(10, 40)]);
    }

    #[test]
    fn lookups() {
        let ranges: KnownRanges = [(100, 300), (500, 600)].into_iter().collect();

        assert_eq!(ranges.span_end(100), Some(300));
        assert_eq!(ranges.span_end(250), Some(300));
        assert_eq!(ranges.span_end(301), None);
        assert_eq!(ranges.next_start_after(301), Some(500));
        assert_eq!(ranges.next_start_after(500), None);
        assert!(ranges.covers(120, 300));
        assert!(!ranges.covers(120, 301));
    }

    #[test]
    fn span_at_u64_max() {
        let mut ranges = KnownRanges::new();
        ranges.insert(u64::MAX - 1, u64::MAX);
        ranges.insert(0, u64::MAX - 2);
        assert_eq!(ranges.iter().collect::<Vec<_>>(), [(0, u64::MAX)]);
        assert_eq!(ranges.next_start_after(u64::MAX), None);
    }

    #[test]
    fn detects_lost_coverage() {
        let before: KnownRanges = [(0, 10), (20, 30)].into_iter().collect();
        let grown: KnownRanges = [(0, 30)].into_iter().collect();
        let shrunk: KnownRanges = [(0, 10), (20, 25)].into_iter().collect();

        assert!(before.iter().all(|(from, to)| grown.covers(from, to)));
        assert!(!before.iter().all(|(from, to)| shrunk.covers(from, to)));
    }
}
