use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::debug;

use txconf_types::BlockHeader;

use crate::lock;

struct Inner {
    headers: BTreeMap<u64, BlockHeader>,
    /// Highest block number ever inserted, including evicted ones.
    highest_seen: Option<u64>,
}

/// Bounded map from block sequence number to extracted header fields.
///
/// Insertion never blocks on the bound: the cache may temporarily exceed its
/// capacity until the evictor runs [`HeaderCache::enforce_bound`]. Eviction
/// always removes the entry with the smallest sequence number, which in an
/// append-only ledger is the oldest block.
pub struct HeaderCache {
    inner: Mutex<Inner>,
    capacity: usize,
    changes: watch::Sender<u64>,
}

impl HeaderCache {
    /// Create an empty cache bounded to `capacity` headers.
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner {
                headers: BTreeMap::new(),
                highest_seen: None,
            }),
            capacity,
            changes,
        }
    }

    /// Insert a header, overwriting any header with the same number.
    ///
    /// Returns the overwritten header, if any.
    pub fn insert(&self, header: BlockHeader) -> Option<BlockHeader> {
        let number = header.number;
        let previous = {
            let mut inner = lock(&self.inner);
            inner.highest_seen = Some(inner.highest_seen.map_or(number, |h| h.max(number)));
            inner.headers.insert(number, header)
        };
        self.changes.send_modify(|generation| *generation += 1);
        previous
    }

    /// Clone the header for `number`, if cached.
    pub fn get(&self, number: u64) -> Option<BlockHeader> {
        lock(&self.inner).headers.get(&number).cloned()
    }

    /// Look up several block numbers under a single lock acquisition.
    ///
    /// Only the numbers that are cached appear in the result.
    pub fn get_many<I>(&self, numbers: I) -> HashMap<u64, BlockHeader>
    where
        I: IntoIterator<Item = u64>,
    {
        let inner = lock(&self.inner);
        numbers
            .into_iter()
            .filter_map(|n| inner.headers.get(&n).map(|h| (n, h.clone())))
            .collect()
    }

    /// Returns `true` if a header for `number` is cached.
    pub fn contains(&self, number: u64) -> bool {
        lock(&self.inner).headers.contains_key(&number)
    }

    /// Evict the oldest header if the cache is over capacity.
    ///
    /// Returns the evicted header. At most one entry is removed per call.
    pub fn evict_one(&self) -> Option<BlockHeader> {
        let mut inner = lock(&self.inner);
        if inner.headers.len() <= self.capacity {
            return None;
        }
        inner.headers.pop_first().map(|(_, header)| header)
    }

    /// Evict oldest headers one at a time until the cache is within capacity.
    ///
    /// Returns the evicted block numbers in eviction order.
    pub fn enforce_bound(&self) -> Vec<u64> {
        let mut evicted = Vec::new();
        while let Some(header) = self.evict_one() {
            debug!(block = header.number, "header evicted");
            evicted.push(header.number);
        }
        evicted
    }

    /// Number of cached headers.
    pub fn len(&self) -> usize {
        lock(&self.inner).headers.len()
    }

    /// Returns `true` if no header is cached.
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).headers.is_empty()
    }

    /// The configured bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Highest block number ever inserted, even if since evicted.
    pub fn highest_seen(&self) -> Option<u64> {
        lock(&self.inner).highest_seen
    }

    /// Smallest cached block number.
    pub fn lowest_cached(&self) -> Option<u64> {
        lock(&self.inner).headers.keys().next().copied()
    }

    /// Sorted list of cached block numbers.
    pub fn numbers(&self) -> Vec<u64> {
        lock(&self.inner).headers.keys().copied().collect()
    }

    /// Receive a notification after every insertion.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

impl std::fmt::Debug for HeaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header(number: u64) -> BlockHeader {
        BlockHeader::new(number, format!("h{number}"), format!("h{}", number.saturating_sub(1)), 0)
    }

    #[test]
    fn insert_and_get() {
        let cache = HeaderCache::new(4);
        assert!(cache.insert(header(100)).is_none());
        assert_eq!(cache.get(100).unwrap().data_hash, "h100");
        assert!(cache.get(101).is_none());
        assert!(cache.contains(100));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn insert_overwrites_same_number() {
        let cache = HeaderCache::new(4);
        cache.insert(header(1));
        let mut replacement = header(1);
        replacement.data_hash = "other".into();
        let previous = cache.insert(replacement).unwrap();
        assert_eq!(previous.data_hash, "h1");
        assert_eq!(cache.get(1).unwrap().data_hash, "other");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_smallest_number_first() {
        // Bound 2, blocks 10, 11, 12 inserted in order: 10 goes.
        let cache = HeaderCache::new(2);
        for n in [10, 11, 12] {
            cache.insert(header(n));
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.enforce_bound(), vec![10]);
        assert_eq!(cache.numbers(), vec![11, 12]);
        assert_eq!(cache.highest_seen(), Some(12));
    }

    #[test]
    fn evict_one_is_a_no_op_within_bound() {
        let cache = HeaderCache::new(2);
        cache.insert(header(1));
        cache.insert(header(2));
        assert!(cache.evict_one().is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn eviction_ignores_insertion_order() {
        let cache = HeaderCache::new(1);
        cache.insert(header(7));
        cache.insert(header(3));
        assert_eq!(cache.evict_one().unwrap().number, 3);
        assert_eq!(cache.numbers(), vec![7]);
    }

    #[test]
    fn get_many_returns_only_cached() {
        let cache = HeaderCache::new(8);
        cache.insert(header(1));
        cache.insert(header(3));
        let found = cache.get_many([1, 2, 3]);
        assert_eq!(found.len(), 2);
        assert!(found.contains_key(&1) && found.contains_key(&3));
    }

    #[test]
    fn highest_seen_survives_eviction() {
        let cache = HeaderCache::new(1);
        cache.insert(header(5));
        cache.insert(header(6));
        cache.enforce_bound();
        cache.enforce_bound();
        assert_eq!(cache.lowest_cached(), Some(6));
        assert_eq!(cache.highest_seen(), Some(6));
        assert!(!cache.contains(5));
    }

    #[tokio::test]
    async fn insert_notifies_subscribers() {
        let cache = HeaderCache::new(2);
        let mut rx = cache.subscribe();
        cache.insert(header(1));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
    }

    proptest! {
        #[test]
        fn bound_holds_and_evicted_entry_is_minimum(
            numbers in proptest::collection::vec(0u64..500, 1..64),
            capacity in 1usize..16,
        ) {
            let cache = HeaderCache::new(capacity);
            for n in numbers {
                cache.insert(header(n));
                let before = cache.numbers();
                if let Some(evicted) = cache.evict_one() {
                    prop_assert_eq!(evicted.number, before[0]);
                }
                cache.enforce_bound();
                prop_assert!(cache.len() <= capacity);
            }
        }
    }
}
