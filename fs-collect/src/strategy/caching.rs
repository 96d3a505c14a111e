use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use data_error::Result;
use data_offer::{FileRecord, Offer};

use super::CollectionStrategy;
use crate::context::CollectContext;

struct CacheEntry {
    offer: Offer,
    last_used: AtomicU64,
}

/// Memoizes the offers of another strategy, keeping at most `capacity`
/// of them. Hits are served without locking; misses are computed one at a
/// time. Overflow evicts the entry that was used least recently.
pub struct CachingStrategy {
    delegate: Arc<dyn CollectionStrategy>,
    capacity: usize,
    entries: DashMap<String, CacheEntry>,
    clock: AtomicU64,
    compute: Mutex<()>,
}

impl CachingStrategy {
    pub fn new(delegate: Arc<dyn CollectionStrategy>, capacity: usize) -> Self {
        CachingStrategy {
            delegate,
            capacity,
            entries: DashMap::with_capacity(capacity + 1),
            clock: AtomicU64::new(0),
            compute: Mutex::new(()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.entries.contains_key(unit)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn hit(&self, unit: &str) -> Option<Offer> {
        let entry = self.entries.get(unit)?;
        entry.last_used.store(self.tick(), Ordering::SeqCst);
        Some(entry.offer.clone())
    }

    fn evict_overflow(&self, keep: &str) {
        if self.entries.len() <= self.capacity {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .filter(|entry| entry.key() != keep)
            .min_by_key(|entry| entry.last_used.load(Ordering::SeqCst))
            .map(|entry| entry.key().clone());
        if let Some(unit) = oldest {
            log::debug!("collect/caching: evicting {}", unit);
            self.entries.remove(&unit);
        }
    }
}

impl CollectionStrategy for CachingStrategy {
    fn label(&self) -> &str {
        "caching"
    }

    fn context(&self) -> &CollectContext {
        self.delegate.context()
    }

    fn collect(&self, unit: &str) -> Result<Option<Offer>> {
        if let Some(offer) = self.hit(unit) {
            return Ok(Some(offer));
        }

        let _guard = self.compute.lock();
        if let Some(offer) = self.hit(unit) {
            return Ok(Some(offer));
        }

        let Some(offer) = self.delegate.collect(unit)? else {
            return Ok(None);
        };
        self.entries.insert(
            unit.to_owned(),
            CacheEntry {
                offer: offer.clone(),
                last_used: AtomicU64::new(u64::MAX),
            },
        );
        self.evict_overflow(unit);
        if let Some(entry) = self.entries.get(unit) {
            entry.last_used.store(self.tick(), Ordering::SeqCst);
        }
        Ok(Some(offer))
    }

    fn load_content(&self, file: &mut FileRecord) -> Result<()> {
        self.delegate.load_content(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    /// Offers one empty record named after the unit and counts calls.
    struct Counting {
        context: CollectContext,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new() -> Arc<Self> {
            Arc::new(Counting {
                context: CollectContext::default(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl CollectionStrategy for Counting {
        fn label(&self) -> &str {
            "counting"
        }

        fn context(&self) -> &CollectContext {
            &self.context
        }

        fn collect(&self, unit: &str) -> Result<Option<Offer>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if unit.starts_with("missing") {
                return Ok(None);
            }
            Ok(Some(Offer::new(vec![FileRecord::new(
                unit,
                0,
                0,
                data_offer::ContentKind::Class,
            )])))
        }
    }

    #[test]
    fn hits_do_not_reach_the_delegate() {
        let delegate = Counting::new();
        let cache = CachingStrategy::new(delegate.clone(), 2);

        let first = cache.collect("a").unwrap().unwrap();
        let second = cache.collect("a").unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(delegate.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn absent_offers_are_not_cached() {
        let delegate = Counting::new();
        let cache = CachingStrategy::new(delegate.clone(), 2);

        assert_eq!(cache.collect("missing").unwrap(), None);
        assert_eq!(cache.collect("missing").unwrap(), None);
        assert_eq!(delegate.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn overflow_evicts_least_recently_used() {
        let cache = CachingStrategy::new(Counting::new(), 3);
        for unit in ["a", "b", "c"] {
            cache.collect(unit).unwrap();
        }
        // "a" becomes the most recent, "b" the oldest.
        cache.collect("a").unwrap();

        cache.collect("d").unwrap();
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("b"));

        cache.collect("e").unwrap();
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("c"));
        assert!(cache.contains("a"));
        assert!(cache.contains("d"));
        assert!(cache.contains("e"));
    }

    #[test]
    fn bounded_after_many_inserts() {
        let capacity = 4;
        let cache = CachingStrategy::new(Counting::new(), capacity);
        for i in 0..capacity + 7 {
            cache.collect(&format!("unit-{}", i)).unwrap();
            assert!(cache.len() <= capacity);
        }
        assert_eq!(cache.len(), capacity);
        for i in 7..capacity + 7 {
            assert!(cache.contains(&format!("unit-{}", i)));
        }
    }

    #[test]
    fn concurrent_misses_compute_once() {
        let delegate = Counting::new();
        let cache = Arc::new(CachingStrategy::new(delegate.clone(), 8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.collect("shared").unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_some());
        }
        assert_eq!(delegate.calls.load(Ordering::SeqCst), 1);
    }
}
