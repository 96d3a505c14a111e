use lru::LruCache;

/// A cache entry that stores a value and its size in bytes.
struct CacheEntry {
    value: Vec<u8>,
    size: usize,
}

/// In-memory LRU of bytecode read from cached items, bounded by the total
/// number of bytes it holds rather than by the number of entries.
pub struct BytecodeCache {
    /// Label for logging
    label: String,
    memory_cache: LruCache<String, CacheEntry>,
    /// The current memory usage in bytes.
    current_memory_bytes: usize,
    /// The maximum allowable memory usage in bytes.
    max_memory_bytes: usize,
}

impl BytecodeCache {
    pub fn new(label: String, max_memory_bytes: usize) -> Self {
        log::debug!(
            "cache/{}: bytecode memory limited to {} bytes",
            label,
            max_memory_bytes
        );
        BytecodeCache {
            label,
            memory_cache: LruCache::unbounded(),
            current_memory_bytes: 0,
            max_memory_bytes,
        }
    }

    pub fn key(item: &str, unit: &str) -> String {
        format!("{}/{}", item, unit)
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        self.memory_cache
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// Adds or replaces a value, evicting least recently used entries until
    /// it fits. Values larger than the whole budget are not kept.
    pub fn put(&mut self, key: String, value: Vec<u8>) {
        self.invalidate(&key);
        let size = value.len();

        if size > self.max_memory_bytes {
            log::debug!(
                "cache/{}: value size {} exceeds limit {}",
                self.label,
                size,
                self.max_memory_bytes
            );
            return;
        }

        while self.current_memory_bytes + size > self.max_memory_bytes {
            let Some((_, old_entry)) = self.memory_cache.pop_lru() else {
                break;
            };
            debug_assert!(
                self.current_memory_bytes >= old_entry.size,
                "Memory tracking inconsistency detected"
            );
            self.current_memory_bytes = self
                .current_memory_bytes
                .saturating_sub(old_entry.size);
        }

        self.memory_cache
            .put(key, CacheEntry { value, size });
        self.current_memory_bytes += size;
    }

    pub fn invalidate(&mut self, key: &str) {
        if let Some(entry) = self.memory_cache.pop(key) {
            self.current_memory_bytes =
                self.current_memory_bytes.saturating_sub(entry.size);
        }
    }

    /// Drops every value cached for `item`.
    pub fn invalidate_item(&mut self, item: &str) {
        let prefix = format!("{}/", item);
        let keys: Vec<String> = self
            .memory_cache
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            self.invalidate(&key);
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.current_memory_bytes
    }

    pub fn len(&self) -> usize {
        self.memory_cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_put_and_get() {
        let mut cache = BytecodeCache::new("test".to_owned(), 1024);
        cache.put(BytecodeCache::key("item", "a.Foo"), vec![1, 2, 3]);
        assert_eq!(cache.get("item/a.Foo"), Some(vec![1, 2, 3]));
        assert_eq!(cache.get("item/a.Bar"), None);
        assert_eq!(cache.memory_bytes(), 3);
    }

    #[test]
    fn test_memory_eviction() {
        let mut cache = BytecodeCache::new("test".to_owned(), 8);
        cache.put("key1".to_owned(), vec![1, 2, 3, 4, 5, 7]);
        cache.put("key2".to_owned(), vec![5, 6, 8]);

        assert_eq!(cache.get("key1"), None);
        assert_eq!(cache.get("key2"), Some(vec![5, 6, 8]));
        assert_eq!(cache.memory_bytes(), 3);
    }

    #[test]
    fn test_large_value_is_skipped() {
        let mut cache = BytecodeCache::new("test".to_owned(), 4);
        cache.put("small".to_owned(), vec![1]);
        cache.put("large".to_owned(), vec![0; 5]);
        assert_eq!(cache.get("large"), None);
        assert_eq!(cache.get("small"), Some(vec![1]));
    }

    #[test]
    fn test_replace_keeps_accounting() {
        let mut cache = BytecodeCache::new("test".to_owned(), 16);
        cache.put("a".to_owned(), vec![0; 10]);
        cache.put("a".to_owned(), vec![0; 4]);
        assert_eq!(cache.memory_bytes(), 4);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_item() {
        let mut cache = BytecodeCache::new("test".to_owned(), 64);
        cache.put(BytecodeCache::key("one", "a.Foo"), vec![1]);
        cache.put(BytecodeCache::key("one", "a.Bar"), vec![2]);
        cache.put(BytecodeCache::key("other", "a.Foo"), vec![3]);

        cache.invalidate_item("one");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_bytes(), 1);
        assert_eq!(cache.get("other/a.Foo"), Some(vec![3]));
    }

    #[derive(Clone, Debug)]
    struct Puts(Vec<(u8, usize)>);

    impl Arbitrary for Puts {
        fn arbitrary(g: &mut Gen) -> Self {
            let size = usize::arbitrary(g) % 50 + 1;
            Puts(
                (0..size)
                    .map(|_| (u8::arbitrary(g) % 16, usize::arbitrary(g) % 40))
                    .collect(),
            )
        }
    }

    #[quickcheck]
    fn prop_memory_stays_within_limit(Puts(puts): Puts) -> bool {
        let limit = 64;
        let mut cache = BytecodeCache::new("prop".to_owned(), limit);
        puts.into_iter().all(|(key, size)| {
            cache.put(key.to_string(), vec![0; size]);
            let actual: usize =
                cache.memory_cache.iter().map(|(_, entry)| entry.size).sum();
            cache.memory_bytes() <= limit && cache.memory_bytes() == actual
        })
    }
}
