//! Keyed cache whose entries go stale after a fixed age

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Age after which a cached rate is refetched
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);

struct Entry<V> {
    value: V,
    fetched_at: Instant,
}

/// Result of looking up a set of keys
#[derive(Debug)]
pub struct Lookup<K, V> {
    pub fresh: HashMap<K, V>,
    /// Keys that are missing or too old, in request order
    pub stale: Vec<K>,
}

pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    max_age: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Value for `key` if it was stored less than `max_age` ago
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.max_age)
            .map(|entry| &entry.value)
    }

    pub fn lookup<'a, I>(&self, keys: I) -> Lookup<K, V>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let mut fresh = HashMap::new();
        let mut stale = Vec::new();
        for key in keys {
            match self.get(key) {
                Some(value) => {
                    fresh.insert(key.clone(), value.clone());
                }
                None if !stale.contains(key) => stale.push(key.clone()),
                None => {}
            }
        }
        Lookup { fresh, stale }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let mut cache = TtlCache::default();
        cache.insert("usd", 65000.0);

        assert_eq!(cache.get(&"usd"), Some(&65000.0));

        tokio::time::advance(DEFAULT_MAX_AGE - Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"usd"), Some(&65000.0));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"usd"), None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_partitions_keys() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(1u16, 0.0002);
        tokio::time::advance(Duration::from_secs(90)).await;
        cache.insert(2u16, 0.0001);

        let lookup = cache.lookup(&[1, 2, 3, 3]);
        assert_eq!(lookup.fresh.len(), 1);
        assert_eq!(lookup.fresh[&2], 0.0001);
        assert_eq!(lookup.stale, vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_restamps_entry() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("eur", 1.0);
        tokio::time::advance(Duration::from_secs(59)).await;
        cache.insert("eur", 2.0);
        tokio::time::advance(Duration::from_secs(59)).await;

        assert_eq!(cache.get(&"eur"), Some(&2.0));
    }
}
