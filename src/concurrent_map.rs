use foldhash::fast::{FixedState, RandomState};
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::RwLock;

/// Represents the action to be taken on a value in a `Shard`.
enum UpdateAction<V> {
    /// Keep the current value unchanged.
    Keep,
    /// Store the provided value.
    Replace(V),
}

/// One independently locked slice of a `ConcurrentMap`.
#[derive(Debug)]
struct Shard<K, V> {
    map: RwLock<HashMap<K, V, RandomState>>,
}

impl<K, V> Shard<K, V>
where
    K: Eq + Hash,
{
    fn with_capacity(capacity: usize) -> Self {
        Self {
            map: RwLock::new(HashMap::with_capacity_and_hasher(
                capacity,
                RandomState::default(),
            )),
        }
    }

    fn len(&self) -> usize {
        self.map.read().unwrap().len()
    }

    fn load(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.map.read().unwrap().get(key).cloned()
    }

    /// Runs `func` on the current value under the shard's write lock and applies
    /// the action it returns.
    fn update<F, R>(&self, key: K, func: F) -> R
    where
        F: FnOnce(Option<&V>) -> (UpdateAction<V>, R),
    {
        let mut map = self.map.write().unwrap();
        let (action, ret) = func(map.get(&key));
        if let UpdateAction::Replace(value) = action {
            map.insert(key, value);
        }
        ret
    }
}

/// An internally synchronized hashmap.
///
/// Callers never see a lock: every operation synchronizes on its own, and keys
/// spread over shards so unrelated keys rarely contend.
///
/// # Examples
/// ```
/// use lockbench::ConcurrentMap;
///
/// let map = ConcurrentMap::<u32, i64>::new();
/// map.store(1, 7);
/// assert_eq!(map.load(&1), Some(7));
/// assert_eq!(map.load_or_store(1, 9), (7, true));
/// assert_eq!(map.load_or_store(2, 9), (9, false));
/// ```
pub struct ConcurrentMap<K, V> {
    shards: Vec<Shard<K, V>>,
}

impl<K: Eq + Hash, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    /// Creates a map with one shard per available core, rounded up to a power of two.
    pub fn new() -> Self {
        let shard_amount = std::thread::available_parallelism()
            .map_or(1, usize::from)
            .next_power_of_two();
        Self::with_capacity_and_shard_amount(0, shard_amount)
    }

    /// Creates a new `ConcurrentMap` with the specified capacity and number of shards.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The total initial capacity of the hashmap.
    /// * `shard_amount` - The number of shards to create, at least one.
    pub fn with_capacity_and_shard_amount(capacity: usize, shard_amount: usize) -> Self {
        let shard_amount = shard_amount.max(1);
        let shard_capacity = capacity / shard_amount;
        Self {
            shards: (0..shard_amount)
                .map(|_| Shard::with_capacity(shard_capacity))
                .collect::<Vec<_>>(),
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the value stored for `key`.
    pub fn load(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.shard(key).load(key)
    }

    /// Stores `value` for `key`, replacing any previous value.
    pub fn store(&self, key: K, value: V) {
        self.shard(&key)
            .update(key, |_| (UpdateAction::Replace(value), ()))
    }

    /// Returns the existing value for `key` if present, otherwise stores `value`.
    ///
    /// # Returns
    ///
    /// The resulting value, and `true` if it was loaded rather than stored.
    pub fn load_or_store(&self, key: K, value: V) -> (V, bool)
    where
        V: Clone,
    {
        self.shard(&key).update(key, |current| match current {
            Some(current) => (UpdateAction::Keep, (current.clone(), true)),
            None => (UpdateAction::Replace(value.clone()), (value, false)),
        })
    }

    #[inline(always)]
    fn shard(&self, key: &K) -> &Shard<K, V> {
        let idx = FixedState::default().hash_one(key) as usize % self.shards.len();
        &self.shards[idx]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn test_concurrent_map() {
        let map = ConcurrentMap::<u32, u32>::with_capacity_and_shard_amount(256, 16);
        assert!(map.is_empty());
        assert_eq!(map.load(&1), None);

        map.store(1, 1);
        assert!(!map.is_empty());
        assert_eq!(map.len(), 1);
        assert_eq!(map.load(&1), Some(1));

        map.store(1, 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.load(&1), Some(2));

        assert_eq!(map.load_or_store(1, 3), (2, true));
        assert_eq!(map.load(&1), Some(2));
        assert_eq!(map.load_or_store(2, 3), (3, false));
        assert_eq!(map.load(&2), Some(3));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_concurrent_map_zero_shards() {
        let map = ConcurrentMap::<String, String>::with_capacity_and_shard_amount(0, 0);
        map.store("hello".to_string(), "world".to_string());
        assert_eq!(map.load(&"hello".to_string()).unwrap(), "world");
    }

    #[test]
    fn test_concurrent_map_load_or_store_once() {
        let map = Arc::new(ConcurrentMap::<u32, usize>::default());
        let stored = Arc::new(AtomicUsize::default());
        const N: usize = 1 << 10;
        const M: usize = 8;

        let threads = (0..M)
            .map(|i| {
                let map = map.clone();
                let stored = stored.clone();
                std::thread::spawn(move || {
                    for key in 0..N as u32 {
                        let (_, loaded) = map.load_or_store(key, i);
                        if !loaded {
                            stored.fetch_add(1, Ordering::AcqRel);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        threads.into_iter().for_each(|t| t.join().unwrap());

        // Every key is stored by exactly one thread.
        assert_eq!(stored.load(Ordering::Acquire), N);
        assert_eq!(map.len(), N);
    }
}
