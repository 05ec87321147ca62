use crate::strategy::{ExclusiveGuard, LockStrategy, SharedGuard};
use crate::ConcurrentMap;
use foldhash::fast::RandomState;
use rand::Rng;
use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::time::Duration;

pub type Key = u32;
pub type Value = i64;

/// Keys are drawn from `[0, KEY_SPACE)`.
pub const KEY_SPACE: Key = 20;
/// Written values are drawn from `[0, VALUE_RANGE)`.
pub const VALUE_RANGE: Value = 100;

/// Upper bounds of the artificial delay injected into each operation.
///
/// The delay of one operation is uniform in `[0, bound)`; a zero bound disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latency {
    pub read: Duration,
    pub write: Duration,
}

impl Latency {
    pub const NONE: Latency = Latency {
        read: Duration::ZERO,
        write: Duration::ZERO,
    };

    pub fn from_millis(read: u64, write: u64) -> Self {
        Self {
            read: Duration::from_millis(read),
            write: Duration::from_millis(write),
        }
    }

    fn pause<R: Rng + ?Sized>(bound: Duration, rng: &mut R) {
        let bound = bound.as_nanos() as u64;
        if bound > 0 {
            std::thread::sleep(Duration::from_nanos(rng.gen_range(0..bound)));
        }
    }
}

impl Default for Latency {
    /// Writes cost more than reads.
    fn default() -> Self {
        Self::from_millis(10, 50)
    }
}

/// A shared integer map that workload tasks operate on.
///
/// `rng` feeds the latency sampling so runs stay reproducible.
pub trait Store: Send + Sync {
    fn get<R: Rng + ?Sized>(&self, key: Key, rng: &mut R) -> Option<Value>;

    fn set<R: Rng + ?Sized>(&self, key: Key, value: Value, rng: &mut R);
}

/// A map whose every access goes through one bound [`LockStrategy`].
///
/// # Examples
/// ```
/// use lockbench::{GuardedMap, Latency, SharedReadLock};
/// use rand::{rngs::SmallRng, SeedableRng};
///
/// let map = GuardedMap::new(SharedReadLock::new(), Latency::NONE);
/// let mut rng = SmallRng::seed_from_u64(0);
/// map.set(42, 100, &mut rng);
/// assert_eq!(map.get(42, &mut rng), Some(100));
/// assert_eq!(map.get(7, &mut rng), None);
/// ```
pub struct GuardedMap<L> {
    items: UnsafeCell<HashMap<Key, Value, RandomState>>,
    lock: L,
    latency: Latency,
}

// Safety: `items` is only touched while holding `lock`, whose contract provides the
// exclusion a `Sync` map needs.
unsafe impl<L: LockStrategy> Sync for GuardedMap<L> {}

impl<L: LockStrategy> GuardedMap<L> {
    pub fn new(lock: L, latency: Latency) -> Self {
        Self {
            items: UnsafeCell::new(HashMap::with_capacity_and_hasher(
                KEY_SPACE as usize,
                RandomState::default(),
            )),
            lock,
            latency,
        }
    }

    /// Looks up `key` under shared access, after the sampled read delay.
    pub fn get<R: Rng + ?Sized>(&self, key: Key, rng: &mut R) -> Option<Value> {
        let _guard = SharedGuard::acquire(&self.lock);
        Latency::pause(self.latency.read, rng);
        unsafe { (*self.items.get()).get(&key).copied() }
    }

    /// Writes `value` under exclusive access, after the sampled write delay.
    pub fn set<R: Rng + ?Sized>(&self, key: Key, value: Value, rng: &mut R) {
        let _guard = ExclusiveGuard::acquire(&self.lock);
        Latency::pause(self.latency.write, rng);
        unsafe {
            (*self.items.get()).insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        let _guard = SharedGuard::acquire(&self.lock);
        unsafe { (*self.items.get()).len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies out every entry, sorted by key.
    pub fn snapshot(&self) -> Vec<(Key, Value)> {
        let mut entries = {
            let _guard = SharedGuard::acquire(&self.lock);
            unsafe { (*self.items.get()).iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>() }
        };
        entries.sort_unstable();
        entries
    }

    pub fn latency(&self) -> Latency {
        self.latency
    }
}

impl<L: LockStrategy> Store for GuardedMap<L> {
    fn get<R: Rng + ?Sized>(&self, key: Key, rng: &mut R) -> Option<Value> {
        GuardedMap::get(self, key, rng)
    }

    fn set<R: Rng + ?Sized>(&self, key: Key, value: Value, rng: &mut R) {
        GuardedMap::set(self, key, value, rng)
    }
}

/// The lock-free strategy: a [`ConcurrentMap`] with no caller-visible lock.
///
/// The artificial delay runs before the operation, as there is no critical
/// section to hold it in.
pub struct LockFreeMap {
    items: ConcurrentMap<Key, Value>,
    latency: Latency,
}

impl LockFreeMap {
    pub fn new(latency: Latency) -> Self {
        Self {
            items: ConcurrentMap::new(),
            latency,
        }
    }

    pub fn items(&self) -> &ConcurrentMap<Key, Value> {
        &self.items
    }
}

impl Store for LockFreeMap {
    fn get<R: Rng + ?Sized>(&self, key: Key, rng: &mut R) -> Option<Value> {
        Latency::pause(self.latency.read, rng);
        self.items.load(&key)
    }

    fn set<R: Rng + ?Sized>(&self, key: Key, value: Value, rng: &mut R) {
        Latency::pause(self.latency.write, rng);
        self.items.store(key, value);
    }
}
