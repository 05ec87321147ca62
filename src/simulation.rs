use crate::error::{ConfigError, Error, Result};
use crate::guarded_map::{GuardedMap, Latency, LockFreeMap, Store};
use crate::report::{Report, Throughput};
use crate::strategy::{ExclusiveLock, SharedReadLock};
use crate::task::{Role, TaskResult, WorkloadTask};
use crate::StopSignal;
use log::{debug, info, warn};
use rand::{rngs::SmallRng, SeedableRng};
use std::fmt;
use std::str::FromStr;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Parameters of one timed run, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    readers: usize,
    writers: usize,
    duration: Duration,
    latency: Latency,
    seed: u64,
}

impl SimulationConfig {
    /// Creates a config with the default latency and seed zero.
    ///
    /// One role may have no tasks, but not both.
    pub fn new(readers: usize, writers: usize, duration: Duration) -> Result<Self> {
        let config = Self {
            readers,
            writers,
            duration,
            latency: Latency::default(),
            seed: 0,
        };
        config.validate()?;
        Ok(config)
    }

    /// Like [`SimulationConfig::new`], rejecting negative counts.
    pub fn from_signed(readers: i64, writers: i64, duration: Duration) -> Result<Self> {
        Self::new(
            non_negative(Role::Reader, readers)?,
            non_negative(Role::Writer, writers)?,
            duration,
        )
    }

    pub fn with_latency(mut self, latency: Latency) -> Self {
        self.latency = latency;
        self
    }

    /// Task `i` draws from a generator seeded with `seed + i`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn readers(&self) -> usize {
        self.readers
    }

    pub fn writers(&self) -> usize {
        self.writers
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn latency(&self) -> Latency {
        self.latency
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn total_tasks(&self) -> usize {
        self.readers + self.writers
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.total_tasks() == 0 {
            return Err(ConfigError::NoTasks);
        }
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(())
    }

    fn roles(&self) -> impl Iterator<Item = Role> {
        std::iter::repeat(Role::Reader)
            .take(self.readers)
            .chain(std::iter::repeat(Role::Writer).take(self.writers))
    }
}

fn non_negative(role: Role, count: i64) -> std::result::Result<usize, ConfigError> {
    usize::try_from(count).map_err(|_| ConfigError::NegativeCount { role, count })
}

/// Parameters of a batch run, where every task performs exactly one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    readers: usize,
    writers: usize,
    latency: Latency,
    seed: u64,
}

impl BatchConfig {
    pub fn new(readers: usize, writers: usize) -> Result<Self> {
        if readers + writers == 0 {
            return Err(ConfigError::NoTasks.into());
        }
        Ok(Self {
            readers,
            writers,
            latency: Latency::default(),
            seed: 0,
        })
    }

    pub fn from_signed(readers: i64, writers: i64) -> Result<Self> {
        Self::new(
            non_negative(Role::Reader, readers)?,
            non_negative(Role::Writer, writers)?,
        )
    }

    pub fn with_latency(mut self, latency: Latency) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn readers(&self) -> usize {
        self.readers
    }

    pub fn writers(&self) -> usize {
        self.writers
    }
}

/// The locking strategy a run's map is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Readers and writers all take one mutex.
    Exclusive,
    /// Readers share a reader-writer lock, writers take it exclusively.
    SharedRead,
    /// An internally synchronized map with no caller-visible lock.
    LockFree,
    /// No locking at all. Races with concurrent writers.
    #[cfg(feature = "hazardous")]
    Unsynchronized,
}

impl Strategy {
    /// The strategies that are safe to run concurrently.
    pub const SAFE: [Strategy; 3] = [
        Strategy::Exclusive,
        Strategy::SharedRead,
        Strategy::LockFree,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Exclusive => "exclusive",
            Strategy::SharedRead => "shared-read",
            Strategy::LockFree => "lock-free",
            #[cfg(feature = "hazardous")]
            Strategy::Unsynchronized => "unsynchronized",
        }
    }

    /// Builds a fresh store for this strategy and hands it to `workload`.
    fn dispatch<W: Workload>(self, latency: Latency, workload: W) -> Result<W::Output> {
        match self {
            Strategy::Exclusive => {
                workload.on(Arc::new(GuardedMap::new(ExclusiveLock::new(), latency)))
            }
            Strategy::SharedRead => {
                workload.on(Arc::new(GuardedMap::new(SharedReadLock::new(), latency)))
            }
            Strategy::LockFree => workload.on(Arc::new(LockFreeMap::new(latency))),
            #[cfg(feature = "hazardous")]
            Strategy::Unsynchronized => {
                warn!("running the unsynchronized strategy: the map will be raced");
                // Safety: deliberately not upheld; the race is what this strategy demonstrates.
                let lock = unsafe { crate::strategy::Unsynchronized::new() };
                workload.on(Arc::new(GuardedMap::new(lock, latency)))
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exclusive" => Ok(Strategy::Exclusive),
            "shared-read" => Ok(Strategy::SharedRead),
            "lock-free" => Ok(Strategy::LockFree),
            #[cfg(feature = "hazardous")]
            "unsynchronized" => Ok(Strategy::Unsynchronized),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

/// Something to do with a freshly built store.
trait Workload {
    type Output;

    fn on<S: Store + 'static>(self, store: Arc<S>) -> Result<Self::Output>;
}

struct Timed<'a>(&'a SimulationConfig);

impl Workload for Timed<'_> {
    type Output = Vec<TaskResult>;

    fn on<S: Store + 'static>(self, store: Arc<S>) -> Result<Self::Output> {
        run_on(self.0, store)
    }
}

struct Batch<'a>(&'a BatchConfig);

impl Workload for Batch<'_> {
    type Output = Duration;

    fn on<S: Store + 'static>(self, store: Arc<S>) -> Result<Self::Output> {
        batch_on(self.0, store)
    }
}

/// Runs a timed simulation of `strategy` on a fresh map.
///
/// # Examples
/// ```
/// use lockbench::{Latency, SimulationConfig, Strategy};
/// use std::time::Duration;
///
/// let config = SimulationConfig::new(4, 1, Duration::from_millis(50))
///     .unwrap()
///     .with_latency(Latency::NONE);
/// let report = lockbench::run(&config, Strategy::SharedRead).unwrap();
/// assert_eq!(report.strategy, "shared-read");
/// assert!(report.throughput.total() > 0);
/// ```
pub fn run(config: &SimulationConfig, strategy: Strategy) -> Result<Report> {
    config.validate()?;
    info!(
        "{strategy}: {} readers, {} writers for {:?}",
        config.readers, config.writers, config.duration
    );
    let results = strategy.dispatch(config.latency, Timed(config))?;
    let throughput = Throughput::from_results(&results, config.duration);
    info!(
        "{strategy}: {} reads, {} writes",
        throughput.reads, throughput.writes
    );
    Ok(Report::new(strategy.name(), throughput))
}

/// Runs a timed simulation against `store` and returns one result per task.
///
/// Returns only after every task has stopped and its result has been collected.
pub fn run_on<S: Store + 'static>(
    config: &SimulationConfig,
    store: Arc<S>,
) -> Result<Vec<TaskResult>> {
    config.validate()?;
    let total = config.total_tasks();
    let stop = StopSignal::new();
    // One slot per task, so no task blocks on sending its result.
    let (sender, receiver) = mpsc::sync_channel(total);

    let mut handles = Vec::with_capacity(total);
    for (index, role) in config.roles().enumerate() {
        let rng = SmallRng::seed_from_u64(config.seed.wrapping_add(index as u64));
        let task = WorkloadTask::new(role, store.clone(), stop.clone(), rng);
        let sender = sender.clone();
        let spawned = thread::Builder::new()
            .name(format!("{role}-{index}"))
            .spawn(move || task.run(sender));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                warn!("spawned {} of {total} tasks: {err}", handles.len());
                stop.raise();
                join_all(handles);
                return Err(Error::Spawn(err));
            }
        }
    }
    drop(sender);

    let start = Instant::now();
    thread::sleep(config.duration);
    stop.raise();
    let panicked = join_all(handles);
    debug!("{total} tasks joined after {:?}", start.elapsed());
    if panicked > 0 {
        return Err(Error::TaskPanicked { count: panicked });
    }

    // Every sender has been dropped by now, so draining terminates.
    Ok(receiver.into_iter().collect())
}

/// Runs one operation per task on a fresh map and reports the elapsed wall time
/// as the measured window.
pub fn run_batch(config: &BatchConfig, strategy: Strategy) -> Result<Report> {
    info!(
        "{strategy}: batch of {} reads and {} writes",
        config.readers, config.writers
    );
    let elapsed = strategy.dispatch(config.latency, Batch(config))?;
    info!("{strategy}: batch took {elapsed:?}");
    Ok(Report::new(
        strategy.name(),
        Throughput::new(config.readers as u64, config.writers as u64, elapsed),
    ))
}

/// Runs one operation per task against `store` and returns the elapsed time.
pub fn batch_on<S: Store + 'static>(config: &BatchConfig, store: Arc<S>) -> Result<Duration> {
    let roles = std::iter::repeat(Role::Reader)
        .take(config.readers)
        .chain(std::iter::repeat(Role::Writer).take(config.writers));
    // Nothing raises it: each task stops on its own after one step.
    let stop = StopSignal::new();

    let start = Instant::now();
    let mut handles = Vec::with_capacity(config.readers + config.writers);
    for (index, role) in roles.enumerate() {
        let rng = SmallRng::seed_from_u64(config.seed.wrapping_add(index as u64));
        let mut task = WorkloadTask::new(role, store.clone(), stop.clone(), rng);
        match thread::Builder::new().spawn(move || task.step()) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                warn!("spawned {} batch tasks: {err}", handles.len());
                join_all(handles);
                return Err(Error::Spawn(err));
            }
        }
    }

    let panicked = join_all(handles);
    let elapsed = start.elapsed();
    if panicked > 0 {
        return Err(Error::TaskPanicked { count: panicked });
    }
    Ok(elapsed)
}

/// Joins every handle and returns how many of the threads panicked.
fn join_all<T>(handles: Vec<JoinHandle<T>>) -> usize {
    handles
        .into_iter()
        .map(JoinHandle::join)
        .filter(|joined| joined.is_err())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guarded_map::{Key, Value};
    use rand::Rng;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    fn config(readers: usize, writers: usize, millis: u64) -> SimulationConfig {
        SimulationConfig::new(readers, writers, Duration::from_millis(millis))
            .unwrap()
            .with_latency(Latency::NONE)
    }

    /// Counts every completed operation on the wrapped store.
    struct CountingStore<S> {
        inner: S,
        gets: AtomicU64,
        sets: AtomicU64,
    }

    impl<S: Store> Store for CountingStore<S> {
        fn get<R: Rng + ?Sized>(&self, key: Key, rng: &mut R) -> Option<Value> {
            let value = self.inner.get(key, rng);
            self.gets.fetch_add(1, Ordering::Relaxed);
            value
        }

        fn set<R: Rng + ?Sized>(&self, key: Key, value: Value, rng: &mut R) {
            self.inner.set(key, value, rng);
            self.sets.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remembers the last value written to each key.
    struct RecordingStore<S> {
        inner: S,
        last: Mutex<HashMap<Key, Value>>,
    }

    impl<S: Store> Store for RecordingStore<S> {
        fn get<R: Rng + ?Sized>(&self, key: Key, rng: &mut R) -> Option<Value> {
            self.inner.get(key, rng)
        }

        fn set<R: Rng + ?Sized>(&self, key: Key, value: Value, rng: &mut R) {
            self.inner.set(key, value, rng);
            self.last.lock().unwrap().insert(key, value);
        }
    }

    #[test]
    fn test_config_rejects_invalid() {
        assert!(matches!(
            SimulationConfig::from_signed(-1, 0, Duration::from_secs(1)),
            Err(Error::InvalidConfig(ConfigError::NegativeCount {
                role: Role::Reader,
                count: -1
            }))
        ));
        assert!(matches!(
            SimulationConfig::from_signed(3, -2, Duration::from_secs(1)),
            Err(Error::InvalidConfig(ConfigError::NegativeCount {
                role: Role::Writer,
                count: -2
            }))
        ));
        assert!(matches!(
            SimulationConfig::new(0, 0, Duration::from_secs(1)),
            Err(Error::InvalidConfig(ConfigError::NoTasks))
        ));
        assert!(matches!(
            SimulationConfig::new(1, 1, Duration::ZERO),
            Err(Error::InvalidConfig(ConfigError::ZeroDuration))
        ));
        assert!(matches!(
            BatchConfig::from_signed(0, 0),
            Err(Error::InvalidConfig(ConfigError::NoTasks))
        ));

        let config = SimulationConfig::from_signed(0, 1, Duration::from_secs(1)).unwrap();
        assert_eq!((config.readers(), config.writers()), (0, 1));
        assert_eq!(config.latency(), Latency::default());
        assert_eq!(config.with_seed(9).seed(), 9);
    }

    #[test]
    fn test_strategy_names() {
        for strategy in Strategy::SAFE {
            assert_eq!(strategy.to_string().parse::<Strategy>().unwrap(), strategy);
        }
        assert!(matches!(
            "spinlock".parse::<Strategy>(),
            Err(Error::UnknownStrategy(name)) if name == "spinlock"
        ));
    }

    #[test]
    fn test_run_on_conserves_operations() {
        for strategy in Strategy::SAFE {
            let config = config(4, 2, 100);
            let (results, gets, sets) = match strategy {
                Strategy::Exclusive => {
                    counted(&config, GuardedMap::new(ExclusiveLock::new(), Latency::NONE))
                }
                Strategy::SharedRead => {
                    counted(&config, GuardedMap::new(SharedReadLock::new(), Latency::NONE))
                }
                _ => counted(&config, LockFreeMap::new(Latency::NONE)),
            };

            assert_eq!(results.len(), config.total_tasks());
            assert_eq!(results.iter().filter(|r| r.role == Role::Reader).count(), 4);
            assert_eq!(results.iter().filter(|r| r.role == Role::Writer).count(), 2);

            let throughput = Throughput::from_results(&results, config.duration());
            assert_eq!(throughput.reads, gets);
            assert_eq!(throughput.writes, sets);
            assert_eq!(
                results.iter().map(|r| r.ops).sum::<u64>(),
                throughput.total()
            );
        }
    }

    fn counted<S: Store + 'static>(
        config: &SimulationConfig,
        inner: S,
    ) -> (Vec<TaskResult>, u64, u64) {
        let store = Arc::new(CountingStore {
            inner,
            gets: AtomicU64::default(),
            sets: AtomicU64::default(),
        });
        let results = run_on(config, store.clone()).unwrap();
        (
            results,
            store.gets.load(Ordering::Relaxed),
            store.sets.load(Ordering::Relaxed),
        )
    }

    #[test]
    fn test_run_terminates_after_duration() {
        let duration = Duration::from_millis(200);
        let config = SimulationConfig::new(8, 2, duration).unwrap();
        let start = Instant::now();
        let report = run(&config, Strategy::Exclusive).unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= duration);
        // Bounded by the operations queued on the lock when stop was raised.
        assert!(elapsed < duration + Duration::from_secs(2));
        assert!(report.throughput.total() > 0);
    }

    #[test]
    fn test_single_writer_last_write_wins() {
        let store = Arc::new(RecordingStore {
            inner: GuardedMap::new(SharedReadLock::new(), Latency::NONE),
            last: Mutex::default(),
        });
        let results = run_on(&config(0, 1, 50), store.clone()).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].ops > 0);

        let mut expected = store.last.lock().unwrap().drain().collect::<Vec<_>>();
        expected.sort_unstable();
        assert_eq!(store.inner.snapshot(), expected);

        let mut rng = SmallRng::seed_from_u64(0);
        store.inner.set(42, 100, &mut rng);
        assert_eq!(store.inner.get(42, &mut rng), Some(100));
    }

    #[test]
    fn test_readers_see_seeded_value() {
        /// Fails the reading task on any value other than the seeded one.
        struct SeededStore(GuardedMap<SharedReadLock>);

        impl Store for SeededStore {
            fn get<R: Rng + ?Sized>(&self, key: Key, rng: &mut R) -> Option<Value> {
                let value = self.0.get(key, rng);
                match key {
                    1 => assert_eq!(value, Some(7)),
                    _ => assert_eq!(value, None),
                }
                value
            }

            fn set<R: Rng + ?Sized>(&self, key: Key, value: Value, rng: &mut R) {
                self.0.set(key, value, rng)
            }
        }

        let map = GuardedMap::new(SharedReadLock::new(), Latency::from_millis(1, 0));
        map.set(1, 7, &mut SmallRng::seed_from_u64(0));
        let store = Arc::new(SeededStore(map));

        let results = run_on(&config(5, 0, 200), store.clone()).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.role == Role::Reader && r.ops > 0));
        assert_eq!(store.0.snapshot(), vec![(1, 7)]);
    }

    #[test]
    fn test_run_on_reports_panicked_tasks() {
        struct FailingStore;

        impl Store for FailingStore {
            fn get<R: Rng + ?Sized>(&self, _: Key, _: &mut R) -> Option<Value> {
                None
            }

            fn set<R: Rng + ?Sized>(&self, _: Key, _: Value, _: &mut R) {
                panic!("write refused");
            }
        }

        let err = run_on(&config(2, 3, 20), Arc::new(FailingStore)).unwrap_err();
        assert!(matches!(err, Error::TaskPanicked { count: 3 }));
    }

    #[test]
    fn test_run_every_strategy() {
        let config = config(4, 2, 50);
        for strategy in Strategy::SAFE {
            let report = run(&config, strategy).unwrap();
            assert_eq!(report.strategy, strategy.name());
            assert_eq!(report.throughput.duration, config.duration());
            assert!(report.throughput.reads > 0);
            assert!(report.throughput.writes > 0);
        }
    }

    #[test]
    fn test_run_batch() {
        let config = BatchConfig::new(50, 5).unwrap().with_latency(Latency::NONE);
        for strategy in Strategy::SAFE {
            let report = run_batch(&config, strategy).unwrap();
            assert_eq!(report.throughput.reads, 50);
            assert_eq!(report.throughput.writes, 5);
            assert!(!report.throughput.duration.is_zero());
        }
    }

    #[test]
    fn test_batch_on_runs_every_task_once() {
        let store = Arc::new(CountingStore {
            inner: LockFreeMap::new(Latency::NONE),
            gets: AtomicU64::default(),
            sets: AtomicU64::default(),
        });
        let config = BatchConfig::new(30, 10).unwrap();
        batch_on(&config, store.clone()).unwrap();
        assert_eq!(store.gets.load(Ordering::Relaxed), 30);
        assert_eq!(store.sets.load(Ordering::Relaxed), 10);
    }

    #[test]
    #[ignore = "takes 30 seconds and depends on machine load"]
    fn test_shared_read_outreads_exclusive() {
        let config = SimulationConfig::new(1000, 10, Duration::from_secs(5)).unwrap();
        let wins = (0..3)
            .filter(|_| {
                let exclusive = run(&config, Strategy::Exclusive).unwrap();
                let shared = run(&config, Strategy::SharedRead).unwrap();
                assert!(exclusive.throughput.total() > 0);
                assert!(shared.throughput.total() > 0);
                shared.throughput.reads_per_sec() > exclusive.throughput.reads_per_sec()
            })
            .count();
        assert!(wins >= 2, "shared-read won reads in only {wins} of 3 runs");
    }

    #[cfg(feature = "hazardous")]
    #[test]
    fn test_unsynchronized_single_writer() {
        // One task alone cannot race.
        let report = run(&config(0, 1, 50), Strategy::Unsynchronized).unwrap();
        assert_eq!(report.strategy, "unsynchronized");
        assert!(report.throughput.writes > 0);
    }
}
