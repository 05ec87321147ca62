// Modified from https://github.com/rust-lang/rust/blob/master/library/std/src/sys/sync/mutex/futex.rs
// and https://github.com/rust-lang/rust/blob/master/library/std/src/sys/sync/rwlock/futex.rs
use std::sync::atomic::{
    AtomicU32,
    Ordering::{Acquire, Relaxed, Release},
};

/// A raw futex mutex. It guards no data; callers pair `lock` and `unlock` themselves.
pub struct Mutex {
    futex: AtomicU32,
}

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1; // locked, no other threads waiting
const CONTENDED: u32 = 2; // locked, and other threads waiting (contended)

impl Mutex {
    #[inline]
    pub const fn new() -> Self {
        Self {
            futex: AtomicU32::new(UNLOCKED),
        }
    }

    #[inline]
    pub fn try_lock(&self) -> bool {
        self.futex
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn lock(&self) {
        if !self.try_lock() {
            self.lock_contended();
        }
    }

    #[cold]
    fn lock_contended(&self) {
        // Spin first, the holder is often about to release.
        let mut state = self.spin();

        if state == UNLOCKED {
            match self
                .futex
                .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            {
                Ok(_) => return,
                Err(s) => state = s,
            }
        }

        loop {
            // Mark as contended, skipping the write when it already is.
            if state != CONTENDED && self.futex.swap(CONTENDED, Acquire) == UNLOCKED {
                return;
            }

            atomic_wait::wait(&self.futex, CONTENDED);

            state = self.spin();
        }
    }

    fn spin(&self) -> u32 {
        let mut spin = 100;
        loop {
            let state = self.futex.load(Relaxed);
            if state != LOCKED || spin == 0 {
                return state;
            }

            std::hint::spin_loop();
            spin -= 1;
        }
    }

    /// Releases the mutex.
    ///
    /// Panics if the mutex is not locked.
    #[inline]
    pub fn unlock(&self) {
        match self.futex.swap(UNLOCKED, Release) {
            UNLOCKED => panic!("impossible: unlock an unlocked mutex!"),
            // Wake one waiter; it re-marks the lock CONTENDED so the rest follow.
            CONTENDED => atomic_wait::wake_one(&self.futex),
            _ => {}
        }
    }
}

/// A raw futex reader-writer lock.
///
/// `state` holds twice the reader count, plus one while a writer is waiting.
/// `u32::MAX` means write locked. A waiting writer keeps new readers out, so a
/// storm of readers cannot starve writers.
pub struct RwLock {
    state: AtomicU32,
    writer_wake_counter: AtomicU32,
}

const WRITE_LOCKED: u32 = u32::MAX;

impl RwLock {
    #[inline]
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
            writer_wake_counter: AtomicU32::new(0),
        }
    }

    pub fn read(&self) {
        let mut state = self.state.load(Relaxed);
        loop {
            if state % 2 == 0 {
                assert!(state < WRITE_LOCKED - 2, "too many readers");
                match self
                    .state
                    .compare_exchange_weak(state, state + 2, Acquire, Relaxed)
                {
                    Ok(_) => return,
                    Err(s) => state = s,
                }
            }
            if state % 2 == 1 {
                atomic_wait::wait(&self.state, state);
                state = self.state.load(Relaxed);
            }
        }
    }

    pub fn try_write(&self) -> bool {
        self.state
            .compare_exchange(0, WRITE_LOCKED, Acquire, Relaxed)
            .is_ok()
    }

    pub fn write(&self) {
        if self.try_write() {
            return;
        }

        let mut state = self.state.load(Relaxed);
        loop {
            if state <= 1 {
                match self
                    .state
                    .compare_exchange(state, WRITE_LOCKED, Acquire, Relaxed)
                {
                    Ok(_) => return,
                    Err(s) => {
                        state = s;
                        continue;
                    }
                }
            }

            // Block new readers.
            if state % 2 == 0 {
                if let Err(s) = self
                    .state
                    .compare_exchange(state, state + 1, Relaxed, Relaxed)
                {
                    state = s;
                    continue;
                }
            }

            let wake_counter = self.writer_wake_counter.load(Acquire);
            state = self.state.load(Relaxed);
            if state >= 2 {
                atomic_wait::wait(&self.writer_wake_counter, wake_counter);
                state = self.state.load(Relaxed);
            }
        }
    }

    /// Releases one shared hold.
    ///
    /// Panics if the lock has no reader.
    pub fn read_unlock(&self) {
        let state = self.state.fetch_sub(2, Release);
        if state < 2 || state == WRITE_LOCKED {
            panic!("impossible: read unlock without a reader!");
        }
        // Last reader out with a writer waiting.
        if state == 3 {
            self.writer_wake_counter.fetch_add(1, Release);
            atomic_wait::wake_one(&self.writer_wake_counter);
        }
    }

    /// Releases the exclusive hold.
    ///
    /// Panics if the lock is not write locked.
    pub fn write_unlock(&self) {
        if self.state.swap(0, Release) != WRITE_LOCKED {
            panic!("impossible: write unlock without a writer!");
        }
        self.writer_wake_counter.fetch_add(1, Release);
        atomic_wait::wake_one(&self.writer_wake_counter);
        atomic_wait::wake_all(&self.state);
    }
}
