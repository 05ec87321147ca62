use crate::guarded_map::{Key, Store, Value, KEY_SPACE, VALUE_RANGE};
use crate::StopSignal;
use log::{debug, warn};
use rand::{rngs::SmallRng, Rng};
use std::fmt;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

/// The fixed identity of a workload task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Reader,
    Writer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Reader => f.write_str("reader"),
            Role::Writer => f.write_str("writer"),
        }
    }
}

/// The final operation count of one task, emitted once when it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskResult {
    pub ops: u64,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Stopping,
    Terminated,
}

/// A reader or writer loop against a shared store.
pub struct WorkloadTask<S> {
    role: Role,
    store: Arc<S>,
    stop: StopSignal,
    rng: SmallRng,
    ops: u64,
    state: TaskState,
}

impl<S: Store> WorkloadTask<S> {
    pub fn new(role: Role, store: Arc<S>, stop: StopSignal, rng: SmallRng) -> Self {
        Self {
            role,
            store,
            stop,
            rng,
            ops: 0,
            state: TaskState::Running,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Performs one operation of this task's role on a uniformly random key.
    pub fn step(&mut self) {
        let key: Key = self.rng.gen_range(0..KEY_SPACE);
        match self.role {
            Role::Reader => {
                let _ = self.store.get(key, &mut self.rng);
            }
            Role::Writer => {
                let value: Value = self.rng.gen_range(0..VALUE_RANGE);
                self.store.set(key, value, &mut self.rng);
            }
        }
        self.ops += 1;
    }

    /// Loops until the stop signal is observed, then sends its result exactly once.
    ///
    /// No operation is started after the signal has been seen.
    pub fn run(mut self, results: SyncSender<TaskResult>) -> TaskState {
        loop {
            match self.state {
                TaskState::Running => {
                    if self.stop.is_raised() {
                        self.state = TaskState::Stopping;
                    } else {
                        self.step();
                    }
                }
                TaskState::Stopping => {
                    let result = TaskResult {
                        ops: self.ops,
                        role: self.role,
                    };
                    debug!("{} stopped after {} ops", self.role, self.ops);
                    if results.send(result).is_err() {
                        warn!("{} result dropped: collector is gone", self.role);
                    }
                    self.state = TaskState::Terminated;
                }
                TaskState::Terminated => return self.state,
            }
        }
    }
}
