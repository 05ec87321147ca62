//! A micro-benchmark harness measuring what concurrent-access strategies cost a shared map.
//!
//! # Overview
//! `lockbench` runs a configurable number of reader and writer threads against one
//! shared integer map for a fixed wall-clock duration, stops them all with a broadcast
//! signal, and reports reads/sec and writes/sec. Running it once per locking strategy
//! shows how the strategies compare.
//!
//! # Strategies
//! - [`ExclusiveLock`]: one futex mutex, readers serialize with everyone
//! - [`SharedReadLock`]: a futex reader-writer lock, readers run in parallel
//! - [`LockFreeMap`]: an internally synchronized [`ConcurrentMap`], no caller-visible lock
//! - `Unsynchronized`: no locking at all, behind the `hazardous` feature
//!
//! # Examples
//! ```
//! use lockbench::{Comparison, Latency, SimulationConfig, Strategy};
//! use std::time::Duration;
//!
//! let config = SimulationConfig::new(8, 2, Duration::from_millis(50))
//!     .unwrap()
//!     .with_latency(Latency::NONE);
//!
//! let exclusive = lockbench::run(&config, Strategy::Exclusive).unwrap();
//! let shared = lockbench::run(&config, Strategy::SharedRead).unwrap();
//! println!("{exclusive}\n{shared}");
//! println!("{}", Comparison::new(&exclusive, &shared));
//! ```
mod concurrent_map;
mod error;
mod futex;
mod guarded_map;
mod report;
mod signal;
mod simulation;
mod strategy;
mod task;

pub use concurrent_map::*;
pub use error::*;
pub use guarded_map::*;
pub use report::*;
pub use signal::*;
pub use simulation::*;
pub use strategy::{ExclusiveLock, LockStrategy, SharedReadLock};
#[cfg(feature = "hazardous")]
pub use strategy::Unsynchronized;
pub use task::*;
