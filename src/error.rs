use crate::Role;
use thiserror::Error;

/// A simulation configuration that cannot be run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{role} count must not be negative, got {count}")]
    NegativeCount { role: Role, count: i64 },

    #[error("at least one reader or writer is required")]
    NoTasks,

    #[error("run duration must be positive")]
    ZeroDuration,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("unknown strategy {0:?}")]
    UnknownStrategy(String),

    #[error("failed to spawn workload task: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("{count} workload task(s) panicked")]
    TaskPanicked { count: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
