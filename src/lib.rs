use std::fmt::Display;

use thiserror::Error;

pub mod pool;
pub mod queue;

/// Wrapper type for `std::io::Error`
#[derive(Debug, Error)]
pub struct IoError(std::io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl Eq for IoError {}
impl Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError(err)
    }
}

/// Error type for all primitives
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("BoundedQueue slot count must be greater than 0")]
    NoSlots,
    #[error("WorkerPool worker count must be greater than 0")]
    NoWorkers,
    #[error("Pool is shutting down, no new tasks accepted")]
    Rejected,
    #[error("Queue closed, nothing left to wait for")]
    Closed,
    #[error("Queue full, cannot push until a slot frees")]
    Full,
    #[error("Nothing to pop, no pending tasks")]
    Empty,
    #[error("Failed to spawn a worker thread {:?}", err)]
    Io {
        #[from]
        err: IoError,
    },
}
