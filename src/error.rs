use thiserror::Error;

/// Errors the engine surfaces to its caller. Persistent-cache failures never appear here: the
/// cache logs them and degrades to a miss.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("analytics worker is not running")]
    WorkerUnavailable,
    #[error("analytics computation failed: {0}")]
    ComputeFailed(String),
    #[error("cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// Error code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::WorkerUnavailable => "worker_unavailable",
            EngineError::ComputeFailed(_) => "compute_failed",
            EngineError::Storage(_) | EngineError::Join(_) => "cache_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
