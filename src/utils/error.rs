use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown workload: {0}")]
    UnknownWorkload(String),

    #[error("Failed to spawn execution unit {unit}: {reason}")]
    Spawn { unit: usize, reason: String },

    #[error("Execution unit failed: {0}")]
    Unit(String),

    #[error("Failed to persist results: {0}")]
    Persist(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Rejection of a response by a workload.
///
/// Surfaces inside a virtual client only; it is folded into the
/// `error_abort` flag and never returned from a run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkloadError {
    #[error("unexpected response length: expected {expected}, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("malformed response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, BenchError>;
