use thiserror::Error;

/// Errors returned by point loading, index construction, neighbor finding and clustering.
#[derive(Debug, Error)]
pub enum Error {
    /// Input contains no points.
    #[error("empty input")]
    EmptyInput,

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable explanation.
        message: &'static str,
    },

    /// Points in a dataset have inconsistent dimensionality.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimensionality.
        expected: usize,
        /// Found dimensionality.
        found: usize,
    },

    /// The index cannot hold points of this dimensionality.
    #[error("{index} does not support {dims}-dimensional points")]
    UnsupportedDimension {
        /// Index name.
        index: &'static str,
        /// Dimensionality of the rejected points.
        dims: usize,
    },

    /// A coordinate token could not be parsed as an integer.
    #[error("line {line}: invalid coordinate {token:?}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// The offending token.
        token: String,
    },

    /// Failure reading point input.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The index type does not implement the requested operation.
    #[error("{index} does not support {operation}")]
    UnsupportedOperation {
        /// Index name.
        index: &'static str,
        /// Operation name.
        operation: &'static str,
    },

    /// Clustering was requested before a completed neighbor-finding run.
    #[error("neighbor sets are not populated; run neighbor finding first")]
    NeighborsNotReady,

    /// A worker task failed while a run was in flight.
    #[error("worker {task} failed: {message}")]
    WorkerFailed {
        /// Which task failed.
        task: &'static str,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// A dedicated thread pool could not be created.
    #[error("thread pool: {0}")]
    ThreadPool(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn worker_failed(task: &'static str, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Error::WorkerFailed { task, message }
    }
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
