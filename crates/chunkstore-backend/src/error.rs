/// Errors reported by a blob backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached, or a session could not be torn down.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The named pool does not exist.
    #[error("pool not found: {0}")]
    PoolNotFound(String),

    /// The named pool could not be created.
    #[error("could not create pool {pool}: {reason}")]
    PoolCreate { pool: String, reason: String },

    /// The named blob does not exist in the pool.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// The blob name cannot be represented by this backend.
    #[error("invalid blob name: {0:?}")]
    InvalidName(String),

    /// I/O error from the underlying storage medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure injected through the in-memory backend's fault hooks.
    #[error("injected fault: {0}")]
    Fault(String),
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
