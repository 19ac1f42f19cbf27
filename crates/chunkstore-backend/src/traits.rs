use chrono::{DateTime, Utc};

use crate::error::BackendResult;

/// Size and modification time of a single blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobStat {
    /// Length of the blob in bytes.
    pub size: u64,
    /// Last modification time, if the backend tracks one.
    pub mtime: Option<DateTime<Utc>>,
}

impl BlobStat {
    /// Stat of a blob that has not been written yet.
    pub fn empty() -> Self {
        Self {
            size: 0,
            mtime: None,
        }
    }
}

/// Entry point to a remote blob service.
///
/// A backend hands out independent [`Session`]s. Each session is expected to
/// be short-lived: opened for one stream, then shut down again.
pub trait BlobBackend: Send + Sync {
    /// Connect to the backend.
    fn connect(&self) -> BackendResult<Box<dyn Session>>;
}

/// A connected session with pool management.
pub trait Session: Send {
    /// Returns `true` if the pool exists.
    fn pool_exists(&self, pool: &str) -> BackendResult<bool>;

    /// Create a pool. Creating a pool that already exists is not an error.
    fn create_pool(&self, pool: &str) -> BackendResult<()>;

    /// Open an I/O context bound to one pool.
    ///
    /// Fails with `PoolNotFound` if the pool does not exist.
    fn open_context(&self, pool: &str) -> BackendResult<Box<dyn IoContext>>;

    /// Tear the session down.
    fn shutdown(self: Box<Self>) -> BackendResult<()>;
}

/// Blob primitives scoped to a single pool.
///
/// All implementations must satisfy these invariants:
/// - Each call is atomic with respect to the addressed blob.
/// - `write` and `truncate` create the blob if it does not exist.
/// - `read` never returns bytes beyond the blob's current size.
pub trait IoContext: Send {
    /// The pool this context is bound to.
    fn pool(&self) -> &str;

    /// Stat a blob. Returns `Ok(None)` if it does not exist.
    fn stat(&self, oid: &str) -> BackendResult<Option<BlobStat>>;

    /// Read up to `count` bytes starting at `offset`.
    fn read(&self, oid: &str, count: usize, offset: u64) -> BackendResult<Vec<u8>>;

    /// Write `data` at `offset`, returning the number of bytes the backend
    /// accepted.
    fn write(&self, oid: &str, data: &[u8], offset: u64) -> BackendResult<usize>;

    /// Set the blob's length to `size`, discarding or zero-filling as needed.
    fn truncate(&self, oid: &str, size: u64) -> BackendResult<()>;

    /// Remove a blob. Fails with `BlobNotFound` if it does not exist.
    fn remove(&self, oid: &str) -> BackendResult<()>;

    /// Release the context.
    fn close(self: Box<Self>) -> BackendResult<()>;
}
