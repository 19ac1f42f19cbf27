use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::traits::{BlobBackend, BlobStat, IoContext, Session};

/// A failure the in-memory backend can be told to produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Every `connect` fails.
    Connect,
    /// Writes to the named blob fail.
    Write(String),
    /// Writes to the named blob accept one byte less than requested.
    ShortWrite(String),
    /// Removing the named blob fails.
    Remove(String),
    /// Closing an I/O context fails.
    Close,
}

struct MemoryBlob {
    data: Vec<u8>,
    mtime: DateTime<Utc>,
}

impl MemoryBlob {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            mtime: Utc::now(),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    pools: HashMap<String, HashMap<String, MemoryBlob>>,
    faults: Vec<Fault>,
    live_contexts: usize,
}

impl MemoryState {
    fn has_fault(&self, fault: &Fault) -> bool {
        self.faults.contains(fault)
    }
}

/// In-memory, HashMap-based blob backend.
///
/// Intended for tests and embedding. Clones share the same pools, so a test
/// can keep a handle and inspect or tamper with blobs while a store uses
/// another.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryBackend {
    /// Create a new backend with no pools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new backend with one empty pool.
    pub fn with_pool(pool: &str) -> Self {
        let backend = Self::new();
        backend
            .state
            .write()
            .expect("lock poisoned")
            .pools
            .insert(pool.to_string(), HashMap::new());
        backend
    }

    /// Returns `true` if the pool exists.
    pub fn has_pool(&self, pool: &str) -> bool {
        self.state
            .read()
            .expect("lock poisoned")
            .pools
            .contains_key(pool)
    }

    /// Copy of a blob's bytes, if present.
    pub fn blob(&self, pool: &str, oid: &str) -> Option<Vec<u8>> {
        let state = self.state.read().expect("lock poisoned");
        state
            .pools
            .get(pool)
            .and_then(|blobs| blobs.get(oid))
            .map(|blob| blob.data.clone())
    }

    /// Store a blob directly, bypassing any I/O context.
    pub fn put_blob(&self, pool: &str, oid: &str, data: &[u8]) {
        let mut state = self.state.write().expect("lock poisoned");
        let blobs = state.pools.entry(pool.to_string()).or_default();
        blobs.insert(
            oid.to_string(),
            MemoryBlob {
                data: data.to_vec(),
                mtime: Utc::now(),
            },
        );
    }

    /// Remove a blob directly. Returns `true` if it existed.
    pub fn remove_blob(&self, pool: &str, oid: &str) -> bool {
        let mut state = self.state.write().expect("lock poisoned");
        state
            .pools
            .get_mut(pool)
            .map(|blobs| blobs.remove(oid).is_some())
            .unwrap_or(false)
    }

    /// Flip every bit of the byte at `offset`. Returns `false` if the blob or
    /// offset does not exist.
    pub fn corrupt(&self, pool: &str, oid: &str, offset: usize) -> bool {
        let mut state = self.state.write().expect("lock poisoned");
        match state
            .pools
            .get_mut(pool)
            .and_then(|blobs| blobs.get_mut(oid))
            .and_then(|blob| blob.data.get_mut(offset))
        {
            Some(byte) => {
                *byte ^= 0xFF;
                true
            }
            None => false,
        }
    }

    /// Sorted names of all blobs in a pool.
    pub fn blob_names(&self, pool: &str) -> Vec<String> {
        let state = self.state.read().expect("lock poisoned");
        let mut names: Vec<String> = state
            .pools
            .get(pool)
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Number of blobs in a pool.
    pub fn blob_count(&self, pool: &str) -> usize {
        let state = self.state.read().expect("lock poisoned");
        state.pools.get(pool).map(|blobs| blobs.len()).unwrap_or(0)
    }

    /// Start producing the given failure.
    pub fn inject(&self, fault: Fault) {
        self.state.write().expect("lock poisoned").faults.push(fault);
    }

    /// Stop producing all injected failures.
    pub fn clear_faults(&self) {
        self.state.write().expect("lock poisoned").faults.clear();
    }

    /// Number of I/O contexts opened and not yet closed.
    pub fn live_contexts(&self) -> usize {
        self.state.read().expect("lock poisoned").live_contexts
    }
}

impl BlobBackend for InMemoryBackend {
    fn connect(&self) -> BackendResult<Box<dyn Session>> {
        if self.state.read().expect("lock poisoned").has_fault(&Fault::Connect) {
            return Err(BackendError::Fault("connect".into()));
        }
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("lock poisoned");
        f.debug_struct("InMemoryBackend")
            .field("pool_count", &state.pools.len())
            .field("live_contexts", &state.live_contexts)
            .finish()
    }
}

struct MemorySession {
    state: Arc<RwLock<MemoryState>>,
}

impl Session for MemorySession {
    fn pool_exists(&self, pool: &str) -> BackendResult<bool> {
        let state = self.state.read().expect("lock poisoned");
        Ok(state.pools.contains_key(pool))
    }

    fn create_pool(&self, pool: &str) -> BackendResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.pools.entry(pool.to_string()).or_default();
        debug!(pool, "pool created");
        Ok(())
    }

    fn open_context(&self, pool: &str) -> BackendResult<Box<dyn IoContext>> {
        let mut state = self.state.write().expect("lock poisoned");
        if !state.pools.contains_key(pool) {
            return Err(BackendError::PoolNotFound(pool.to_string()));
        }
        state.live_contexts += 1;
        Ok(Box::new(MemoryContext {
            state: Arc::clone(&self.state),
            pool: pool.to_string(),
        }))
    }

    fn shutdown(self: Box<Self>) -> BackendResult<()> {
        Ok(())
    }
}

struct MemoryContext {
    state: Arc<RwLock<MemoryState>>,
    pool: String,
}

impl MemoryContext {
    fn missing_pool(&self) -> BackendError {
        BackendError::PoolNotFound(self.pool.clone())
    }
}

impl IoContext for MemoryContext {
    fn pool(&self) -> &str {
        &self.pool
    }

    fn stat(&self, oid: &str) -> BackendResult<Option<BlobStat>> {
        let state = self.state.read().expect("lock poisoned");
        let blobs = state.pools.get(&self.pool).ok_or_else(|| self.missing_pool())?;
        Ok(blobs.get(oid).map(|blob| BlobStat {
            size: blob.data.len() as u64,
            mtime: Some(blob.mtime),
        }))
    }

    fn read(&self, oid: &str, count: usize, offset: u64) -> BackendResult<Vec<u8>> {
        let state = self.state.read().expect("lock poisoned");
        let blobs = state.pools.get(&self.pool).ok_or_else(|| self.missing_pool())?;
        let blob = blobs
            .get(oid)
            .ok_or_else(|| BackendError::BlobNotFound(oid.to_string()))?;
        let len = blob.data.len();
        let start = (offset as usize).min(len);
        let end = start.saturating_add(count).min(len);
        Ok(blob.data[start..end].to_vec())
    }

    fn write(&self, oid: &str, data: &[u8], offset: u64) -> BackendResult<usize> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.has_fault(&Fault::Write(oid.to_string())) {
            return Err(BackendError::Fault(format!("write {oid}")));
        }
        let accepted = if state.has_fault(&Fault::ShortWrite(oid.to_string())) {
            data.len().saturating_sub(1)
        } else {
            data.len()
        };
        let blobs = state
            .pools
            .get_mut(&self.pool)
            .ok_or_else(|| BackendError::PoolNotFound(self.pool.clone()))?;
        let blob = blobs.entry(oid.to_string()).or_insert_with(MemoryBlob::new);
        let start = offset as usize;
        let end = start + accepted;
        if blob.data.len() < end {
            blob.data.resize(end, 0);
        }
        blob.data[start..end].copy_from_slice(&data[..accepted]);
        blob.mtime = Utc::now();
        Ok(accepted)
    }

    fn truncate(&self, oid: &str, size: u64) -> BackendResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let blobs = state
            .pools
            .get_mut(&self.pool)
            .ok_or_else(|| BackendError::PoolNotFound(self.pool.clone()))?;
        let blob = blobs.entry(oid.to_string()).or_insert_with(MemoryBlob::new);
        blob.data.resize(size as usize, 0);
        blob.mtime = Utc::now();
        Ok(())
    }

    fn remove(&self, oid: &str) -> BackendResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.has_fault(&Fault::Remove(oid.to_string())) {
            return Err(BackendError::Fault(format!("remove {oid}")));
        }
        let blobs = state
            .pools
            .get_mut(&self.pool)
            .ok_or_else(|| BackendError::PoolNotFound(self.pool.clone()))?;
        match blobs.remove(oid) {
            Some(_) => Ok(()),
            None => Err(BackendError::BlobNotFound(oid.to_string())),
        }
    }

    fn close(self: Box<Self>) -> BackendResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.live_contexts = state.live_contexts.saturating_sub(1);
        if state.has_fault(&Fault::Close) {
            return Err(BackendError::Fault(format!("close context on {}", self.pool)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(backend: &InMemoryBackend, pool: &str) -> Box<dyn IoContext> {
        let session = backend.connect().unwrap();
        session.open_context(pool).unwrap()
    }

    // -----------------------------------------------------------------------
    // Pools
    // -----------------------------------------------------------------------

    #[test]
    fn create_pool_is_idempotent() {
        let backend = InMemoryBackend::new();
        let session = backend.connect().unwrap();
        assert!(!session.pool_exists("p").unwrap());
        session.create_pool("p").unwrap();
        session.create_pool("p").unwrap();
        assert!(session.pool_exists("p").unwrap());
        assert!(backend.has_pool("p"));
    }

    #[test]
    fn open_context_on_missing_pool_fails() {
        let backend = InMemoryBackend::new();
        let session = backend.connect().unwrap();
        let err = session.open_context("missing").err().unwrap();
        assert!(matches!(err, BackendError::PoolNotFound(_)));
        assert_eq!(backend.live_contexts(), 0);
    }

    // -----------------------------------------------------------------------
    // Blob primitives
    // -----------------------------------------------------------------------

    #[test]
    fn write_then_read_at_offsets() {
        let backend = InMemoryBackend::with_pool("p");
        let ctx = open(&backend, "p");
        assert_eq!(ctx.write("a", b"hello", 0).unwrap(), 5);
        assert_eq!(ctx.write("a", b" world", 5).unwrap(), 6);

        assert_eq!(ctx.read("a", 5, 0).unwrap(), b"hello");
        assert_eq!(ctx.read("a", 100, 6).unwrap(), b"world");
        assert!(ctx.read("a", 10, 50).unwrap().is_empty());
        assert_eq!(ctx.stat("a").unwrap().unwrap().size, 11);
        ctx.close().unwrap();
    }

    #[test]
    fn write_past_end_zero_fills() {
        let backend = InMemoryBackend::with_pool("p");
        let ctx = open(&backend, "p");
        ctx.write("a", b"x", 3).unwrap();
        assert_eq!(backend.blob("p", "a").unwrap(), vec![0, 0, 0, b'x']);
        ctx.close().unwrap();
    }

    #[test]
    fn stat_missing_blob_is_none() {
        let backend = InMemoryBackend::with_pool("p");
        let ctx = open(&backend, "p");
        assert!(ctx.stat("nope").unwrap().is_none());
        ctx.close().unwrap();
    }

    #[test]
    fn truncate_shrinks_and_creates() {
        let backend = InMemoryBackend::with_pool("p");
        let ctx = open(&backend, "p");
        ctx.write("a", b"abcdef", 0).unwrap();
        ctx.truncate("a", 2).unwrap();
        assert_eq!(backend.blob("p", "a").unwrap(), b"ab");
        ctx.truncate("b", 0).unwrap();
        assert_eq!(ctx.stat("b").unwrap().unwrap().size, 0);
        ctx.close().unwrap();
    }

    #[test]
    fn remove_missing_blob_fails() {
        let backend = InMemoryBackend::with_pool("p");
        let ctx = open(&backend, "p");
        ctx.write("a", b"1", 0).unwrap();
        ctx.remove("a").unwrap();
        let err = ctx.remove("a").unwrap_err();
        assert!(matches!(err, BackendError::BlobNotFound(_)));
        ctx.close().unwrap();
    }

    // -----------------------------------------------------------------------
    // Test hooks
    // -----------------------------------------------------------------------

    #[test]
    fn corrupt_flips_one_byte() {
        let backend = InMemoryBackend::new();
        backend.put_blob("p", "a", &[0x0F, 0x00]);
        assert!(backend.corrupt("p", "a", 1));
        assert_eq!(backend.blob("p", "a").unwrap(), vec![0x0F, 0xFF]);
        assert!(!backend.corrupt("p", "a", 2));
        assert!(!backend.corrupt("p", "b", 0));
    }

    #[test]
    fn blob_names_are_sorted() {
        let backend = InMemoryBackend::new();
        backend.put_blob("p", "b", b"");
        backend.put_blob("p", "a", b"");
        assert_eq!(backend.blob_names("p"), vec!["a", "b"]);
        assert_eq!(backend.blob_count("p"), 2);
        assert!(backend.remove_blob("p", "a"));
        assert!(!backend.remove_blob("p", "a"));
        assert_eq!(backend.blob_count("missing"), 0);
    }

    #[test]
    fn injected_faults() {
        let backend = InMemoryBackend::with_pool("p");
        backend.inject(Fault::ShortWrite("a".into()));
        backend.inject(Fault::Write("b".into()));
        let ctx = open(&backend, "p");
        assert_eq!(ctx.write("a", b"abc", 0).unwrap(), 2);
        assert!(matches!(
            ctx.write("b", b"abc", 0).unwrap_err(),
            BackendError::Fault(_)
        ));
        ctx.close().unwrap();

        backend.inject(Fault::Connect);
        assert!(backend.connect().is_err());
        backend.clear_faults();
        assert!(backend.connect().is_ok());
    }

    #[test]
    fn live_contexts_tracks_close() {
        let backend = InMemoryBackend::with_pool("p");
        let a = open(&backend, "p");
        let b = open(&backend, "p");
        assert_eq!(backend.live_contexts(), 2);
        a.close().unwrap();
        backend.inject(Fault::Close);
        assert!(b.close().is_err());
        assert_eq!(backend.live_contexts(), 0);
    }

    #[test]
    fn clones_share_state() {
        let backend = InMemoryBackend::with_pool("p");
        let other = backend.clone();
        other.put_blob("p", "x", b"shared");
        assert_eq!(backend.blob("p", "x").unwrap(), b"shared");
    }

    #[test]
    fn debug_format() {
        let backend = InMemoryBackend::with_pool("p");
        let debug = format!("{backend:?}");
        assert!(debug.contains("InMemoryBackend"));
        assert!(debug.contains("pool_count"));
    }
}
