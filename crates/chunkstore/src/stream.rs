//! Seekable byte streams over single backend blobs.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chunkstore_backend::{BackendError, BlobBackend, BlobStat, IoContext, Session};
use tracing::{debug, warn};

use crate::config::PoolPolicy;
use crate::error::{StoreError, StoreResult};

/// How a blob is opened. Mirrors the modes of a local file handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// `r`: read only. Fails with `NotFound` if the blob is absent.
    Read,
    /// `r+`: read and write from the start. Fails with `NotFound` if absent.
    ReadWrite,
    /// `a`: write, positioned at the current end (or 0 if absent).
    Append,
    /// `x`: create. Fails with `AlreadyExists` if the blob is present.
    ExclusiveCreate,
    /// `w`: create, or truncate an existing blob to zero length.
    WriteOrCreate,
}

impl OpenMode {
    /// Whether a stream opened in this mode accepts writes.
    pub fn is_writable(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// A backend pool that streams are opened against.
#[derive(Clone)]
pub struct BlobPool {
    backend: Arc<dyn BlobBackend>,
    name: String,
    policy: PoolPolicy,
}

impl BlobPool {
    /// Bind `backend` to the pool `name`.
    pub fn new(backend: Arc<dyn BlobBackend>, name: impl Into<String>, policy: PoolPolicy) -> Self {
        Self {
            backend,
            name: name.into(),
            policy,
        }
    }

    /// The pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open `blob` in the given mode.
    ///
    /// Every backend resource acquired here is owned by the returned stream,
    /// or released before an error is returned.
    pub fn open(&self, blob: &str, mode: OpenMode) -> StoreResult<ObjectStream> {
        let conn = self.connect(blob)?;
        let found = conn.ctx(blob)?.stat(blob).map_err(|e| StoreError::backend(blob, e))?;

        let (stat, pos) = match mode {
            OpenMode::Read | OpenMode::ReadWrite => match found {
                Some(stat) => (stat, 0),
                None => return Err(StoreError::NotFound { blob: blob.into() }),
            },
            OpenMode::Append => match found {
                Some(stat) => (stat, stat.size),
                None => (BlobStat::empty(), 0),
            },
            OpenMode::ExclusiveCreate => match found {
                Some(_) => return Err(StoreError::AlreadyExists { blob: blob.into() }),
                None => (BlobStat::empty(), 0),
            },
            OpenMode::WriteOrCreate => match found {
                Some(stat) if stat.size > 0 => {
                    conn.ctx(blob)?
                        .truncate(blob, 0)
                        .map_err(|e| StoreError::backend(blob, e))?;
                    (BlobStat { size: 0, ..stat }, 0)
                }
                Some(stat) => (stat, 0),
                None => (BlobStat::empty(), 0),
            },
        };

        debug!(pool = %self.name, blob, ?mode, size = stat.size, "blob opened");
        Ok(ObjectStream {
            conn,
            blob: blob.to_string(),
            mode,
            pos,
            stat,
            writable: mode.is_writable(),
        })
    }

    /// Remove `blob`.
    ///
    /// Fails with `NotFound` if the blob does not exist, and with an I/O
    /// error if the backend refuses the removal.
    pub fn unlink(&self, blob: &str) -> StoreResult<()> {
        let stream = self.open(blob, OpenMode::Read)?;
        stream
            .conn
            .ctx(blob)?
            .remove(blob)
            .map_err(|e| StoreError::backend(blob, e))?;
        debug!(pool = %self.name, blob, "blob removed");
        stream.close()
    }

    fn connect(&self, blob: &str) -> StoreResult<Connection> {
        let session = self
            .backend
            .connect()
            .map_err(|e| StoreError::backend(blob, e))?;
        let mut conn = Connection {
            session: Some(session),
            ctx: None,
        };
        let session = conn.session()?;

        let exists = session
            .pool_exists(&self.name)
            .map_err(|e| StoreError::backend(blob, e))?;
        if !exists {
            match self.policy {
                PoolPolicy::CreateIfMissing => {
                    session
                        .create_pool(&self.name)
                        .map_err(|e| StoreError::backend(blob, e))?;
                    debug!(pool = %self.name, "created missing pool");
                }
                PoolPolicy::RequireExisting => {
                    return Err(StoreError::backend(
                        blob,
                        BackendError::PoolNotFound(self.name.clone()),
                    ));
                }
            }
        }

        let ctx = session
            .open_context(&self.name)
            .map_err(|e| StoreError::backend(blob, e))?;
        conn.ctx = Some(ctx);
        Ok(conn)
    }
}

impl fmt::Debug for BlobPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobPool")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Owns a backend session and its I/O context.
///
/// `close` tears both down and reports failures. Dropping without `close`
/// tears them down too, logging failures instead.
struct Connection {
    session: Option<Box<dyn Session>>,
    ctx: Option<Box<dyn IoContext>>,
}

impl Connection {
    fn session(&self) -> StoreResult<&dyn Session> {
        self.session.as_deref().ok_or_else(|| released("session"))
    }

    fn ctx(&self, blob: &str) -> StoreResult<&dyn IoContext> {
        self.ctx.as_deref().ok_or_else(|| StoreError::Io {
            blob: blob.to_string(),
            source: BackendError::Unavailable("io context released".into()),
        })
    }

    fn close(mut self) -> Result<(), BackendError> {
        let ctx_result = self.ctx.take().map_or(Ok(()), |ctx| ctx.close());
        let session_result = self.session.take().map_or(Ok(()), |s| s.shutdown());
        ctx_result.and(session_result)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            if let Err(e) = ctx.close() {
                warn!(error = %e, "failed to close io context");
            }
        }
        if let Some(session) = self.session.take() {
            if let Err(e) = session.shutdown() {
                warn!(error = %e, "failed to shut down backend session");
            }
        }
    }
}

fn released(what: &str) -> StoreError {
    StoreError::Io {
        blob: String::new(),
        source: BackendError::Unavailable(format!("{what} released")),
    }
}

/// File-like metadata for an open blob.
///
/// The backend has no owners or permissions; those fields are synthetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamStat {
    pub size: u64,
    pub atime: Option<DateTime<Utc>>,
    pub mtime: Option<DateTime<Utc>>,
    pub ctime: Option<DateTime<Utc>>,
    /// Always [`StreamStat::MODE_REGULAR`].
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
}

impl StreamStat {
    /// Regular file, `rwxrwxrwx`.
    pub const MODE_REGULAR: u32 = 0o100000 | 0o777;
}

/// A seekable, readable and writable view of one backend blob.
///
/// Reads never go past the blob's known size, and seeking past the end is
/// rejected: the blob only grows by writing at or after its end.
pub struct ObjectStream {
    conn: Connection,
    blob: String,
    mode: OpenMode,
    pos: u64,
    stat: BlobStat,
    writable: bool,
}

impl ObjectStream {
    /// Name of the underlying blob.
    pub fn name(&self) -> &str {
        &self.blob
    }

    /// Mode the stream was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether writes reach the backend.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Last known size of the blob.
    pub fn size(&self) -> u64 {
        self.stat.size
    }

    /// Current position.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Whether the position is at or past the end of the blob.
    pub fn eof(&self) -> bool {
        self.pos >= self.size()
    }

    /// Read up to `count` bytes from the current position.
    ///
    /// Returns an empty buffer at end of stream.
    pub fn read_bytes(&mut self, count: usize) -> StoreResult<Vec<u8>> {
        if self.eof() || count == 0 {
            return Ok(Vec::new());
        }
        let remaining = self.size() - self.pos;
        let count = (count as u64).min(remaining) as usize;
        let data = self
            .conn
            .ctx(&self.blob)?
            .read(&self.blob, count, self.pos)
            .map_err(|e| StoreError::backend(&self.blob, e))?;
        self.pos += data.len() as u64;
        Ok(data)
    }

    /// Write `data` at the current position.
    ///
    /// Returns 0 without touching the backend if the stream is read-only.
    /// A backend that accepts fewer bytes than offered is an error.
    pub fn write_bytes(&mut self, data: &[u8]) -> StoreResult<usize> {
        if !self.writable || data.is_empty() {
            return Ok(0);
        }
        let written = self
            .conn
            .ctx(&self.blob)?
            .write(&self.blob, data, self.pos)
            .map_err(|e| StoreError::backend(&self.blob, e))?;
        if written != data.len() {
            return Err(StoreError::ShortWrite {
                blob: self.blob.clone(),
                expected: data.len(),
                written,
            });
        }
        self.pos += written as u64;
        if self.pos > self.stat.size {
            self.stat.size = self.pos;
        }
        Ok(written)
    }

    /// Move the position. Targets before the start or past the end are
    /// rejected and leave the position unchanged.
    pub fn seek_to(&mut self, target: SeekFrom) -> StoreResult<u64> {
        let size = self.size();
        let target = match target {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => size as i128 + delta as i128,
        };
        if target < 0 || target > size as i128 {
            return Err(StoreError::InvalidSeek {
                blob: self.blob.clone(),
                target,
                size,
            });
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    /// File-like metadata for the blob.
    pub fn stat(&self) -> StreamStat {
        let stat = self.stat;
        StreamStat {
            size: stat.size,
            atime: stat.mtime,
            mtime: stat.mtime,
            ctime: stat.mtime,
            mode: StreamStat::MODE_REGULAR,
            nlink: 1,
            uid: 0,
            gid: 0,
        }
    }

    /// Release the backend context and session.
    pub fn close(self) -> StoreResult<()> {
        let blob = self.blob;
        self.conn
            .close()
            .map_err(|source| StoreError::Io { blob, source })
    }
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStream")
            .field("blob", &self.blob)
            .field("mode", &self.mode)
            .field("pos", &self.pos)
            .field("size", &self.size())
            .finish()
    }
}

impl Read for ObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.read_bytes(buf.len())?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl Write for ObjectStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for ObjectStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.seek_to(pos)?)
    }
}
