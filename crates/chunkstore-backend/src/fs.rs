use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::traits::{BlobBackend, BlobStat, IoContext, Session};

/// Directory-backed blob backend.
///
/// Each pool is a subdirectory of `root` and each blob is a regular file in
/// its pool directory. Blob names must be single path components.
#[derive(Clone, Debug)]
pub struct DirectoryBackend {
    root: PathBuf,
}

impl DirectoryBackend {
    /// Create a backend rooted at `root`. The directory is created on first
    /// connect.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BlobBackend for DirectoryBackend {
    fn connect(&self) -> BackendResult<Box<dyn Session>> {
        fs::create_dir_all(&self.root).map_err(|e| {
            BackendError::Unavailable(format!("{}: {e}", self.root.display()))
        })?;
        Ok(Box::new(DirectorySession {
            root: self.root.clone(),
        }))
    }
}

struct DirectorySession {
    root: PathBuf,
}

impl DirectorySession {
    fn pool_dir(&self, pool: &str) -> BackendResult<PathBuf> {
        check_name(pool)?;
        Ok(self.root.join(pool))
    }
}

impl Session for DirectorySession {
    fn pool_exists(&self, pool: &str) -> BackendResult<bool> {
        Ok(self.pool_dir(pool)?.is_dir())
    }

    fn create_pool(&self, pool: &str) -> BackendResult<()> {
        let dir = self.pool_dir(pool)?;
        fs::create_dir_all(&dir).map_err(|e| BackendError::PoolCreate {
            pool: pool.to_string(),
            reason: e.to_string(),
        })?;
        debug!(pool, dir = %dir.display(), "pool created");
        Ok(())
    }

    fn open_context(&self, pool: &str) -> BackendResult<Box<dyn IoContext>> {
        let dir = self.pool_dir(pool)?;
        if !dir.is_dir() {
            return Err(BackendError::PoolNotFound(pool.to_string()));
        }
        Ok(Box::new(DirectoryContext {
            pool: pool.to_string(),
            dir,
        }))
    }

    fn shutdown(self: Box<Self>) -> BackendResult<()> {
        Ok(())
    }
}

struct DirectoryContext {
    pool: String,
    dir: PathBuf,
}

impl DirectoryContext {
    fn blob_path(&self, oid: &str) -> BackendResult<PathBuf> {
        check_name(oid)?;
        Ok(self.dir.join(oid))
    }

    fn open_for_write(&self, oid: &str) -> BackendResult<File> {
        let path = self.blob_path(oid)?;
        Ok(OpenOptions::new().create(true).write(true).truncate(false).open(path)?)
    }
}

impl IoContext for DirectoryContext {
    fn pool(&self) -> &str {
        &self.pool
    }

    fn stat(&self, oid: &str) -> BackendResult<Option<BlobStat>> {
        let path = self.blob_path(oid)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(BlobStat {
                size: meta.len(),
                mtime: meta.modified().ok().map(DateTime::<Utc>::from),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read(&self, oid: &str, count: usize, offset: u64) -> BackendResult<Vec<u8>> {
        let path = self.blob_path(oid)?;
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackendError::BlobNotFound(oid.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(count);
        file.take(count as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write(&self, oid: &str, data: &[u8], offset: u64) -> BackendResult<usize> {
        let mut file = self.open_for_write(oid)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(data.len())
    }

    fn truncate(&self, oid: &str, size: u64) -> BackendResult<()> {
        let file = self.open_for_write(oid)?;
        file.set_len(size)?;
        Ok(())
    }

    fn remove(&self, oid: &str) -> BackendResult<()> {
        let path = self.blob_path(oid)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BackendError::BlobNotFound(oid.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(self: Box<Self>) -> BackendResult<()> {
        Ok(())
    }
}

/// Names map to single path components; anything that could escape the
/// pool directory is rejected.
fn check_name(name: &str) -> BackendResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(BackendError::InvalidName(name.to_string()));
    }
    Ok(())
}
