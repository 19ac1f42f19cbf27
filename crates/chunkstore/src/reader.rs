use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use tempfile::SpooledTempFile;

/// The verified bytes of one logical object.
///
/// Small objects stay in memory; larger ones spill to an anonymous temporary
/// file. The reader starts at offset 0.
pub struct ObjectReader {
    inner: SpooledTempFile,
    size: u64,
}

impl ObjectReader {
    pub(crate) fn new(inner: SpooledTempFile, size: u64) -> Self {
        Self { inner, size }
    }

    /// Total size of the object in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the content spilled to disk.
    pub fn is_spilled(&self) -> bool {
        self.inner.is_rolled()
    }

    /// Read the remaining content into a vector.
    pub fn into_vec(mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size as usize);
        self.inner.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for ObjectReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("size", &self.size)
            .field("spilled", &self.is_spilled())
            .finish()
    }
}
