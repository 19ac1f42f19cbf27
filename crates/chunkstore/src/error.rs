use std::io;

use chunkstore_backend::BackendError;

/// Coarse classification of a [`StoreError`], for callers that branch on
/// what went wrong rather than where.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A manifest or a referenced part blob is absent.
    NotFound,
    /// The backend failed to connect, read, write, remove, or tear down.
    Io,
    /// A part's recomputed hash does not match the manifest.
    Integrity,
    /// The header blob exists but does not describe a valid object.
    CorruptManifest,
    /// The caller asked for something the stream cannot do.
    InvalidArgument,
}

/// Errors from chunked object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The named blob does not exist.
    #[error("blob not found: {blob}")]
    NotFound { blob: String },

    /// Exclusive create found an existing blob.
    #[error("blob already exists: {blob}")]
    AlreadyExists { blob: String },

    /// The backend reported a failure while operating on `blob`.
    #[error("I/O error on {blob}: {source}")]
    Io {
        blob: String,
        #[source]
        source: BackendError,
    },

    /// The backend accepted fewer bytes than were written.
    #[error("short write to {blob}: {written} of {expected} bytes accepted")]
    ShortWrite {
        blob: String,
        expected: usize,
        written: usize,
    },

    /// A seek target lies outside the blob.
    #[error("cannot seek {blob} to {target}: blob is {size} bytes")]
    InvalidSeek { blob: String, target: i128, size: u64 },

    /// Content hash mismatch on read (data corruption).
    #[error("integrity check failed for {part}: expected {expected}, computed {computed}")]
    Integrity {
        part: String,
        expected: String,
        computed: String,
    },

    /// The header blob is malformed.
    #[error("corrupt manifest {blob}: {reason}")]
    CorruptManifest { blob: String, reason: String },

    /// Deleting an object stopped at `blob`.
    #[error("could not delete {blob}: {source}")]
    DeleteFailed {
        blob: String,
        #[source]
        source: Box<StoreError>,
    },

    /// Reading the caller's input or writing the caller's output failed.
    #[error("stream I/O error: {0}")]
    Input(#[from] io::Error),
}

impl StoreError {
    /// Wrap a backend failure on `blob`, mapping `BlobNotFound` to
    /// [`StoreError::NotFound`].
    pub fn backend(blob: impl Into<String>, source: BackendError) -> Self {
        let blob = blob.into();
        match source {
            BackendError::BlobNotFound(_) => Self::NotFound { blob },
            source => Self::Io { blob, source },
        }
    }

    /// The coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Io { .. } | Self::ShortWrite { .. } | Self::Input(_) => ErrorKind::Io,
            Self::DeleteFailed { .. } => ErrorKind::Io,
            Self::AlreadyExists { .. } | Self::InvalidSeek { .. } => ErrorKind::InvalidArgument,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::CorruptManifest { .. } => ErrorKind::CorruptManifest,
        }
    }
}

impl From<StoreError> for io::Error {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::Input(inner) => inner.kind(),
            StoreError::NotFound { .. } => io::ErrorKind::NotFound,
            StoreError::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            StoreError::InvalidSeek { .. } => io::ErrorKind::InvalidInput,
            StoreError::ShortWrite { .. } => io::ErrorKind::WriteZero,
            StoreError::Integrity { .. } | StoreError::CorruptManifest { .. } => {
                io::ErrorKind::InvalidData
            }
            StoreError::Io { .. } | StoreError::DeleteFailed { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
