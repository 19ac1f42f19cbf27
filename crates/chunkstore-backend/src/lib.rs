//! Blob backend interface for chunkstore.
//!
//! A backend is a remote key-value object service addressed by
//! `(pool, object-id)`. It only offers atomic, size-bounded primitives on
//! individual blobs; everything above that (chunking, manifests, integrity)
//! lives in the `chunkstore` crate.
//!
//! # Shape
//!
//! - [`BlobBackend`] -- connects and hands out a [`Session`]
//! - [`Session`] -- pool lookup/creation and [`IoContext`] creation
//! - [`IoContext`] -- stat/read/write/truncate/remove on blobs in one pool
//!
//! # Backends
//!
//! - [`InMemoryBackend`] -- `HashMap`-based backend for tests and embedding,
//!   with fault injection
//! - [`DirectoryBackend`] -- one directory per pool, one file per blob

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{BackendError, BackendResult};
pub use fs::DirectoryBackend;
pub use memory::{Fault, InMemoryBackend};
pub use traits::{BlobBackend, BlobStat, IoContext, Session};
