//! Chunked object storage over size-bounded blob backends.
//!
//! A logical object of any size is stored as a sequence of fixed-size part
//! blobs plus one JSON header blob that lists every part with its offset,
//! length and BLAKE3 hash. Reads reassemble the parts in order and reject
//! any part whose content no longer matches its recorded hash.
//!
//! # Blob Layout
//!
//! For an object named `urn`:
//!
//! - `<urn>_part1` .. `<urn>_partN` -- consecutive slices of the content,
//!   each exactly `part_size` bytes except possibly the last
//! - `<urn>_header` -- the [`Header`] describing those parts
//!
//! An empty object has a header with zero parts and no part blobs.
//!
//! # Layers
//!
//! - [`ObjectStream`] -- a file-like handle onto one blob, opened through a
//!   [`BlobPool`] with one of the [`OpenMode`]s
//! - [`PartCodec`] -- splits input into parts and verifies them on read
//! - [`ManifestManager`] -- persists headers
//! - [`ChunkedObjectStore`] -- the [`ObjectStore`] tying these together
//!
//! # Design Rules
//!
//! 1. An object is visible only after its header is written.
//! 2. Part blobs are written before the header and removed before it.
//! 3. Every backend session and context is released on every path.
//! 4. Backend errors are reported, never retried or repaired.
//! 5. Concurrent writers to the same urn are not coordinated.

pub mod codec;
pub mod config;
pub mod error;
pub mod hasher;
pub mod manifest;
pub mod reader;
pub mod store;
pub mod stream;
pub mod traits;
pub mod urn;

// Re-export primary types at crate root for ergonomic imports.
pub use codec::PartCodec;
pub use config::{
    ConfigError, PoolPolicy, StoreConfig, DEFAULT_PART_SIZE, DEFAULT_SPOOL_THRESHOLD,
};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use hasher::PartDigest;
pub use manifest::{Header, ManifestManager, PartMeta, PartTable};
pub use reader::ObjectReader;
pub use store::ChunkedObjectStore;
pub use stream::{BlobPool, ObjectStream, OpenMode, StreamStat};
pub use traits::ObjectStore;
pub use urn::{Urn, UrnError};
