use std::io::Read;

use crate::error::StoreResult;
use crate::manifest::Header;
use crate::reader::ObjectReader;
use crate::urn::Urn;

/// Store of whole logical objects addressed by urn.
///
/// All implementations must satisfy these invariants:
/// - Objects are written whole; there is no partial update.
/// - Reads return exactly the bytes that were written, or fail.
/// - Errors are surfaced unchanged. Nothing is retried or repaired.
/// - One writer per urn at a time is the caller's responsibility.
pub trait ObjectStore: Send + Sync {
    /// Name of the container holding this store's blobs.
    fn storage_id(&self) -> &str;

    /// Store the content of `input` under `urn`, replacing any previous
    /// object with that urn. Returns the header that was written.
    fn write_object(&self, urn: &Urn, input: &mut dyn Read) -> StoreResult<Header>;

    /// Read back the object stored under `urn`, verifying every part.
    fn read_object(&self, urn: &Urn) -> StoreResult<ObjectReader>;

    /// Remove the object stored under `urn`.
    fn delete_object(&self, urn: &Urn) -> StoreResult<()>;
}
