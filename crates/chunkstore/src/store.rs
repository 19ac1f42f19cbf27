use std::io::{Read, Seek};
use std::sync::Arc;

use chunkstore_backend::BlobBackend;
use tracing::{debug, info, warn};

use crate::codec::PartCodec;
use crate::config::{ConfigError, StoreConfig};
use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::manifest::{Header, ManifestManager, PartTable};
use crate::reader::ObjectReader;
use crate::stream::BlobPool;
use crate::traits::ObjectStore;
use crate::urn::Urn;

/// Progress of one `write_object` call.
///
/// An object becomes visible only once its header is written; before that,
/// any part blobs already written are unreferenced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriteState {
    Started,
    PartsWritten { parts: u64 },
    Committed,
}

struct WriteTransaction<'a> {
    urn: &'a Urn,
    state: WriteState,
    table: PartTable,
}

impl<'a> WriteTransaction<'a> {
    fn begin(urn: &'a Urn) -> Self {
        Self {
            urn,
            state: WriteState::Started,
            table: PartTable::new(),
        }
    }

    fn parts_written(&mut self) -> Header {
        let header = Header::from_table(std::mem::take(&mut self.table));
        self.state = WriteState::PartsWritten {
            parts: header.parts,
        };
        header
    }

    fn commit(&mut self) {
        self.state = WriteState::Committed;
    }

    fn abort(&self, err: &StoreError) {
        let orphaned = match self.state {
            WriteState::Started => self.table.len() as u64,
            WriteState::PartsWritten { parts } => parts,
            WriteState::Committed => 0,
        };
        if orphaned > 0 {
            warn!(
                urn = %self.urn,
                state = ?self.state,
                orphaned,
                error = %err,
                "write aborted; part blobs left without a header"
            );
        } else {
            debug!(urn = %self.urn, state = ?self.state, error = %err, "write aborted");
        }
    }
}

/// Stores large objects as fixed-size part blobs plus a header blob.
///
/// Writes are not transactional: a failed write can leave part blobs with
/// no header, and a failed delete can leave some parts and the header
/// behind. Neither is cleaned up here. A successful overwrite with fewer
/// parts removes the previous object's higher-numbered parts.
#[derive(Clone, Debug)]
pub struct ChunkedObjectStore {
    config: StoreConfig,
    pool: BlobPool,
    codec: PartCodec,
    manifests: ManifestManager,
}

impl ChunkedObjectStore {
    /// Create a store over `backend`.
    pub fn new(backend: Arc<dyn BlobBackend>, config: StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = BlobPool::new(backend, config.pool.clone(), config.pool_policy);
        Ok(Self {
            codec: PartCodec::new(pool.clone(), config.part_size),
            manifests: ManifestManager::new(pool.clone()),
            pool,
            config,
        })
    }

    /// The configuration this store runs with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Load the header of `urn` without touching its parts.
    pub fn stat_object(&self, urn: &Urn) -> StoreResult<Header> {
        self.manifests.load(urn)
    }

    /// Read and hash-check every part of `urn`, discarding the content.
    pub fn verify_object(&self, urn: &Urn) -> StoreResult<Header> {
        let header = self.manifests.load(urn)?;
        self.codec.verify_parts(&header)?;
        info!(%urn, parts = header.parts, size = header.size, "object verified");
        Ok(header)
    }

    /// Part count of the object currently stored under `urn`, if readable.
    fn previous_parts(&self, urn: &Urn) -> Option<u64> {
        match self.manifests.load(urn) {
            Ok(header) => Some(header.parts),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(%urn, error = %e, "previous header unreadable; its parts are not tracked");
                None
            }
        }
    }

    /// Remove parts `keep + 1..=old` left over from a larger object that
    /// was just overwritten. Failures are logged and do not fail the write.
    fn remove_stale_parts(&self, urn: &Urn, keep: u64, old: u64) {
        let mut failed = 0u64;
        for number in keep + 1..=old {
            let name = urn.part_name(number);
            match self.pool.unlink(&name) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    debug!(%urn, blob = %name, error = %e, "stale part not removed");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            warn!(%urn, failed, stale = old - keep, "stale part blobs left after overwrite");
        }
    }
}

impl ObjectStore for ChunkedObjectStore {
    fn storage_id(&self) -> &str {
        self.pool.name()
    }

    fn write_object(&self, urn: &Urn, input: &mut dyn Read) -> StoreResult<Header> {
        let previous_parts = self.previous_parts(urn);
        let mut txn = WriteTransaction::begin(urn);

        if let Err(e) = self.codec.write_parts(urn, input, &mut txn.table) {
            txn.abort(&e);
            return Err(e);
        }
        let header = txn.parts_written();

        if let Err(e) = self.manifests.save(urn, &header) {
            txn.abort(&e);
            return Err(e);
        }
        txn.commit();

        if let Some(old) = previous_parts {
            self.remove_stale_parts(urn, header.parts, old);
        }

        info!(%urn, parts = header.parts, size = header.size, "object written");
        Ok(header)
    }

    fn read_object(&self, urn: &Urn) -> StoreResult<ObjectReader> {
        let header = self.manifests.load(urn)?;
        let mut spool = tempfile::spooled_tempfile(self.config.spool_threshold);
        let size = self.codec.read_parts(&header, &mut spool)?;
        spool.rewind()?;
        info!(%urn, parts = header.parts, size, "object read");
        Ok(ObjectReader::new(spool, size))
    }

    fn delete_object(&self, urn: &Urn) -> StoreResult<()> {
        let header = self.manifests.load(urn)?;

        for (removed, (name, _)) in header.metadata.iter().enumerate() {
            if let Err(e) = self.pool.unlink(name) {
                warn!(
                    %urn,
                    blob = name,
                    removed,
                    parts = header.parts,
                    error = %e,
                    "delete stopped partway"
                );
                return Err(StoreError::DeleteFailed {
                    blob: name.to_string(),
                    source: Box::new(e),
                });
            }
        }

        let blob = urn.header_name();
        self.manifests.remove(urn).map_err(|e| {
            warn!(%urn, blob = %blob, error = %e, "parts removed but header remains");
            StoreError::DeleteFailed {
                blob: blob.clone(),
                source: Box::new(e),
            }
        })?;

        info!(%urn, parts = header.parts, "object deleted");
        Ok(())
    }
}
