//! Per-object header: the part table and its persistence.
//!
//! The header is stored as pretty-printed JSON in the `<urn>_header` blob:
//!
//! ```text
//! {
//!   "parts": 2,
//!   "metadata": {
//!     "<urn>_part1": { "start": 0,       "size": 4194304, "hash": "<hex>" },
//!     "<urn>_part2": { "start": 4194304, "size": 17,      "hash": "<hex>" }
//!   },
//!   "size": 4194321
//! }
//! ```
//!
//! `metadata` is written in part order and read back in document order.

use std::collections::HashSet;
use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::hasher::PartDigest;
use crate::stream::{BlobPool, OpenMode};
use crate::urn::Urn;

/// Read granularity when loading a header blob.
const HEADER_READ_SIZE: usize = 64 * 1024;

/// Location and digest of one part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartMeta {
    /// Offset of the part's first byte within the logical object.
    pub start: u64,
    /// Length of the part in bytes.
    pub size: u64,
    /// Hex digest of the part's bytes.
    pub hash: String,
}

/// Ordered mapping from part blob name to [`PartMeta`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartTable(Vec<(String, PartMeta)>);

impl PartTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a part. Order of insertion is part order.
    pub fn push(&mut self, name: impl Into<String>, meta: PartMeta) {
        self.0.push((name.into(), meta));
    }

    /// Look up a part by blob name.
    pub fn get(&self, name: &str) -> Option<&PartMeta> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    /// Iterate parts in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PartMeta)> {
        self.0.iter().map(|(n, m)| (n.as_str(), m))
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no parts.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for PartTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, meta) in &self.0 {
            map.serialize_entry(name, meta)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PartTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PartTableVisitor)
    }
}

struct PartTableVisitor;

impl<'de> Visitor<'de> for PartTableVisitor {
    type Value = PartTable;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of part names to part metadata")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PartTable, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        let mut seen = HashSet::new();
        while let Some((name, meta)) = access.next_entry::<String, PartMeta>()? {
            if !seen.insert(name.clone()) {
                return Err(de::Error::custom(format!("duplicate part {name}")));
            }
            entries.push((name, meta));
        }
        Ok(PartTable(entries))
    }

    // An empty `metadata` array is accepted for zero-part headers.
    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<PartTable, A::Error> {
        match access.next_element::<de::IgnoredAny>()? {
            None => Ok(PartTable::new()),
            Some(_) => Err(de::Error::invalid_type(de::Unexpected::Seq, &self)),
        }
    }
}

/// Manifest of one logical object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Number of parts.
    pub parts: u64,
    /// Per-part metadata, in part order.
    pub metadata: PartTable,
    /// Total logical size in bytes.
    pub size: u64,
}

impl Header {
    /// Header of a zero-length object.
    pub fn empty() -> Self {
        Self {
            parts: 0,
            metadata: PartTable::new(),
            size: 0,
        }
    }

    /// Build a header from a complete part table.
    pub fn from_table(metadata: PartTable) -> Self {
        let size = metadata.iter().map(|(_, m)| m.size).sum();
        Self {
            parts: metadata.len() as u64,
            metadata,
            size,
        }
    }

    /// Check that this header describes a well-formed object named `urn`.
    ///
    /// Parts must be exactly `<urn>_part1..N` in order, contiguous from
    /// offset 0, with valid digests, and `size` must equal their sum.
    pub fn validate(&self, urn: &Urn) -> Result<(), String> {
        if self.parts != self.metadata.len() as u64 {
            return Err(format!(
                "header declares {} parts but lists {}",
                self.parts,
                self.metadata.len()
            ));
        }
        let mut offset: u64 = 0;
        for (index, (name, meta)) in self.metadata.iter().enumerate() {
            let number = index as u64 + 1;
            if urn.part_number(name) != Some(number) {
                let expected = urn.part_name(number);
                return Err(format!("part {number} is named {name}, expected {expected}"));
            }
            if meta.start != offset {
                return Err(format!("{name} starts at {}, expected {offset}", meta.start));
            }
            if PartDigest::from_hex(&meta.hash).is_none() {
                return Err(format!("{name} has malformed hash {:?}", meta.hash));
            }
            offset = offset
                .checked_add(meta.size)
                .ok_or_else(|| format!("{name} overflows the object size"))?;
        }
        if self.size != offset {
            return Err(format!(
                "header size is {} but parts sum to {offset}",
                self.size
            ));
        }
        Ok(())
    }
}

/// Persists and loads `<urn>_header` blobs.
#[derive(Clone, Debug)]
pub struct ManifestManager {
    pool: BlobPool,
}

impl ManifestManager {
    pub fn new(pool: BlobPool) -> Self {
        Self { pool }
    }

    /// Write `header` as the manifest of `urn`, replacing any previous one.
    pub fn save(&self, urn: &Urn, header: &Header) -> StoreResult<()> {
        let blob = urn.header_name();
        let data = serde_json::to_vec_pretty(header).map_err(|e| StoreError::CorruptManifest {
            blob: blob.clone(),
            reason: e.to_string(),
        })?;
        let mut stream = self.pool.open(&blob, OpenMode::WriteOrCreate)?;
        stream.write_bytes(&data)?;
        stream.close()?;
        debug!(%urn, parts = header.parts, size = header.size, "header saved");
        Ok(())
    }

    /// Load and validate the manifest of `urn`.
    pub fn load(&self, urn: &Urn) -> StoreResult<Header> {
        let blob = urn.header_name();
        let mut stream = self.pool.open(&blob, OpenMode::Read)?;
        let mut data = Vec::with_capacity(stream.size() as usize);
        while !stream.eof() {
            let chunk = stream.read_bytes(HEADER_READ_SIZE)?;
            if chunk.is_empty() {
                break;
            }
            data.extend_from_slice(&chunk);
        }
        stream.close()?;

        let header: Header =
            serde_json::from_slice(&data).map_err(|e| StoreError::CorruptManifest {
                blob: blob.clone(),
                reason: e.to_string(),
            })?;
        header
            .validate(urn)
            .map_err(|reason| StoreError::CorruptManifest { blob, reason })?;
        Ok(header)
    }

    /// Remove the manifest of `urn`.
    pub fn remove(&self, urn: &Urn) -> StoreResult<()> {
        self.pool.unlink(&urn.header_name())
    }
}
