use std::io::{self, Read, Write};

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::hasher::PartDigest;
use crate::manifest::{Header, PartMeta, PartTable};
use crate::stream::{BlobPool, OpenMode};
use crate::urn::Urn;

/// Largest single backend read issued while fetching a part.
const READ_CHUNK: usize = 1024 * 1024;

/// Splits a byte stream into fixed-size part blobs and reassembles them.
///
/// Every part except the last holds exactly `part_size` bytes. An empty
/// input produces no parts.
#[derive(Clone, Debug)]
pub struct PartCodec {
    pool: BlobPool,
    part_size: usize,
}

impl PartCodec {
    /// Create a codec writing parts of `part_size` bytes into `pool`.
    ///
    /// # Panics
    ///
    /// Panics if `part_size` is zero.
    pub fn new(pool: BlobPool, part_size: usize) -> Self {
        assert!(part_size > 0, "part size must be greater than zero");
        Self { pool, part_size }
    }

    /// Maximum bytes per part.
    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Write `input` as parts `<urn>_part1..N`, appending each part to
    /// `table` as soon as its blob is written.
    ///
    /// On error, `table` lists exactly the parts that reached the backend.
    pub fn write_parts<R: Read>(
        &self,
        urn: &Urn,
        mut input: R,
        table: &mut PartTable,
    ) -> StoreResult<()> {
        let mut buf = vec![0u8; self.part_size];
        let mut offset: u64 = 0;
        let mut number: u64 = 1;

        loop {
            let filled = fill(&mut input, &mut buf)?;
            if filled == 0 {
                break;
            }
            let data = &buf[..filled];
            let name = urn.part_name(number);
            let digest = PartDigest::of(data);

            let mut stream = self.pool.open(&name, OpenMode::WriteOrCreate)?;
            stream.write_bytes(data)?;
            stream.close()?;

            debug!(part = %name, start = offset, size = filled, hash = %digest, "part written");
            table.push(
                name,
                PartMeta {
                    start: offset,
                    size: filled as u64,
                    hash: digest.to_hex(),
                },
            );
            offset += filled as u64;
            number += 1;

            if filled < self.part_size {
                break;
            }
        }
        Ok(())
    }

    /// Read every part listed in `header`, verify it, and copy it to `out`.
    ///
    /// A part is only copied once its hash matches, so nothing past the
    /// first bad part reaches `out`. Returns the number of bytes copied.
    pub fn read_parts<W: Write>(&self, header: &Header, out: &mut W) -> StoreResult<u64> {
        let mut total: u64 = 0;
        for (name, meta) in header.metadata.iter() {
            let data = self.read_part(name, meta.size)?;
            let computed = PartDigest::of(&data).to_hex();
            if computed != meta.hash {
                return Err(StoreError::Integrity {
                    part: name.to_string(),
                    expected: meta.hash.clone(),
                    computed,
                });
            }
            out.write_all(&data)?;
            total += data.len() as u64;
            debug!(part = %name, size = data.len(), "part verified");
        }
        Ok(total)
    }

    /// Read and verify every part of `header`, discarding the bytes.
    pub fn verify_parts(&self, header: &Header) -> StoreResult<u64> {
        self.read_parts(header, &mut io::sink())
    }

    fn read_part(&self, name: &str, size: u64) -> StoreResult<Vec<u8>> {
        let mut stream = self.pool.open(name, OpenMode::Read)?;
        let mut data = Vec::with_capacity(size.min(self.part_size as u64) as usize);
        let mut remaining = size;
        while remaining > 0 {
            let want = remaining.min(READ_CHUNK as u64) as usize;
            let chunk = stream.read_bytes(want)?;
            if chunk.is_empty() {
                break;
            }
            remaining -= chunk.len() as u64;
            data.extend_from_slice(&chunk);
        }
        stream.close()?;
        Ok(data)
    }
}

/// Read from `input` until `buf` is full or the input is exhausted.
fn fill<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::PoolPolicy;
    use crate::error::ErrorKind;
    use chunkstore_backend::{Fault, InMemoryBackend};

    const POOL: &str = "parts";

    fn codec(part_size: usize) -> (InMemoryBackend, PartCodec) {
        let backend = InMemoryBackend::with_pool(POOL);
        let pool = BlobPool::new(Arc::new(backend.clone()), POOL, PoolPolicy::CreateIfMissing);
        (backend, PartCodec::new(pool, part_size))
    }

    fn split(codec: &PartCodec, urn: &Urn, data: &[u8]) -> Header {
        let mut table = PartTable::new();
        codec.write_parts(urn, data, &mut table).unwrap();
        Header::from_table(table)
    }

    /// Yields at most three bytes per read call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(3).min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    #[test]
    fn empty_input_writes_no_parts() {
        let (backend, codec) = codec(4);
        let urn = Urn::new("empty").unwrap();
        let header = split(&codec, &urn, b"");
        assert_eq!(header, Header::empty());
        assert_eq!(backend.blob_count(POOL), 0);
    }

    #[test]
    fn exact_multiple_of_part_size() {
        let (backend, codec) = codec(4);
        let urn = Urn::new("obj").unwrap();
        let header = split(&codec, &urn, b"abcdefgh");
        assert_eq!(header.parts, 2);
        assert_eq!(header.size, 8);
        assert!(header.metadata.iter().all(|(_, m)| m.size == 4));
        assert_eq!(backend.blob(POOL, "obj_part1").unwrap(), b"abcd");
        assert_eq!(backend.blob(POOL, "obj_part2").unwrap(), b"efgh");
        assert_eq!(backend.blob_count(POOL), 2);
    }

    #[test]
    fn remainder_goes_into_a_short_last_part() {
        let (_backend, codec) = codec(4);
        let urn = Urn::new("obj").unwrap();
        let header = split(&codec, &urn, b"abcdefghi");
        assert_eq!(header.parts, 3);
        let last = header.metadata.get("obj_part3").unwrap();
        assert_eq!(last.start, 8);
        assert_eq!(last.size, 1);
        assert_eq!(last.hash, PartDigest::of(b"i").to_hex());
        assert!(header.validate(&urn).is_ok());
    }

    #[test]
    fn short_reads_from_input_still_fill_parts() {
        let (backend, codec) = codec(8);
        let urn = Urn::new("obj").unwrap();
        let mut table = PartTable::new();
        codec
            .write_parts(&urn, Trickle(b"0123456789abcdef!"), &mut table)
            .unwrap();
        let sizes: Vec<u64> = table.iter().map(|(_, m)| m.size).collect();
        assert_eq!(sizes, vec![8, 8, 1]);
        assert_eq!(backend.blob(POOL, "obj_part2").unwrap(), b"89abcdef");
    }

    #[test]
    fn failed_part_write_reports_written_parts() {
        let (backend, codec) = codec(2);
        backend.inject(Fault::Write("obj_part3".into()));
        let urn = Urn::new("obj").unwrap();
        let mut table = PartTable::new();
        let err = codec.write_parts(&urn, &b"aabbccdd"[..], &mut table).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(table.len(), 2);
        assert_eq!(backend.live_contexts(), 0);
    }

    #[test]
    fn input_error_is_reported() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }
        let (_backend, codec) = codec(4);
        let urn = Urn::new("obj").unwrap();
        let err = codec.write_parts(&urn, Broken, &mut PartTable::new()).unwrap_err();
        assert!(matches!(err, StoreError::Input(_)));
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    #[test]
    fn read_reassembles_in_order() {
        let (_backend, codec) = codec(3);
        let urn = Urn::new("obj").unwrap();
        let header = split(&codec, &urn, b"the quick brown fox");
        let mut out = Vec::new();
        let n = codec.read_parts(&header, &mut out).unwrap();
        assert_eq!(n, 19);
        assert_eq!(out, b"the quick brown fox");
    }

    #[test]
    fn tampered_part_fails_integrity_without_leaking_it() {
        let (backend, codec) = codec(4);
        let urn = Urn::new("obj").unwrap();
        let header = split(&codec, &urn, b"aaaabbbbcccc");
        assert!(backend.corrupt(POOL, "obj_part2", 0));

        let mut out = Vec::new();
        let err = codec.read_parts(&header, &mut out).unwrap_err();
        match err {
            StoreError::Integrity { part, expected, computed } => {
                assert_eq!(part, "obj_part2");
                assert_eq!(expected, PartDigest::of(b"bbbb").to_hex());
                assert_ne!(expected, computed);
            }
            other => panic!("expected integrity error, got {other:?}"),
        }
        assert_eq!(out, b"aaaa");
        assert_eq!(backend.live_contexts(), 0);
    }

    #[test]
    fn truncated_part_fails_integrity() {
        let (backend, codec) = codec(4);
        let urn = Urn::new("obj").unwrap();
        let header = split(&codec, &urn, b"aaaabbbb");
        backend.put_blob(POOL, "obj_part1", b"aa");
        let err = codec.verify_parts(&header).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn stale_tail_beyond_recorded_size_is_ignored() {
        let (backend, codec) = codec(4);
        let urn = Urn::new("obj").unwrap();
        let header = split(&codec, &urn, b"abc");
        backend.put_blob(POOL, "obj_part1", b"abcXYZ");
        let mut out = Vec::new();
        codec.read_parts(&header, &mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn missing_part_is_not_found() {
        let (backend, codec) = codec(4);
        let urn = Urn::new("obj").unwrap();
        let header = split(&codec, &urn, b"aaaabbbb");
        backend.remove_blob(POOL, "obj_part2");
        let err = codec.verify_parts(&header).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { ref blob } if blob == "obj_part2"));
    }

    #[test]
    #[should_panic(expected = "part size")]
    fn zero_part_size_panics() {
        let _ = codec(0);
    }
}
