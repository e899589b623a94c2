//! Hour-file binary format: constants, header/footer, block metadata and
//! the index section. Hand-rolled little-endian encode/decode, in the
//! style of the teacher's `storage_v2/types.rs` (`SegmentHeaderV2`,
//! `FooterIndex`) rather than a generic serde codec — deliberate, since
//! on-disk layout needs an exact, stable byte-for-byte contract that a
//! derive macro doesn't give control over.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use crate::error::{Result, SpectreError};

/// Header magic: `b"SPCT"`.
pub const MAGIC: [u8; 4] = *b"SPCT";
/// Footer magic: `b"SPCTEOF"`.
pub const FOOTER_MAGIC: [u8; 7] = *b"SPCTEOF";
/// On-disk format version, written in both header and index section.
pub const FORMAT_VERSION: u16 = 1;
/// Fixed header size: magic(4) + version(2) + hour_epoch(8), padded to 32.
pub const HEADER_SIZE: usize = 32;
/// Fixed footer size: magic(7) + index_offset(8) + index_length(8) + total_event_count(8).
pub const FOOTER_SIZE: usize = 7 + 8 + 8 + 8;

/// Per-block compression algorithm, stored as a `u8` so new algorithms can
/// be added without breaking the format (unknown values decode as an
/// error, not a silent default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgo {
    Zstd = 0,
    None = 1,
}

impl CompressionAlgo {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Zstd),
            1 => Ok(Self::None),
            other => Err(SpectreError::BadFormat(format!(
                "unknown compression algorithm id {other}"
            ))),
        }
    }
}

/// Fixed-width hour-file header.
///
/// ```text
/// Offset  Size  Field
/// 0       4     magic: b"SPCT"
/// 4       2     format_version: u16
/// 6       8     hour_epoch: u64
/// 14      18    reserved: 0x00
/// ```
#[derive(Debug, Clone, Copy)]
pub struct HourFileHeader {
    pub hour_epoch: u64,
}

impl HourFileHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&MAGIC)?;
        w.write_all(&FORMAT_VERSION.to_le_bytes())?;
        w.write_all(&self.hour_epoch.to_le_bytes())?;
        w.write_all(&[0u8; HEADER_SIZE - 4 - 2 - 8])?;
        Ok(())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(SpectreError::BadFormat(
                "file too small for hour-file header".into(),
            ));
        }
        if bytes[0..4] != MAGIC {
            return Err(SpectreError::BadFormat(format!(
                "bad header magic: {:?}",
                &bytes[0..4]
            )));
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(SpectreError::BadFormat(format!(
                "unsupported format version {version}"
            )));
        }
        let hour_epoch = u64::from_le_bytes(bytes[6..14].try_into().unwrap());
        Ok(Self { hour_epoch })
    }
}

/// Fixed-width footer: the only structure at a known offset from file end.
/// Its presence marks the file finalized.
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    pub index_offset: u64,
    pub index_length: u64,
    pub total_event_count: u64,
}

impl Footer {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&FOOTER_MAGIC)?;
        w.write_all(&self.index_offset.to_le_bytes())?;
        w.write_all(&self.index_length.to_le_bytes())?;
        w.write_all(&self.total_event_count.to_le_bytes())?;
        Ok(())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FOOTER_SIZE {
            return Err(SpectreError::NotFinalized(
                "file too small to contain a footer".into(),
            ));
        }
        let tail = &bytes[bytes.len() - FOOTER_SIZE..];
        if tail[0..7] != FOOTER_MAGIC {
            return Err(SpectreError::NotFinalized(
                "footer magic absent at file tail".into(),
            ));
        }
        let index_offset = u64::from_le_bytes(tail[7..15].try_into().unwrap());
        let index_length = u64::from_le_bytes(tail[15..23].try_into().unwrap());
        let total_event_count = u64::from_le_bytes(tail[23..31].try_into().unwrap());
        Ok(Self {
            index_offset,
            index_length,
            total_event_count,
        })
    }
}

/// The set of (group, version, kind, namespace) tuples, namespaces, and
/// kinds observed within one block, plus the block's compression algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentMetadata {
    pub gvk_namespace_tuples: BTreeSet<(String, String, String, String)>,
    pub namespaces: BTreeSet<String>,
    pub kinds: BTreeSet<String>,
}

/// Per-block metadata, as recorded in the index section.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMeta {
    pub block_id: u32,
    pub offset: u64,
    pub length: u64,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub event_count: u32,
    pub min_ts_ns: u64,
    pub max_ts_ns: u64,
    pub compression: CompressionAlgo,
    pub segment_metadata: SegmentMetadata,
    pub digest: [u8; 32],
}

impl BlockMeta {
    /// Check the per-block invariants from the data model: `min_ts <=
    /// max_ts`, `compressed_size <= uncompressed_size`, `event_count >= 1`.
    pub fn validate(&self) -> Result<()> {
        if self.min_ts_ns > self.max_ts_ns {
            return Err(SpectreError::Internal(format!(
                "block {} has min_ts {} > max_ts {}",
                self.block_id, self.min_ts_ns, self.max_ts_ns
            )));
        }
        if self.compressed_size > self.uncompressed_size {
            return Err(SpectreError::Internal(format!(
                "block {} compressed_size {} > uncompressed_size {}",
                self.block_id, self.compressed_size, self.uncompressed_size
            )));
        }
        if self.event_count == 0 {
            return Err(SpectreError::Internal(format!(
                "block {} has zero events",
                self.block_id
            )));
        }
        Ok(())
    }

    /// Whether the block's time range overlaps the query range `[start, end]`.
    pub fn overlaps_time_range(&self, start: u64, end: u64) -> bool {
        self.min_ts_ns <= end && self.max_ts_ns >= start
    }
}

/// The index section: block metadata array plus the two inverted indexes.
/// Written exactly once, at `Close`.
#[derive(Debug, Clone, Default)]
pub struct IndexSection {
    pub blocks: Vec<BlockMeta>,
    /// kind → block ids containing at least one event of that kind.
    pub kind_index: BTreeMap<String, Vec<u32>>,
    /// namespace → block ids containing at least one event of that namespace.
    pub namespace_index: BTreeMap<String, Vec<u32>>,
}

fn write_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    w.write_all(&(s.len() as u32).to_le_bytes())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// A cursor over a byte slice with bounds-checked reads, used for decoding
/// the variable-length index section.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(SpectreError::BadFormat(
                "index section truncated".into(),
            ));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SpectreError::BadFormat(format!("invalid utf-8 in index section: {e}")))
    }

    fn read_digest(&mut self) -> Result<[u8; 32]> {
        let bytes = self.take(32)?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(bytes);
        Ok(digest)
    }
}

impl SegmentMetadata {
    fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&(self.gvk_namespace_tuples.len() as u32).to_le_bytes())?;
        for (group, version, kind, namespace) in &self.gvk_namespace_tuples {
            write_string(w, group)?;
            write_string(w, version)?;
            write_string(w, kind)?;
            write_string(w, namespace)?;
        }
        w.write_all(&(self.namespaces.len() as u32).to_le_bytes())?;
        for ns in &self.namespaces {
            write_string(w, ns)?;
        }
        w.write_all(&(self.kinds.len() as u32).to_le_bytes())?;
        for kind in &self.kinds {
            write_string(w, kind)?;
        }
        Ok(())
    }

    fn read_from(r: &mut ByteReader) -> Result<Self> {
        let tuple_count = r.read_u32()?;
        let mut gvk_namespace_tuples = BTreeSet::new();
        for _ in 0..tuple_count {
            let group = r.read_string()?;
            let version = r.read_string()?;
            let kind = r.read_string()?;
            let namespace = r.read_string()?;
            gvk_namespace_tuples.insert((group, version, kind, namespace));
        }
        let ns_count = r.read_u32()?;
        let mut namespaces = BTreeSet::new();
        for _ in 0..ns_count {
            namespaces.insert(r.read_string()?);
        }
        let kind_count = r.read_u32()?;
        let mut kinds = BTreeSet::new();
        for _ in 0..kind_count {
            kinds.insert(r.read_string()?);
        }
        Ok(Self {
            gvk_namespace_tuples,
            namespaces,
            kinds,
        })
    }
}

impl BlockMeta {
    fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.block_id.to_le_bytes())?;
        w.write_all(&self.offset.to_le_bytes())?;
        w.write_all(&self.length.to_le_bytes())?;
        w.write_all(&self.uncompressed_size.to_le_bytes())?;
        w.write_all(&self.compressed_size.to_le_bytes())?;
        w.write_all(&self.event_count.to_le_bytes())?;
        w.write_all(&self.min_ts_ns.to_le_bytes())?;
        w.write_all(&self.max_ts_ns.to_le_bytes())?;
        w.write_all(&[self.compression.to_u8()])?;
        w.write_all(&self.digest)?;
        self.segment_metadata.write_to(w)?;
        Ok(())
    }

    fn read_from(r: &mut ByteReader) -> Result<Self> {
        let block_id = r.read_u32()?;
        let offset = r.read_u64()?;
        let length = r.read_u64()?;
        let uncompressed_size = r.read_u64()?;
        let compressed_size = r.read_u64()?;
        let event_count = r.read_u32()?;
        let min_ts_ns = r.read_u64()?;
        let max_ts_ns = r.read_u64()?;
        let compression = CompressionAlgo::from_u8(r.read_u8()?)?;
        let digest = r.read_digest()?;
        let segment_metadata = SegmentMetadata::read_from(r)?;
        let meta = Self {
            block_id,
            offset,
            length,
            uncompressed_size,
            compressed_size,
            event_count,
            min_ts_ns,
            max_ts_ns,
            compression,
            segment_metadata,
            digest,
        };
        meta.validate()?;
        Ok(meta)
    }
}

fn write_index_map<W: Write>(w: &mut W, index: &BTreeMap<String, Vec<u32>>) -> Result<()> {
    w.write_all(&(index.len() as u32).to_le_bytes())?;
    for (key, ids) in index {
        write_string(w, key)?;
        w.write_all(&(ids.len() as u32).to_le_bytes())?;
        for id in ids {
            w.write_all(&id.to_le_bytes())?;
        }
    }
    Ok(())
}

fn read_index_map(r: &mut ByteReader) -> Result<BTreeMap<String, Vec<u32>>> {
    let count = r.read_u32()?;
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let key = r.read_string()?;
        let id_count = r.read_u32()?;
        let mut ids = Vec::with_capacity(id_count as usize);
        for _ in 0..id_count {
            ids.push(r.read_u32()?);
        }
        map.insert(key, ids);
    }
    Ok(map)
}

impl IndexSection {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_all(&FORMAT_VERSION.to_le_bytes())?;
        buf.write_all(&(self.blocks.len() as u32).to_le_bytes())?;
        for block in &self.blocks {
            block.write_to(&mut buf)?;
        }
        write_index_map(&mut buf, &self.kind_index)?;
        write_index_map(&mut buf, &self.namespace_index)?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let version = u16::from_le_bytes(r.take(2)?.try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(SpectreError::BadFormat(format!(
                "unsupported index section version {version}"
            )));
        }
        let block_count = r.read_u32()?;
        let mut blocks = Vec::with_capacity(block_count as usize);
        for _ in 0..block_count {
            blocks.push(BlockMeta::read_from(&mut r)?);
        }
        let kind_index = read_index_map(&mut r)?;
        let namespace_index = read_index_map(&mut r)?;
        Ok(Self {
            blocks,
            kind_index,
            namespace_index,
        })
    }
}
