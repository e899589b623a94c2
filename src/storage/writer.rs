//! Write path for one hour-file: buffers events into blocks, flushes full
//! blocks to disk, and finalizes the index + footer on `close`.
//!
//! Grounded on the teacher's `storage_v2/writer.rs` `finish()` shape
//! (accumulate in memory, write sections in a fixed order, patch/append a
//! trailer once everything else is down) generalized from "one-shot
//! whole-segment write" to "incremental block-at-a-time append with an
//! in-progress index accumulated in memory until `Close`".

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SpectreError};
use crate::model::Event;
use crate::storage::block;
use crate::storage::types::{
    BlockMeta, CompressionAlgo, Footer, HourFileHeader, IndexSection, SegmentMetadata,
    FOOTER_SIZE, HEADER_SIZE,
};

/// Metadata returned once a `HourFileWriter` is closed: everything a
/// `StorageEngine` needs to register the file as readable.
#[derive(Debug, Clone)]
pub struct HourFileSummary {
    pub path: PathBuf,
    pub hour_epoch: u64,
    pub total_event_count: u64,
    pub blocks: Vec<BlockMeta>,
    pub kind_index: BTreeMap<String, Vec<u32>>,
    pub namespace_index: BTreeMap<String, Vec<u32>>,
}

/// Write path for a single hour's worth of events.
pub struct HourFileWriter {
    file: BufWriter<File>,
    path: PathBuf,
    hour_epoch: u64,
    block_size: u64,
    next_block_id: u32,
    cursor: u64,
    pending: Vec<Event>,
    pending_uncompressed_size: u64,
    blocks: Vec<BlockMeta>,
    kind_index: BTreeMap<String, Vec<u32>>,
    namespace_index: BTreeMap<String, Vec<u32>>,
    total_event_count: u64,
}

impl HourFileWriter {
    /// Create the hour-file at `path` and write its header.
    pub fn open(path: impl AsRef<Path>, hour_epoch: u64, block_size: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut file = BufWriter::new(file);
        HourFileHeader { hour_epoch }.write_to(&mut file)?;
        Ok(Self {
            file,
            path,
            hour_epoch,
            block_size,
            next_block_id: 0,
            cursor: HEADER_SIZE as u64,
            pending: Vec::new(),
            pending_uncompressed_size: 0,
            blocks: Vec::new(),
            kind_index: BTreeMap::new(),
            namespace_index: BTreeMap::new(),
            total_event_count: 0,
        })
    }

    /// Append an event to the current block buffer, rotating the block
    /// first if it would overflow a non-empty buffer.
    pub fn write(&mut self, event: Event) -> Result<()> {
        let encoded = event.encode()?;
        let entry_size = 4 + encoded.len() as u64; // length-prefix + body

        if entry_size > self.block_size {
            return Err(SpectreError::TooLarge(format!(
                "event {} ({} bytes) exceeds block size cap ({} bytes)",
                event.id, entry_size, self.block_size
            )));
        }

        if !self.pending.is_empty() && self.pending_uncompressed_size + entry_size > self.block_size {
            self.flush_block()?;
        }

        self.pending_uncompressed_size += entry_size;
        self.pending.push(event);

        if self.pending_uncompressed_size >= self.block_size {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Finalize the current block buffer (no-op if empty).
    fn flush_block(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let events = std::mem::take(&mut self.pending);
        self.pending_uncompressed_size = 0;

        let mut segment_metadata = SegmentMetadata::default();
        let mut min_ts_ns = u64::MAX;
        let mut max_ts_ns = 0u64;
        for event in &events {
            min_ts_ns = min_ts_ns.min(event.ts_ns);
            max_ts_ns = max_ts_ns.max(event.ts_ns);
            segment_metadata.kinds.insert(event.metadata.kind.clone());
            segment_metadata
                .namespaces
                .insert(event.metadata.namespace.clone());
            segment_metadata.gvk_namespace_tuples.insert((
                event.metadata.api_group.clone(),
                event.metadata.api_version.clone(),
                event.metadata.kind.clone(),
                event.metadata.namespace.clone(),
            ));
        }

        let payload = block::encode_events(&events)?;
        let uncompressed_size = payload.len() as u64;
        let compressed = block::compress(&payload, CompressionAlgo::Zstd)?;
        let compressed_size = compressed.len() as u64;
        let digest = block::digest(&compressed);

        let block_id = self.next_block_id;
        let offset = self.cursor;
        self.file.write_all(&(compressed.len() as u32).to_le_bytes())?;
        self.file.write_all(&compressed)?;
        let length = 4 + compressed_size;
        self.cursor += length;

        let meta = BlockMeta {
            block_id,
            offset,
            length,
            uncompressed_size,
            compressed_size,
            event_count: events.len() as u32,
            min_ts_ns,
            max_ts_ns,
            compression: CompressionAlgo::Zstd,
            segment_metadata: segment_metadata.clone(),
            digest,
        };
        meta.validate()?;

        for kind in &segment_metadata.kinds {
            self.kind_index.entry(kind.clone()).or_default().push(block_id);
        }
        for ns in &segment_metadata.namespaces {
            self.namespace_index.entry(ns.clone()).or_default().push(block_id);
        }
        self.total_event_count += meta.event_count as u64;
        self.blocks.push(meta);
        self.next_block_id += 1;
        Ok(())
    }

    /// Finalize any pending block, write the index section and footer, and
    /// fsync. Any I/O failure here leaves the file without a footer — by
    /// design, such a file must never be treated as readable.
    pub fn close(mut self) -> Result<HourFileSummary> {
        self.flush_block()?;

        let index_offset = self.cursor;
        let index = IndexSection {
            blocks: self.blocks.clone(),
            kind_index: self.kind_index.clone(),
            namespace_index: self.namespace_index.clone(),
        };
        let index_bytes = index.encode()?;
        self.file.write_all(&index_bytes)?;

        let footer = Footer {
            index_offset,
            index_length: index_bytes.len() as u64,
            total_event_count: self.total_event_count,
        };
        footer.write_to(&mut self.file)?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        Ok(HourFileSummary {
            path: self.path,
            hour_epoch: self.hour_epoch,
            total_event_count: self.total_event_count,
            blocks: self.blocks,
            kind_index: self.kind_index,
            namespace_index: self.namespace_index,
        })
    }

    /// Current on-disk byte length, including the unfinalized pending
    /// block's prior flushes but not its in-memory buffer. Exposed for
    /// regression-guard tests asserting a file never sits header-only.
    pub fn bytes_written_so_far(&self) -> Result<u64> {
        let mut file = self.file.get_ref().try_clone()?;
        Ok(file.seek(SeekFrom::End(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeKind, ResourceMetadata};
    use crate::storage::reader::HourFileReader;
    use std::collections::BTreeMap as Map;
    use tempfile::tempdir;

    fn sample_event(id: &str, ts_ns: u64, kind: &str) -> Event {
        Event {
            id: id.to_string(),
            ts_ns,
            kind: ChangeKind::Update,
            metadata: ResourceMetadata {
                api_group: "".into(),
                api_version: "v1".into(),
                kind: kind.into(),
                namespace: "default".into(),
                name: id.to_string(),
                uid: format!("uid-{id}"),
                labels: Map::new(),
                first_seen_ns: ts_ns,
                last_seen_ns: ts_ns,
            },
            payload: Some(serde_json::json!({"n": 1})),
        }
    }

    #[test]
    fn write_event_too_large_is_rejected() {
        let dir = tempdir().unwrap();
        let mut writer = HourFileWriter::open(dir.path().join("x.bin"), 0, 16).unwrap();
        let err = writer.write(sample_event("a", 1, "Pod")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TooLarge);
    }

    #[test]
    fn close_with_no_writes_still_produces_finalized_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        let writer = HourFileWriter::open(&path, 0, 4096).unwrap();
        let summary = writer.close().unwrap();
        assert_eq!(summary.total_event_count, 0);
        assert!(summary.blocks.is_empty());
        // A finalized file must be strictly larger than the header alone.
        let size = std::fs::metadata(&path).unwrap().len();
        assert!(size > HEADER_SIZE as u64);
        HourFileReader::open(&path).expect("finalized empty file must be readable");
    }

    #[test]
    fn rotation_creates_multiple_blocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rot.bin");
        let mut writer = HourFileWriter::open(&path, 0, 64).unwrap();
        for i in 0..20u64 {
            writer.write(sample_event(&format!("e{i}"), 1000 + i, "Pod")).unwrap();
        }
        let summary = writer.close().unwrap();
        assert!(summary.blocks.len() > 1);
        assert_eq!(summary.total_event_count, 20);
        // Blocks are 0-based and contiguous.
        for (idx, block) in summary.blocks.iter().enumerate() {
            assert_eq!(block.block_id, idx as u32);
        }
    }

    #[test]
    fn kind_and_namespace_indexes_cover_every_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("idx.bin");
        let mut writer = HourFileWriter::open(&path, 0, 32).unwrap();
        writer.write(sample_event("a", 1, "Pod")).unwrap();
        writer.write(sample_event("b", 2, "Service")).unwrap();
        let summary = writer.close().unwrap();

        let all_block_ids: Vec<u32> = summary.blocks.iter().map(|b| b.block_id).collect();
        let mut indexed: Vec<u32> = summary
            .kind_index
            .values()
            .flatten()
            .copied()
            .collect();
        indexed.sort_unstable();
        indexed.dedup();
        assert_eq!(indexed, all_block_ids);
    }
}
