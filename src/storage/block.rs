//! Block payload codec: event packing, compression, and the integrity
//! digest each block carries over its compressed bytes.

use crate::error::{Result, SpectreError};
use crate::model::Event;
use crate::storage::types::CompressionAlgo;

/// Pack events into the block payload: a length-prefixed sequence of
/// `u32 event_len` + event bytes, per the block file format.
pub fn encode_events(events: &[Event]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for event in events {
        let encoded = event.encode()?;
        buf.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        buf.extend_from_slice(&encoded);
    }
    Ok(buf)
}

/// Unpack a decompressed block payload back into its events, preserving
/// write order.
pub fn decode_events(bytes: &[u8]) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        if pos + 4 > bytes.len() {
            return Err(SpectreError::BadFormat(
                "block payload truncated mid event-length prefix".into(),
            ));
        }
        let len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if pos + len > bytes.len() {
            return Err(SpectreError::BadFormat(
                "block payload truncated mid event body".into(),
            ));
        }
        events.push(Event::decode(&bytes[pos..pos + len])?);
        pos += len;
    }
    Ok(events)
}

/// Compress a block payload with the given algorithm.
pub fn compress(payload: &[u8], algo: CompressionAlgo) -> Result<Vec<u8>> {
    match algo {
        CompressionAlgo::Zstd => {
            zstd::bulk::compress(payload, 0).map_err(|e| SpectreError::Internal(e.to_string()))
        }
        CompressionAlgo::None => Ok(payload.to_vec()),
    }
}

/// Decompress a block's compressed bytes back into its raw payload.
/// `uncompressed_size` comes from the block's recorded metadata and bounds
/// the zstd decompression buffer.
pub fn decompress(compressed: &[u8], algo: CompressionAlgo, uncompressed_size: usize) -> Result<Vec<u8>> {
    match algo {
        CompressionAlgo::Zstd => zstd::bulk::decompress(compressed, uncompressed_size)
            .map_err(|e| SpectreError::Corruption {
                context: "block decompression".into(),
                block_id: u32::MAX,
                reason: e.to_string(),
            }),
        CompressionAlgo::None => Ok(compressed.to_vec()),
    }
}

/// Compute the integrity digest over a block's compressed bytes.
pub fn digest(compressed: &[u8]) -> [u8; 32] {
    *blake3::hash(compressed).as_bytes()
}

/// Verify a block's compressed bytes against its recorded digest,
/// attributing the error to `block_id` on mismatch.
pub fn verify_digest(compressed: &[u8], expected: &[u8; 32], block_id: u32) -> Result<()> {
    let actual = digest(compressed);
    if &actual != expected {
        return Err(SpectreError::Corruption {
            context: "block digest".into(),
            block_id,
            reason: "digest mismatch".into(),
        });
    }
    Ok(())
}
