//! File chunking and inbound reassembly
//!
//! Outbound files are split into fixed-size fragments and base64-encoded for
//! the text wire format. Inbound fragments accumulate in a [`ChunkStore`]
//! keyed by file id until every declared index has arrived, then reassemble
//! in index order.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::collections::HashMap;
use std::sync::Mutex;

/// Split raw bytes into base64-encoded chunks of at most `chunk_size` raw
/// bytes each; the last chunk may be shorter.
pub fn chunk_payloads(data: &[u8], chunk_size: usize) -> Vec<String> {
    data.chunks(chunk_size).map(|c| BASE64.encode(c)).collect()
}

#[derive(Debug)]
struct InboundTransfer {
    total_chunks: u32,
    chunks: HashMap<u32, String>,
}

/// Accumulates inbound file fragments per transfer.
///
/// Internally synchronized: duplicate deliveries of the same index over the
/// unreliable transport are ignored rather than overwriting a stored slot,
/// and all operations are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct ChunkStore {
    transfers: Mutex<HashMap<String, InboundTransfer>>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one fragment. The first fragment seen for a file id records the
    /// declared total; a repeated index is logged and ignored.
    pub fn add_chunk(&self, file_id: &str, index: u32, total_chunks: u32, payload: &str) {
        let mut transfers = self.transfers.lock().unwrap();
        let transfer = transfers.entry(file_id.to_string()).or_insert_with(|| {
            tracing::debug!(file_id, total_chunks, "tracking new inbound transfer");
            InboundTransfer {
                total_chunks,
                chunks: HashMap::new(),
            }
        });

        if transfer.chunks.contains_key(&index) {
            tracing::debug!(file_id, index, "duplicate chunk ignored");
            return;
        }
        transfer.chunks.insert(index, payload.to_string());
        tracing::debug!(
            file_id,
            index,
            received = transfer.chunks.len(),
            expected = transfer.total_chunks,
            "chunk stored"
        );
    }

    /// True iff every declared index has arrived
    pub fn is_complete(&self, file_id: &str) -> bool {
        let transfers = self.transfers.lock().unwrap();
        transfers
            .get(file_id)
            .map(|t| t.chunks.len() as u32 == t.total_chunks)
            .unwrap_or(false)
    }

    /// Number of distinct fragments stored so far
    pub fn received(&self, file_id: &str) -> usize {
        let transfers = self.transfers.lock().unwrap();
        transfers.get(file_id).map(|t| t.chunks.len()).unwrap_or(0)
    }

    /// Decode and concatenate fragments in index order. Any missing index or
    /// undecodable payload is an error; no partial output is ever produced.
    pub fn reassemble(&self, file_id: &str) -> Result<Vec<u8>> {
        let transfers = self.transfers.lock().unwrap();
        let transfer = transfers
            .get(file_id)
            .ok_or_else(|| Error::InvalidData(format!("unknown file id {file_id}")))?;

        let mut data = Vec::new();
        for index in 0..transfer.total_chunks {
            let payload = transfer.chunks.get(&index).ok_or_else(|| {
                Error::InvalidData(format!("missing chunk {index} for file {file_id}"))
            })?;
            data.extend_from_slice(&BASE64.decode(payload)?);
        }
        tracing::debug!(file_id, bytes = data.len(), "reassembled inbound transfer");
        Ok(data)
    }

    /// Discard all state for a file id. Called after delivery confirmation,
    /// and also usable to abandon a transfer that will never complete.
    pub fn remove(&self, file_id: &str) {
        if self.transfers.lock().unwrap().remove(file_id).is_some() {
            tracing::debug!(file_id, "removed inbound transfer state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_payloads_sizes() {
        let data = vec![0x42u8; 2500];
        let chunks = chunk_payloads(&data, 1024);
        assert_eq!(chunks.len(), 3);
        assert_eq!(BASE64.decode(&chunks[0]).unwrap().len(), 1024);
        assert_eq!(BASE64.decode(&chunks[1]).unwrap().len(), 1024);
        assert_eq!(BASE64.decode(&chunks[2]).unwrap().len(), 452);
    }

    #[test]
    fn test_out_of_order_arrival_reassembles() {
        // 2500 bytes at 1024 per chunk, arriving 2, 0, 1
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        let chunks = chunk_payloads(&data, 1024);

        let store = ChunkStore::new();
        store.add_chunk("f1", 2, 3, &chunks[2]);
        assert!(!store.is_complete("f1"));
        store.add_chunk("f1", 0, 3, &chunks[0]);
        assert!(!store.is_complete("f1"));
        store.add_chunk("f1", 1, 3, &chunks[1]);
        assert!(store.is_complete("f1"));

        assert_eq!(store.reassemble("f1").unwrap(), data);
    }

    #[test]
    fn test_incomplete_reassembly_fails_without_partial_output() {
        let store = ChunkStore::new();
        store.add_chunk("f1", 0, 3, &BASE64.encode(b"aaa"));
        store.add_chunk("f1", 2, 3, &BASE64.encode(b"ccc"));
        assert!(!store.is_complete("f1"));
        assert!(store.reassemble("f1").is_err());
    }

    #[test]
    fn test_duplicate_index_does_not_overwrite() {
        let store = ChunkStore::new();
        store.add_chunk("f1", 0, 1, &BASE64.encode(b"original"));
        store.add_chunk("f1", 0, 1, &BASE64.encode(b"imposter"));
        assert!(store.is_complete("f1"));
        assert_eq!(store.reassemble("f1").unwrap(), b"original");
    }

    #[test]
    fn test_remove_discards_state() {
        let store = ChunkStore::new();
        store.add_chunk("f1", 0, 1, &BASE64.encode(b"x"));
        assert!(store.is_complete("f1"));
        store.remove("f1");
        assert!(!store.is_complete("f1"));
        assert_eq!(store.received("f1"), 0);
    }

    #[test]
    fn test_unknown_file_id() {
        let store = ChunkStore::new();
        assert!(!store.is_complete("nope"));
        assert!(store.reassemble("nope").is_err());
    }
}
