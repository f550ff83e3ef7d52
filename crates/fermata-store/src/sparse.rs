#![forbid(unsafe_code)]

//! Sparse byte storage for partially cached resources.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use fermata_core::ByteRange;

/// Byte chunks keyed by start offset.
///
/// Writes coalesce with overlapping and adjacent chunks, so chunk boundaries
/// always mirror the record's coverage set: any fully covered range lives in
/// exactly one chunk, and reads are zero-copy slices.
#[derive(Clone, Debug, Default)]
pub struct SparseBytes {
    chunks: BTreeMap<u64, Bytes>,
}

impl SparseBytes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `bytes` at `range`, merging with every overlapping or adjacent
    /// chunk. Overlapped stored bytes are overwritten in place; callers
    /// merging gap-derived ranges never actually overlap, but the operation
    /// stays correct when they do.
    ///
    /// `bytes.len()` must equal `range.length`; the record validates this
    /// before calling.
    pub fn write(&mut self, range: ByteRange, bytes: Bytes) {
        debug_assert_eq!(bytes.len() as u64, range.length);
        if range.is_empty() {
            return;
        }

        // Chunks touching [start, end]: overlap or exact adjacency.
        let touching: Vec<u64> = self
            .chunks
            .range(..=range.end())
            .filter(|(start, chunk)| **start + chunk.len() as u64 >= range.start)
            .map(|(start, _)| *start)
            .collect();

        if touching.is_empty() {
            self.chunks.insert(range.start, bytes);
            return;
        }

        let first = touching[0].min(range.start);
        let last_start = *touching.last().expect("non-empty");
        let last_end = last_start + self.chunks[&last_start].len() as u64;
        let merged_end = last_end.max(range.end());

        let mut merged = BytesMut::with_capacity((merged_end - first) as usize);
        merged.put_bytes(0, (merged_end - first) as usize);
        for start in touching {
            let chunk = self.chunks.remove(&start).expect("key came from the map");
            let at = (start - first) as usize;
            merged[at..at + chunk.len()].copy_from_slice(&chunk);
        }
        let at = (range.start - first) as usize;
        merged[at..at + bytes.len()].copy_from_slice(&bytes);

        self.chunks.insert(first, merged.freeze());
    }

    /// Contiguous bytes for `range`, `None` unless fully covered.
    #[must_use]
    pub fn read(&self, range: ByteRange) -> Option<Bytes> {
        if range.is_empty() {
            return Some(Bytes::new());
        }

        let (start, chunk) = self.chunks.range(..=range.start).next_back()?;
        let end = start + chunk.len() as u64;
        if end < range.end() {
            return None;
        }

        let offset = (range.start - start) as usize;
        Some(chunk.slice(offset..offset + range.length as usize))
    }

    /// One blob covering `[0, total)`, `None` unless fully covered.
    #[must_use]
    pub fn flatten(&self, total: u64) -> Option<Bytes> {
        self.read(ByteRange::new(0, total))
    }

    /// Total stored bytes across all chunks.
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        self.chunks.values().map(|c| c.len() as u64).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of discontiguous chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}
