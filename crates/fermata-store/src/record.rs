#![forbid(unsafe_code)]

//! Per-resource cache record: sparse while partial, one blob once complete.

use bytes::Bytes;
use fermata_core::{ByteRange, ContentInfo, RangeSet};

use crate::error::{StoreError, StoreResult};
use crate::sparse::SparseBytes;

/// Cache state for a single resource.
///
/// A record starts `Partial` with empty coverage and unknown length. Every
/// successful fetch merges bytes in; the moment coverage proves
/// `[0, total_length)` the record flattens into `Complete`. A record never
/// regresses from `Complete` to `Partial`; only a metadata conflict, which
/// discards the record entirely, starts a resource over.
#[derive(Clone, Debug)]
pub enum CacheRecord {
    Partial {
        /// Unknown until a content-info response has been observed.
        total_length: Option<u64>,
        mime: Option<String>,
        supports_ranges: bool,
        have: RangeSet,
        chunks: SparseBytes,
    },
    Complete {
        info: ContentInfo,
        bytes: Bytes,
    },
}

/// Borrowed view for planning: complete blob or coverage snapshot.
#[derive(Debug)]
pub enum RecordView<'a> {
    Complete {
        info: &'a ContentInfo,
        bytes: &'a Bytes,
    },
    Partial {
        total_length: Option<u64>,
        have: &'a RangeSet,
    },
}

impl Default for CacheRecord {
    fn default() -> Self {
        Self::new_partial()
    }
}

impl CacheRecord {
    /// Fresh record with no observed bytes or metadata.
    #[must_use]
    pub fn new_partial() -> Self {
        Self::Partial {
            total_length: None,
            mime: None,
            supports_ranges: false,
            have: RangeSet::new(),
            chunks: SparseBytes::new(),
        }
    }

    /// Synchronous, non-blocking view of the record.
    #[must_use]
    pub fn view(&self) -> RecordView<'_> {
        match self {
            Self::Complete { info, bytes } => RecordView::Complete { info, bytes },
            Self::Partial {
                total_length, have, ..
            } => RecordView::Partial {
                total_length: *total_length,
                have,
            },
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    #[must_use]
    pub fn total_length(&self) -> Option<u64> {
        match self {
            Self::Complete { info, .. } => Some(info.total_length),
            Self::Partial { total_length, .. } => *total_length,
        }
    }

    /// Full content info, once every field of it has been observed.
    #[must_use]
    pub fn content_info(&self) -> Option<ContentInfo> {
        match self {
            Self::Complete { info, .. } => Some(info.clone()),
            Self::Partial {
                total_length: Some(total),
                mime,
                supports_ranges,
                ..
            } => {
                let mut info = ContentInfo::new(*total).with_range_support(*supports_ranges);
                if let Some(mime) = mime {
                    info = info.with_mime(mime.clone());
                }
                Some(info)
            }
            Self::Partial { .. } => None,
        }
    }

    /// Record a content-info observation.
    ///
    /// The first observation pins `total_length`; a later observation with a
    /// different length is a [`StoreError::MetadataConflict`]: partial bytes
    /// cached against the old length cannot be merged against the new one,
    /// so the caller must discard this record and start fresh.
    ///
    /// # Errors
    ///
    /// [`StoreError::MetadataConflict`] as described above.
    pub fn record_content_info(&mut self, info: &ContentInfo) -> StoreResult<()> {
        match self {
            Self::Complete { info: known, .. } => {
                if known.total_length != info.total_length {
                    return Err(StoreError::MetadataConflict {
                        known: known.total_length,
                        observed: info.total_length,
                    });
                }
                Ok(())
            }
            Self::Partial {
                total_length,
                mime,
                supports_ranges,
                ..
            } => {
                if let Some(known) = *total_length
                    && known != info.total_length
                {
                    return Err(StoreError::MetadataConflict {
                        known,
                        observed: info.total_length,
                    });
                }
                *total_length = Some(info.total_length);
                if info.mime.is_some() {
                    mime.clone_from(&info.mime);
                }
                *supports_ranges = info.supports_ranges;

                // A zero-length resource is complete by definition.
                self.try_promote();
                Ok(())
            }
        }
    }

    /// Merge fetched bytes at `range` into the record.
    ///
    /// Additive only: coverage grows, stored bytes are never dropped.
    /// Merging an already-covered range is a safe rewrite. Promotes to
    /// `Complete` exactly when coverage reaches `[0, total_length)`.
    ///
    /// # Errors
    ///
    /// [`StoreError::LengthMismatch`] when `bytes.len() != range.length`.
    pub fn merge(&mut self, range: ByteRange, bytes: Bytes) -> StoreResult<()> {
        if bytes.len() as u64 != range.length {
            return Err(StoreError::LengthMismatch {
                expected: range.length,
                actual: bytes.len() as u64,
            });
        }

        match self {
            // Every byte is already present; nothing to add.
            Self::Complete { .. } => Ok(()),
            Self::Partial { have, chunks, .. } => {
                if range.is_empty() {
                    return Ok(());
                }
                chunks.write(range, bytes);
                have.insert(range);
                self.try_promote();
                Ok(())
            }
        }
    }

    /// Contiguous cached bytes for `range`, `None` unless fully covered.
    #[must_use]
    pub fn read_range(&self, range: ByteRange) -> Option<Bytes> {
        match self {
            Self::Complete { bytes, .. } => {
                if range.end() <= bytes.len() as u64 {
                    Some(bytes.slice(range.start as usize..range.end() as usize))
                } else {
                    None
                }
            }
            Self::Partial { have, chunks, .. } => {
                have.covers(range).then(|| chunks.read(range)).flatten()
            }
        }
    }

    /// The portions of `query` not yet cached, ascending.
    #[must_use]
    pub fn gaps(&self, query: ByteRange) -> Vec<ByteRange> {
        match self {
            Self::Complete { .. } => Vec::new(),
            Self::Partial { have, .. } => have.gaps(query),
        }
    }

    fn try_promote(&mut self) {
        let Self::Partial {
            total_length: Some(total),
            mime,
            supports_ranges,
            have,
            chunks,
        } = self
        else {
            return;
        };

        let total = *total;
        let blob = if total == 0 {
            Bytes::new()
        } else if have.covers(ByteRange::new(0, total)) {
            match chunks.flatten(total) {
                Some(blob) => blob,
                None => {
                    // Coverage and chunks disagree; keep the record partial
                    // rather than promote with wrong bytes.
                    tracing::warn!(total, "coverage complete but chunks not contiguous");
                    return;
                }
            }
        } else {
            return;
        };

        let mut info = ContentInfo::new(total).with_range_support(*supports_ranges);
        if let Some(mime) = mime.take() {
            info = info.with_mime(mime);
        }
        *self = Self::Complete { info, bytes: blob };
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn range(start: u64, end: u64) -> ByteRange {
        ByteRange::from_bounds(start, end)
    }

    fn payload(range: ByteRange) -> Bytes {
        (range.start..range.end())
            .map(|i| (i % 251) as u8)
            .collect::<Vec<_>>()
            .into()
    }

    fn info(total: u64) -> ContentInfo {
        ContentInfo::new(total)
            .with_mime("audio/mpeg")
            .with_range_support(true)
    }

    #[test]
    fn fresh_record_knows_nothing() {
        let record = CacheRecord::new_partial();
        assert!(!record.is_complete());
        assert_eq!(record.total_length(), None);
        assert_eq!(record.content_info(), None);
        assert_eq!(record.gaps(range(0, 100)), vec![range(0, 100)]);
    }

    #[test]
    fn content_info_pins_total_length() {
        let mut record = CacheRecord::new_partial();
        record.record_content_info(&info(1000)).unwrap();

        assert_eq!(record.total_length(), Some(1000));
        let observed = record.content_info().unwrap();
        assert_eq!(observed.mime.as_deref(), Some("audio/mpeg"));
        assert!(observed.supports_ranges);
    }

    #[test]
    fn conflicting_total_length_is_rejected() {
        let mut record = CacheRecord::new_partial();
        record.record_content_info(&info(1000)).unwrap();
        record.merge(range(0, 100), payload(range(0, 100))).unwrap();

        let err = record.record_content_info(&info(2000)).unwrap_err();
        assert_eq!(
            err,
            StoreError::MetadataConflict {
                known: 1000,
                observed: 2000
            }
        );
    }

    #[test]
    fn repeated_identical_content_info_is_fine() {
        let mut record = CacheRecord::new_partial();
        record.record_content_info(&info(1000)).unwrap();
        record.record_content_info(&info(1000)).unwrap();
        assert_eq!(record.total_length(), Some(1000));
    }

    #[rstest]
    #[case::ascending(&[(0, 40), (40, 70), (70, 100)])]
    #[case::descending(&[(70, 100), (40, 70), (0, 40)])]
    #[case::interleaved(&[(40, 70), (0, 40), (70, 100)])]
    fn promotion_in_any_merge_order(#[case] order: &[(u64, u64)]) {
        let mut record = CacheRecord::new_partial();
        record.record_content_info(&info(100)).unwrap();

        for &(start, end) in order {
            let r = range(start, end);
            record.merge(r, payload(r)).unwrap();
        }

        assert!(record.is_complete());
        assert_eq!(record.read_range(range(0, 100)), Some(payload(range(0, 100))));
    }

    #[test]
    fn no_promotion_while_total_unknown() {
        let mut record = CacheRecord::new_partial();
        record.merge(range(0, 100), payload(range(0, 100))).unwrap();
        assert!(!record.is_complete());

        record.record_content_info(&info(100)).unwrap();
        assert!(record.is_complete());
    }

    #[test]
    fn zero_length_resource_is_complete_at_info_time() {
        let mut record = CacheRecord::new_partial();
        record.record_content_info(&info(0)).unwrap();

        assert!(record.is_complete());
        assert_eq!(record.read_range(range(0, 0)), Some(Bytes::new()));
    }

    #[test]
    fn merge_length_mismatch_rejected() {
        let mut record = CacheRecord::new_partial();
        let err = record
            .merge(range(0, 10), Bytes::from_static(b"short"))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::LengthMismatch {
                expected: 10,
                actual: 5
            }
        );
    }

    #[test]
    fn merge_of_covered_range_is_idempotent() {
        let mut record = CacheRecord::new_partial();
        record.record_content_info(&info(200)).unwrap();
        record.merge(range(0, 100), payload(range(0, 100))).unwrap();
        record.merge(range(0, 100), payload(range(0, 100))).unwrap();
        record.merge(range(20, 60), payload(range(20, 60))).unwrap();

        assert_eq!(record.gaps(range(0, 200)), vec![range(100, 200)]);
        assert_eq!(record.read_range(range(0, 100)), Some(payload(range(0, 100))));
    }

    #[test]
    fn merge_into_complete_record_is_a_no_op() {
        let mut record = CacheRecord::new_partial();
        record.record_content_info(&info(10)).unwrap();
        record.merge(range(0, 10), payload(range(0, 10))).unwrap();
        assert!(record.is_complete());

        record.merge(range(0, 5), payload(range(0, 5))).unwrap();
        assert!(record.is_complete());
        assert_eq!(record.read_range(range(0, 10)), Some(payload(range(0, 10))));
    }

    #[test]
    fn read_range_requires_full_coverage() {
        let mut record = CacheRecord::new_partial();
        record.merge(range(0, 50), payload(range(0, 50))).unwrap();

        assert_eq!(record.read_range(range(0, 50)), Some(payload(range(0, 50))));
        assert_eq!(record.read_range(range(10, 30)), Some(payload(range(10, 30))));
        assert_eq!(record.read_range(range(0, 51)), None);
    }

    #[test]
    fn complete_record_rejects_reads_past_end() {
        let mut record = CacheRecord::new_partial();
        record.record_content_info(&info(10)).unwrap();
        record.merge(range(0, 10), payload(range(0, 10))).unwrap();

        assert_eq!(record.read_range(range(5, 11)), None);
    }

    #[test]
    fn view_reflects_state() {
        let mut record = CacheRecord::new_partial();
        record.record_content_info(&info(100)).unwrap();
        record.merge(range(0, 30), payload(range(0, 30))).unwrap();

        match record.view() {
            RecordView::Partial { total_length, have } => {
                assert_eq!(total_length, Some(100));
                assert!(have.covers(range(0, 30)));
            }
            RecordView::Complete { .. } => panic!("record should still be partial"),
        }

        record.merge(range(30, 100), payload(range(30, 100))).unwrap();
        assert!(matches!(record.view(), RecordView::Complete { .. }));
    }
}
