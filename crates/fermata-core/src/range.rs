#![forbid(unsafe_code)]

//! Byte intervals and the coalescing [`RangeSet`].
//!
//! [`ByteRange`] is a half-open `[start, start + length)` interval over a
//! resource's byte space. [`RangeSet`] keeps an ordered collection of such
//! intervals, merging overlapping and adjacent members on insert, backed by
//! `rangemap::RangeSet`.

use std::fmt;
use std::ops::Range;

/// Half-open byte interval `[start, start + length)`.
///
/// Ranges are compared and keyed by `(start, end)`. A range entering the
/// cache always has `length > 0`; zero-length requests are rejected at the
/// engine boundary before any range math runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteRange {
    pub start: u64,
    pub length: u64,
}

impl ByteRange {
    #[must_use]
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// Build from half-open bounds. `end <= start` yields an empty range.
    #[must_use]
    pub fn from_bounds(start: u64, end: u64) -> Self {
        Self {
            start,
            length: end.saturating_sub(start),
        }
    }

    /// Exclusive end offset, clamped to `u64::MAX`. A range whose nominal end
    /// would pass `u64::MAX` addresses bytes no resource can have; clamping
    /// keeps the math total and such requests fall out as unservable.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[must_use]
    pub fn to_std(&self) -> Range<u64> {
        self.start..self.end()
    }

    /// Intersection with `other`, `None` when disjoint or empty.
    #[must_use]
    pub fn intersect(&self, other: &ByteRange) -> Option<ByteRange> {
        let start = self.start.max(other.start);
        let end = self.end().min(other.end());
        (end > start).then(|| ByteRange::from_bounds(start, end))
    }

    /// True when one range starts exactly where the other ends.
    #[must_use]
    pub fn is_adjacent(&self, other: &ByteRange) -> bool {
        self.end() == other.start || other.end() == self.start
    }
}

impl From<Range<u64>> for ByteRange {
    fn from(range: Range<u64>) -> Self {
        Self::from_bounds(range.start, range.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

/// Ordered set of pairwise non-overlapping, non-adjacent byte ranges.
///
/// Inserting a range coalesces it with every overlapping or adjacent member,
/// so the set invariant holds after any insertion order. `rangemap` provides
/// the merge and gap walking; this wrapper fixes the domain vocabulary
/// ([`ByteRange`] in, [`ByteRange`] out).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RangeSet {
    inner: rangemap::RangeSet<u64>,
}

impl RangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `range`, merging overlapping and adjacent members into one.
    /// Empty ranges are ignored.
    pub fn insert(&mut self, range: ByteRange) {
        if !range.is_empty() {
            self.inner.insert(range.to_std());
        }
    }

    /// The portions of `query` not covered by any member, ascending.
    ///
    /// Returns `query` itself when nothing intersects it; every returned
    /// range lies within `query`'s bounds.
    #[must_use]
    pub fn gaps(&self, query: ByteRange) -> Vec<ByteRange> {
        if query.is_empty() {
            return Vec::new();
        }
        self.inner
            .gaps(&query.to_std())
            .map(ByteRange::from)
            .collect()
    }

    /// The member containing `point`, if any. At most one exists since
    /// members never overlap; a linear scan is fine at the member counts a
    /// single resource produces.
    #[must_use]
    pub fn contains(&self, point: u64) -> Option<ByteRange> {
        self.inner
            .iter()
            .find(|r| r.start <= point && point < r.end)
            .map(|r| ByteRange::from(r.clone()))
    }

    /// True iff every byte of `range` is covered by some member.
    #[must_use]
    pub fn covers(&self, range: ByteRange) -> bool {
        if range.is_empty() {
            return true;
        }
        !self.inner.gaps(&range.to_std()).any(|_| true)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.iter().next().is_none()
    }

    /// Number of (coalesced) members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.iter().count()
    }

    pub fn iter(&self) -> impl Iterator<Item = ByteRange> + '_ {
        self.inner.iter().map(|r| ByteRange::from(r.clone()))
    }

    pub fn clear(&mut self) {
        self.inner = rangemap::RangeSet::new();
    }
}

impl FromIterator<ByteRange> for RangeSet {
    fn from_iter<I: IntoIterator<Item = ByteRange>>(iter: I) -> Self {
        let mut set = Self::new();
        for range in iter {
            set.insert(range);
        }
        set
    }
}
