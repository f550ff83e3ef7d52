#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Resource metadata needed before data requests can be planned.
///
/// Observed once from a network probe and persisted alongside the cached
/// ranges; a later observation with a different `total_length` means the
/// remote resource changed and the cached partial data is stale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    /// Total resource length in bytes.
    pub total_length: u64,
    /// MIME type, when the server reported one.
    pub mime: Option<String>,
    /// Whether the server accepts byte-range requests.
    pub supports_ranges: bool,
}

impl ContentInfo {
    #[must_use]
    pub fn new(total_length: u64) -> Self {
        Self {
            total_length,
            mime: None,
            supports_ranges: false,
        }
    }

    #[must_use]
    pub fn with_mime<S: Into<String>>(mut self, mime: S) -> Self {
        self.mime = Some(mime.into());
        self
    }

    #[must_use]
    pub fn with_range_support(mut self, supported: bool) -> Self {
        self.supports_ranges = supported;
        self
    }
}
