#![forbid(unsafe_code)]

use std::{collections::HashMap, time::Duration};

/// Response/request header map.
///
/// Lookup is ASCII-case-insensitive, matching HTTP header semantics; reqwest
/// reports names lowercased but test servers and intermediaries may not.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.inner.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

}

impl From<HashMap<String, String>> for Headers {
    fn from(map: HashMap<String, String>) -> Self {
        Self { inner: map }
    }
}

/// Byte range for an HTTP `Range` header. `end` is inclusive, per RFC 7233.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    #[must_use]
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    /// The inclusive-end header form for a half-open `[start, end)` range.
    #[must_use]
    pub fn from_bounds(start: u64, end_exclusive: u64) -> Self {
        Self {
            start,
            end: Some(end_exclusive.saturating_sub(1)),
        }
    }

    #[must_use]
    pub fn to_header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Network configuration.
#[derive(Clone, Debug)]
pub struct NetOptions {
    /// Timeout for probe requests and range-request initiation. Streaming
    /// bodies are not deadline-bounded.
    pub request_timeout: Duration,
    /// Max idle connections per host. 0 disables pooling.
    pub pool_max_idle_per_host: usize,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 0,
        }
    }
}
