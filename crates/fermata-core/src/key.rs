#![forbid(unsafe_code)]

//! Stable cache identity for media resources.
//!
//! A [`ResourceKey`] survives the URL mangling the interception layer
//! performs: the custom scheme and the marker query parameter added by
//! [`rewrite`](crate::rewrite) never affect the key, and neither do query
//! strings, fragments, case differences, or default ports.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{CoreError, CoreResult};
use crate::rewrite;

/// Stable cache key for a single media resource.
///
/// Derived from the canonical form of the resource's original URL. The key
/// embeds the final path segment after the digest so cache entries remain
/// recognizable in logs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Use `raw` verbatim as the key. Intended for tests and non-URL
    /// resource names.
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    /// Derive the key from a URL, undoing interception rewriting first.
    ///
    /// URLs that differ only in interception scheme, query, fragment,
    /// scheme/host case, or default port all map to the same key.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let origin = rewrite::to_original(url);
        let canonical =
            canonicalize_for_key(&origin).unwrap_or_else(|_| origin.as_str().to_string());

        let digest = Sha256::digest(canonical.as_bytes());
        let short = hex::encode(&digest[..16]);

        let name = origin
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("index");

        Self(format!("{short}-{name}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize a URL for key derivation.
///
/// Removes query and fragment, lowercases scheme and host, strips default
/// ports.
///
/// # Errors
///
/// Returns [`CoreError::MissingComponent`] when the URL has no host.
pub fn canonicalize_for_key(url: &Url) -> CoreResult<String> {
    if url.host().is_none() {
        return Err(CoreError::MissingComponent("host".to_string()));
    }

    let mut canonical = url.clone();

    canonical.set_fragment(None);
    canonical.set_query(None);

    let scheme = canonical.scheme();
    let scheme_lower = scheme.to_lowercase();
    if scheme != scheme_lower {
        let _ = canonical.set_scheme(&scheme_lower);
    }

    if let Some(host) = canonical.host_str() {
        let host_lower = host.to_lowercase();
        if host != host_lower {
            let _ = canonical.set_host(Some(&host_lower));
        }
    }

    match (canonical.scheme(), canonical.port()) {
        ("https", Some(443)) | ("http", Some(80)) => {
            let _ = canonical.set_port(None);
        }
        _ => {}
    }

    Ok(canonical.to_string())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::rewrite;

    fn parse(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[rstest]
    #[case(
        "https://example.com/track.mp3?token=123#t=30",
        "https://example.com/track.mp3",
        "query and fragment must not affect identity"
    )]
    #[case(
        "HTTPS://EXAMPLE.COM/track.mp3",
        "https://example.com/track.mp3",
        "scheme and host case must not affect identity"
    )]
    #[case(
        "https://example.com:443/track.mp3",
        "https://example.com/track.mp3",
        "default port must not affect identity"
    )]
    fn same_resource_same_key(#[case] a: &str, #[case] b: &str, #[case] why: &str) {
        assert_eq!(
            ResourceKey::from_url(&parse(a)),
            ResourceKey::from_url(&parse(b)),
            "{why}"
        );
    }

    #[test]
    fn different_paths_different_keys() {
        let a = ResourceKey::from_url(&parse("https://example.com/a.mp3"));
        let b = ResourceKey::from_url(&parse("https://example.com/b.mp3"));
        assert_ne!(a, b);
    }

    #[test]
    fn intercepted_url_derives_same_key() {
        let original = parse("https://cdn.example.com/track.mp3");
        let intercepted =
            rewrite::to_intercept(&original, rewrite::DEFAULT_INTERCEPT_SCHEME).unwrap();

        assert_eq!(
            ResourceKey::from_url(&original),
            ResourceKey::from_url(&intercepted)
        );
    }

    #[test]
    fn key_embeds_final_path_segment() {
        let key = ResourceKey::from_url(&parse("https://example.com/media/track.mp3"));
        assert!(key.as_str().ends_with("-track.mp3"));
    }

    #[test]
    fn hostless_url_falls_back_to_raw_string() {
        // No host: canonicalization refuses, raw URL is hashed instead.
        let key = ResourceKey::from_url(&parse("data:text/plain,hello"));
        assert!(!key.as_str().is_empty());
    }

    #[test]
    fn explicit_key_is_verbatim() {
        let key = ResourceKey::new("track.mp3");
        assert_eq!(key.as_str(), "track.mp3");
        assert_eq!(key.to_string(), "track.mp3");
    }
}
