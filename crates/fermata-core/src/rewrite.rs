#![forbid(unsafe_code)]

//! Interception URL rewriting.
//!
//! To route a player's loading requests through the cache, the resource URL
//! is handed to the player under a custom scheme; the original scheme is
//! preserved in a marker query parameter so the network layer can restore
//! the real URL. [`to_intercept`] and [`to_original`] are exact inverses for
//! any URL with a host.

use url::Url;

use crate::error::{CoreError, CoreResult};

/// Scheme used for intercepted URLs unless the caller configures another.
pub const DEFAULT_INTERCEPT_SCHEME: &str = "fermata";

/// Query parameter carrying the original scheme of an intercepted URL.
pub const ORIGIN_SCHEME_PARAM: &str = "__origin_scheme";

/// Rewrite `url` onto `scheme`, tagging it with the original scheme.
///
/// Already-intercepted URLs (those carrying the marker parameter) are
/// returned unchanged.
///
/// # Errors
///
/// Returns [`CoreError::InvalidUrl`] when the rewritten string does not
/// parse back into a URL.
pub fn to_intercept(url: &Url, scheme: &str) -> CoreResult<Url> {
    if origin_scheme(url).is_some() {
        return Ok(url.clone());
    }

    let mut tagged = url.clone();
    tagged
        .query_pairs_mut()
        .append_pair(ORIGIN_SCHEME_PARAM, url.scheme());

    swap_scheme(&tagged, scheme)
}

/// Restore the original URL from an intercepted one.
///
/// URLs without the marker parameter are returned unchanged, so this is
/// safe to call on every inbound URL.
#[must_use]
pub fn to_original(url: &Url) -> Url {
    let Some(origin) = origin_scheme(url) else {
        return url.clone();
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != ORIGIN_SCHEME_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut cleaned = url.clone();
    cleaned.set_query(None);
    if !kept.is_empty() {
        cleaned.query_pairs_mut().extend_pairs(kept);
    }

    swap_scheme(&cleaned, &origin).unwrap_or_else(|_| url.clone())
}

fn origin_scheme(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == ORIGIN_SCHEME_PARAM)
        .map(|(_, v)| v.into_owned())
}

/// Replace the scheme by re-parsing. `Url::set_scheme` refuses conversions
/// between special and non-special schemes, which is exactly the transition
/// interception needs.
fn swap_scheme(url: &Url, scheme: &str) -> CoreResult<Url> {
    let rest = url
        .as_str()
        .split_once(':')
        .map(|(_, rest)| rest)
        .ok_or_else(|| CoreError::InvalidUrl(url.as_str().to_string()))?;

    Url::parse(&format!("{scheme}:{rest}")).map_err(|e| CoreError::InvalidUrl(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn intercept_swaps_scheme_and_tags_origin() {
        let url = parse("https://cdn.example.com/track.mp3");
        let rewritten = to_intercept(&url, DEFAULT_INTERCEPT_SCHEME).unwrap();

        assert_eq!(rewritten.scheme(), DEFAULT_INTERCEPT_SCHEME);
        assert!(
            rewritten
                .query_pairs()
                .any(|(k, v)| k == ORIGIN_SCHEME_PARAM && v == "https")
        );
    }

    #[test]
    fn round_trip_restores_original() {
        let url = parse("https://cdn.example.com/track.mp3?token=abc");
        let rewritten = to_intercept(&url, DEFAULT_INTERCEPT_SCHEME).unwrap();
        let restored = to_original(&rewritten);

        assert_eq!(restored, url);
    }

    #[test]
    fn round_trip_without_query() {
        let url = parse("http://example.com/a/b/c.m4a");
        let restored = to_original(&to_intercept(&url, "streaming").unwrap());
        assert_eq!(restored, url);
    }

    #[test]
    fn to_original_is_identity_for_plain_urls() {
        let url = parse("https://example.com/track.mp3?q=1");
        assert_eq!(to_original(&url), url);
    }

    #[test]
    fn to_intercept_is_idempotent() {
        let url = parse("https://example.com/track.mp3");
        let once = to_intercept(&url, DEFAULT_INTERCEPT_SCHEME).unwrap();
        let twice = to_intercept(&once, DEFAULT_INTERCEPT_SCHEME).unwrap();
        assert_eq!(once, twice);
    }
}
