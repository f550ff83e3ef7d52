#![forbid(unsafe_code)]

//! Content-info extraction from response headers.

use fermata_core::ContentInfo;

use crate::{
    error::{NetError, NetResult},
    types::Headers,
};

/// Build a [`ContentInfo`] from probe response headers.
///
/// Total length prefers `Content-Range: bytes a-b/total` (what a 206 ranged
/// probe reports) and falls back to `Content-Length`. `Accept-Ranges: bytes`
/// sets range support; `Content-Type` sets the mime type.
///
/// # Errors
///
/// Returns [`NetError::InvalidResponse`] when neither header yields a total
/// length.
pub fn parse_content_info(headers: &Headers) -> NetResult<ContentInfo> {
    let from_content_range = headers.get("content-range").and_then(content_range_total);
    let from_content_length = headers
        .get("content-length")
        .and_then(|v| v.trim().parse::<u64>().ok());

    let total_length = from_content_range.or(from_content_length).ok_or_else(|| {
        NetError::InvalidResponse("no usable Content-Range or Content-Length header".to_string())
    })?;

    let supports_ranges = headers
        .get("accept-ranges")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes"));

    let mime = headers.get("content-type").map(str::to_string);

    let mut info = ContentInfo::new(total_length).with_range_support(supports_ranges);
    if let Some(mime) = mime {
        info = info.with_mime(mime);
    }
    Ok(info)
}

/// Total from `bytes a-b/total`. `bytes a-b/*` (unknown total) yields `None`.
fn content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.rsplit_once('/')?;
    total.trim().parse::<u64>().ok()
}

/// First byte offset from `bytes a-b/total`. `bytes */total` yields `None`.
pub(crate) fn content_range_start(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, _) = rest.rsplit_once('/')?;
    let (start, _) = span.split_once('-')?;
    start.trim().parse::<u64>().ok()
}
