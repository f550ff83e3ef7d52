#![forbid(unsafe_code)]

//! # fermata-net
//!
//! The network collaborator of the range cache: a [`Net`] trait with a
//! reqwest-backed [`HttpClient`], byte-range requests via `Range` headers,
//! and content-info probing (total length, mime type, range support) from
//! response headers.

mod client;
mod error;
mod info;
mod traits;
mod types;

pub use client::HttpClient;
pub use error::{NetError, NetResult};
pub use info::parse_content_info;
pub use traits::{ByteStream, Net};
pub use types::{Headers, NetOptions, RangeSpec};
