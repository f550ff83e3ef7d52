#![forbid(unsafe_code)]

//! # fermata-core
//!
//! Shared primitives for the fermata range cache:
//! - [`ByteRange`] / [`RangeSet`]: coalescing byte-interval bookkeeping
//! - [`ResourceKey`]: stable cache identity, insensitive to interception
//!   URL rewriting
//! - [`rewrite`]: the scheme-swap helpers used to route player requests
//!   through the cache

mod content_info;
mod error;
mod key;
mod range;
pub mod rewrite;

pub use content_info::ContentInfo;
pub use error::{CoreError, CoreResult};
pub use key::{ResourceKey, canonicalize_for_key};
pub use range::{ByteRange, RangeSet};
