//! Cache key derivation
//!
//! Keys must be reproducible across restarts, so they are pure functions of
//! the request inputs. Thumbnails are keyed by size alone; slices by a SHA-256
//! digest over a canonical parameter string.

use crate::types::{DatasetId, SliceParams, ThumbnailParams};
use sha2::{Digest, Sha256};
use std::fmt;

/// Name of a cached artifact, without extension
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inputs to key derivation for each artifact flow
#[derive(Debug, Clone, Copy)]
pub enum KeyInput<'a> {
    Thumbnail(&'a ThumbnailParams),
    Slice(&'a DatasetId, &'a SliceParams),
}

/// Derive the cache key for a request
pub fn derive_key(input: KeyInput<'_>) -> CacheKey {
    match input {
        KeyInput::Thumbnail(params) => size_key(params.size),
        KeyInput::Slice(dataset, params) => slice_key(dataset, params),
    }
}

/// Size-qualified key shared by thumbnails and intermediate volumes
pub fn size_key(size: u32) -> CacheKey {
    CacheKey(size.to_string())
}

/// Digest key for a slice
///
/// Intensity thresholds are not part of the digest.
pub fn slice_key(dataset: &DatasetId, params: &SliceParams) -> CacheKey {
    let canonical = canonical_slice_string(dataset, params);
    let digest = Sha256::digest(canonical.as_bytes());
    CacheKey(hex::encode(digest))
}

/// Canonical string hashed for slice keys
///
/// `{:?}` is used for the intercept so that every value carries the same
/// shortest round-trip representation (`0.5`, `1.0`).
pub fn canonical_slice_string(dataset: &DatasetId, params: &SliceParams) -> String {
    format!(
        "d={},s={},a={},i={:?},c={}",
        dataset.dataset,
        params.size,
        params.axis,
        params.intercept,
        params.colormap.as_deref().unwrap_or("none"),
    )
}
