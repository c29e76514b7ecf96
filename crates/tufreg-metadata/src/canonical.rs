//! Canonical JSON form for signing
//!
//! Signatures cover the canonical encoding of a payload: JSON with
//! lexicographically sorted object keys and no insignificant whitespace.
//! Serializing through `serde_json::Value` sorts keys (its map is
//! BTreeMap-backed), which makes the encoding reproducible regardless of
//! struct field order, so re-serializing a parsed document yields the exact
//! bytes that were signed.

use serde::Serialize;

use crate::error::Result;

/// Serialize a value to its canonical JSON bytes
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}
