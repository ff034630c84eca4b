//! # JSON
//!
//! simd-json for parsing request bodies, serde_json for serializing handler
//! values.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse JSON bytes to a typed value using simd-json
///
/// simd-json parses in place, so the buffer is clobbered.
///
/// # Errors
///
/// Returns `Error::JsonParse` if the input is not valid JSON for `T`.
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &mut [u8]) -> Result<T> {
    Ok(simd_json::from_slice(bytes)?)
}

/// Parse a JSON string to a typed value
///
/// # Errors
///
/// Returns `Error::JsonParse` if the input is not valid JSON for `T`.
pub fn parse_json<T: DeserializeOwned>(json_str: &str) -> Result<T> {
    parse_json_bytes(&mut json_str.as_bytes().to_vec())
}

/// Serialize a value to a JSON string
///
/// # Errors
///
/// Returns `Error::Json` if the value cannot be represented as JSON (e.g. a
/// map with non-string keys).
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
