//! Rendering of directory attribute values as JSON.
//!
//! Every attribute becomes an array of strings. Active Directory's binary identifiers are
//! decoded to their usual text forms:
//!
//! - `objectGUID`: canonical UUID string (AD stores the first three fields little-endian)
//! - `objectSid`: `S-1-<authority>-<sub authority>...`
//! - `mail`: comma separated values are split and trimmed
//!
//! Anything else that is not valid UTF-8 is emitted as standard base64.

use base64::Engine;
use serde_json::Value;
use shared_types::AttributeValue;

pub const OBJECT_GUID: &str = "objectGUID";
pub const OBJECT_SID: &str = "objectSid";
pub const MAIL: &str = "mail";

/// Convert all values of one attribute to a JSON array.
pub fn attribute_to_json(name: &str, values: &[AttributeValue]) -> Value {
    let rendered: Vec<Value> = if name.eq_ignore_ascii_case(OBJECT_GUID) {
        values
            .iter()
            .map(|v| decode_object_guid(v.as_bytes()).unwrap_or_else(|| fallback(v)))
            .map(Value::String)
            .collect()
    } else if name.eq_ignore_ascii_case(OBJECT_SID) {
        values
            .iter()
            .map(|v| decode_sid(v.as_bytes()).unwrap_or_else(|| fallback(v)))
            .map(Value::String)
            .collect()
    } else if name.eq_ignore_ascii_case(MAIL) {
        values
            .iter()
            .flat_map(|v| split_mail(&fallback(v)))
            .map(Value::String)
            .collect()
    } else {
        values.iter().map(fallback).map(Value::String).collect()
    };

    Value::Array(rendered)
}

/// Text values pass through; binary values become UTF-8 if they are, base64 otherwise.
fn fallback(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Text(s) => s.clone(),
        AttributeValue::Binary(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => base64::engine::general_purpose::STANDARD.encode(bytes),
        },
    }
}

pub fn decode_object_guid(bytes: &[u8]) -> Option<String> {
    uuid::Uuid::from_slice_le(bytes)
        .ok()
        .map(|guid| guid.hyphenated().to_string())
}

/// Decode a binary security identifier.
///
/// Layout: revision (1 byte, always 1), sub authority count (1 byte), identifier authority
/// (6 bytes big-endian), then `count` sub authorities of 4 bytes little-endian each.
pub fn decode_sid(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 8 || bytes[0] != 1 {
        return None;
    }

    let count = bytes[1] as usize;
    let subs = &bytes[8..];
    if subs.len() != count * 4 {
        return None;
    }

    let authority = bytes[2..8]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    let mut sid = format!("S-{}-{}", bytes[0], authority);
    for chunk in subs.chunks_exact(4) {
        let sub = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        sid.push('-');
        sid.push_str(&sub.to_string());
    }

    Some(sid)
}

pub fn split_mail(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
