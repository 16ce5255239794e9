//! Dynamic JSON Accessors
//!
//! JWT payloads, JWKs, authority documents and identity attributes are all
//! `serde_json::Value` bags. These helpers keep call sites terse.

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
use crate::codec;
use crate::error::{BidError, BidResult};

/// Millisecond wall-clock timestamp.
pub type Timestamp = i64;

/// Fetch a string member, or `None` when absent or non-string.
pub fn str_value<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

/// Fetch a millisecond timestamp member, or `None` when absent or
/// non-integer.
pub fn ts_value(object: &Value, key: &str) -> Option<Timestamp> {
    object.get(key).and_then(Value::as_i64)
}

/// Fetch a base64url-encoded binary member and decode it.
///
/// Returns `CacheKeyNotFound` when the member is absent so callers can
/// distinguish "no value" from "undecodable value".
pub fn binary_value(object: &Value, key: &str) -> BidResult<Vec<u8>> {
    let encoded = str_value(object, key).ok_or(BidError::CacheKeyNotFound)?;
    codec::base64url_decode(encoded)
}

/// Store bytes as a base64url string member.
pub fn set_binary_value(object: &mut Value, key: &str, data: &[u8]) {
    if let Some(map) = object.as_object_mut() {
        map.insert(key.to_string(), Value::String(codec::base64url_encode(data)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_str_and_ts_accessors() {
        let object = json!({"iss": "example.org", "exp": 2000000000000i64, "n": 7});
        assert_eq!(str_value(&object, "iss"), Some("example.org"));
        assert_eq!(str_value(&object, "exp"), None);
        assert_eq!(ts_value(&object, "exp"), Some(2000000000000));
        assert_eq!(ts_value(&object, "missing"), None);
    }

    #[test]
    fn test_binary_round_trip() {
        let mut object = json!({});
        set_binary_value(&mut object, "cbt", b"\x01\x02\x03");
        assert_eq!(binary_value(&object, "cbt").unwrap(), b"\x01\x02\x03");
        assert_eq!(
            binary_value(&object, "absent").unwrap_err(),
            BidError::CacheKeyNotFound
        );
    }
}
