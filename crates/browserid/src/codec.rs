//! Encoding Primitives
//!
//! base64url (unpadded) encoding, compact JSON serialization, the
//! assertion digest used as a replay-cache key, and the constant-time
//! byte comparison every MAC and signature equality check goes through.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

// Layer 3: Internal module imports
use crate::error::{BidError, BidResult};

/// Encode bytes as unpadded base64url.
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode an unpadded base64url string.
pub fn base64url_decode(data: &str) -> BidResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(data.as_bytes())
        .map_err(|_| BidError::InvalidBase64)
}

/// Serialize a JSON value in compact form (no insignificant whitespace)
/// and return it base64url-encoded.
pub fn encode_json(value: &Value) -> BidResult<String> {
    let compact = serde_json::to_vec(value).map_err(|_| BidError::InvalidJson)?;
    Ok(base64url_encode(&compact))
}

/// Decode a base64url segment into a JSON value.
pub fn decode_json(segment: &str) -> BidResult<Value> {
    let raw = base64url_decode(segment)?;
    serde_json::from_slice(&raw).map_err(|_| BidError::InvalidJson)
}

/// SHA-256 over an assertion's raw encoded bytes.
pub fn digest_assertion(assertion: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(assertion.as_bytes());
    hasher.finalize().into()
}

/// Replay-cache key for an assertion: base64url(SHA-256(bytes)).
pub fn replay_key(assertion: &str) -> String {
    base64url_encode(&digest_assertion(assertion))
}

/// Constant-time byte equality.
///
/// Equal iff the lengths match and every byte position is equal. Running
/// time depends only on the shorter of the two inputs, never on where the
/// first difference occurs.
pub fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    let common = a.len().min(b.len());
    let prefix_eq = a[..common].ct_eq(&b[..common]);
    let len_eq = subtle::Choice::from(u8::from(a.len() == b.len()));
    (prefix_eq & len_eq).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_base64url_round_trip() {
        let data = b"\x00\x01\xfe\xffhello";
        let encoded = base64url_encode(data);
        assert!(!encoded.contains('='));
        assert_eq!(base64url_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_base64url_rejects_padding() {
        assert_eq!(
            base64url_decode("aGVsbG8=").unwrap_err(),
            BidError::InvalidBase64
        );
    }

    #[test]
    fn test_json_round_trip_is_compact() {
        let value = json!({"aud": "https://rp.example.com", "exp": 2000000000000i64});
        let encoded = encode_json(&value).unwrap();
        let raw = base64url_decode(&encoded).unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(!text.contains("\n"));
        assert!(!text.contains(": "));
        assert_eq!(decode_json(&encoded).unwrap(), value);
    }

    #[test]
    fn test_decode_json_rejects_garbage() {
        let garbage = base64url_encode(b"not json");
        assert_eq!(decode_json(&garbage).unwrap_err(), BidError::InvalidJson);
    }

    #[test]
    fn test_replay_key_is_stable() {
        let k1 = replay_key("~abc.def.ghi");
        let k2 = replay_key("~abc.def.ghi");
        assert_eq!(k1, k2);
        assert_ne!(k1, replay_key("~abc.def.ghj"));
    }

    #[test]
    fn test_timing_safe_eq() {
        assert!(timing_safe_eq(b"same", b"same"));
        assert!(!timing_safe_eq(b"same", b"sama"));
        assert!(!timing_safe_eq(b"short", b"longer input"));
        assert!(timing_safe_eq(b"", b""));
    }

    proptest! {
        #[test]
        fn prop_base64url_round_trips(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let encoded = base64url_encode(&data);
            prop_assert_eq!(base64url_decode(&encoded).unwrap(), data);
        }

        #[test]
        fn prop_timing_safe_eq_matches_eq(
            a in proptest::collection::vec(any::<u8>(), 0..64),
            b in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            prop_assert_eq!(timing_safe_eq(&a, &b), a == b);
        }
    }
}
