//! JSON Web Keys
//!
//! JWKs are dynamic JSON objects keyed by short names: `algorithm` selects
//! the family (`RS`, `DS`, `HS`), big integers are base64url big-endian,
//! and an optional `x5c` certificate chain supersedes the algebraic fields
//! for public RSA keys.
//!
//! Legacy keys (no `version` member) may encode big integers as decimal or
//! hex strings; the decoder auto-detects per the original convention.

// Layer 2: Third-party crate imports
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use num_bigint_dig::BigUint;
use serde_json::Value;

// Layer 3: Internal module imports
use crate::crypto::secret::SecretBytes;
use crate::error::{BidError, BidResult};
use crate::json;

/// A JSON Web Key.
///
/// Thin wrapper over the JSON object; accessors decode on demand so legacy
/// and current encodings can coexist in one cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Jwk {
    value: Value,
}

impl Jwk {
    /// Wrap a JSON object as a JWK.
    pub fn from_value(value: Value) -> BidResult<Self> {
        if !value.is_object() {
            return Err(BidError::InvalidKey);
        }
        Ok(Self { value })
    }

    /// The underlying JSON object.
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// The key family (`RS`, `DS`, `HS`), when declared.
    pub fn algorithm(&self) -> Option<&str> {
        json::str_value(&self.value, "algorithm")
    }

    /// Legacy keys carry no `version` member and may use decimal or hex
    /// big-integer encodings.
    pub fn is_legacy(&self) -> bool {
        self.value.get("version").is_none()
    }

    /// Decode a big-integer member.
    ///
    /// Versioned keys are base64url big-endian only. For legacy keys the
    /// original auto-detection applies: an all-digit string is decimal,
    /// anything else is hex. A hex value that happens to contain only
    /// decimal digits is therefore misread as decimal; keys that care must
    /// carry a `version`.
    pub fn big_uint(&self, key: &str) -> BidResult<BigUint> {
        let text = match self.value.get(key) {
            None => return Err(BidError::NoKey),
            Some(member) => member.as_str().ok_or(BidError::InvalidKey)?,
        };

        if !self.is_legacy() {
            let raw = URL_SAFE_NO_PAD
                .decode(text.as_bytes())
                .map_err(|_| BidError::InvalidKey)?;
            return Ok(BigUint::from_bytes_be(&raw));
        }

        let radix = if text.bytes().all(|b| b.is_ascii_digit()) {
            10
        } else {
            16
        };
        BigUint::parse_bytes(text.as_bytes(), radix).ok_or(BidError::InvalidKey)
    }

    /// Decode the `secret-key` member of an HS key. The buffer is zeroed
    /// on drop.
    pub fn secret_key(&self) -> BidResult<SecretBytes> {
        let encoded = json::str_value(&self.value, "secret-key").ok_or(BidError::NoKey)?;
        let raw = URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map_err(|_| BidError::InvalidKey)?;
        Ok(SecretBytes::new(raw))
    }

    /// The `x5c` certificate chain, when present.
    pub fn x5c(&self) -> Option<&Vec<Value>> {
        self.value.get("x5c").and_then(Value::as_array)
    }

    /// DER bytes of the `x5c` entry at `index`.
    ///
    /// Entries are base64 DER per JWS; base64url producers exist in the
    /// wild and are accepted too.
    pub fn x5c_der(&self, index: usize) -> BidResult<Vec<u8>> {
        let entry = self
            .x5c()
            .and_then(|chain| chain.get(index))
            .and_then(Value::as_str)
            .ok_or(BidError::MissingCert)?;
        STANDARD
            .decode(entry.as_bytes())
            .or_else(|_| URL_SAFE_NO_PAD.decode(entry.as_bytes()))
            .map_err(|_| BidError::InvalidBase64)
    }
}

/// Where a verification key may come from.
///
/// Certificate payloads embed their subject key under `public-key`;
/// authority documents do the same; keyset documents carry a `keys` array;
/// a bare JWK is used as-is.
#[derive(Debug, Clone)]
pub struct KeySource {
    value: Value,
}

impl KeySource {
    /// Wrap a JSON object as a key source.
    pub fn from_value(value: Value) -> BidResult<Self> {
        if !value.is_object() {
            return Err(BidError::InvalidKeySet);
        }
        Ok(Self { value })
    }

    /// Resolve the key for the given family (`RS`, `DS`, `HS`).
    ///
    /// A declared `algorithm` must match the family; keys without a
    /// declaration are accepted (derived symmetric keys carry none).
    pub fn key_for(&self, family: &str) -> BidResult<Jwk> {
        if let Some(embedded) = self.value.get("public-key") {
            return Self::check_family(Jwk::from_value(embedded.clone())?, family);
        }

        if let Some(keys) = self.value.get("keys").and_then(Value::as_array) {
            for candidate in keys {
                if let Ok(jwk) = Jwk::from_value(candidate.clone()) {
                    if jwk.algorithm().is_none() || jwk.algorithm() == Some(family) {
                        return Ok(jwk);
                    }
                }
            }
            return Err(BidError::NoKey);
        }

        Self::check_family(Jwk::from_value(self.value.clone())?, family)
    }

    fn check_family(jwk: Jwk, family: &str) -> BidResult<Jwk> {
        match jwk.algorithm() {
            Some(declared) if declared != family => Err(BidError::InvalidKey),
            _ => Ok(jwk),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_versioned_key_is_base64url() {
        let jwk = Jwk::from_value(json!({
            "version": "2012.08.15",
            "algorithm": "RS",
            "e": "AQAB",
        }))
        .unwrap();
        assert!(!jwk.is_legacy());
        assert_eq!(jwk.big_uint("e").unwrap(), BigUint::from(65537u32));
    }

    #[test]
    fn test_legacy_decimal_and_hex() {
        let jwk = Jwk::from_value(json!({
            "algorithm": "RS",
            "e": "65537",
            "n": "c0ffee",
        }))
        .unwrap();
        assert!(jwk.is_legacy());
        assert_eq!(jwk.big_uint("e").unwrap(), BigUint::from(65537u32));
        assert_eq!(jwk.big_uint("n").unwrap(), BigUint::from(0xc0ffeeu32));
    }

    #[test]
    fn test_missing_member_is_no_key() {
        let jwk = Jwk::from_value(json!({"algorithm": "RS"})).unwrap();
        assert_eq!(jwk.big_uint("n").unwrap_err(), BidError::NoKey);
    }

    #[test]
    fn test_key_source_embedded_public_key() {
        let source = KeySource::from_value(json!({
            "iss": "example.org",
            "public-key": {"algorithm": "RS", "e": "65537", "n": "123"},
        }))
        .unwrap();
        let key = source.key_for("RS").unwrap();
        assert_eq!(key.algorithm(), Some("RS"));
    }

    #[test]
    fn test_key_source_family_mismatch() {
        let source = KeySource::from_value(json!({
            "public-key": {"algorithm": "DS", "p": "7"},
        }))
        .unwrap();
        assert_eq!(source.key_for("RS").unwrap_err(), BidError::InvalidKey);
    }

    #[test]
    fn test_key_source_undeclared_family_is_accepted() {
        // Derived symmetric keys are bare {"secret-key": ...} objects.
        let source = KeySource::from_value(json!({"secret-key": "AAAA"})).unwrap();
        assert!(source.key_for("HS").is_ok());
    }

    #[test]
    fn test_keyset_array_selection() {
        let source = KeySource::from_value(json!({
            "keys": [
                {"algorithm": "DS", "p": "7"},
                {"algorithm": "RS", "e": "65537"},
            ],
        }))
        .unwrap();
        assert_eq!(source.key_for("RS").unwrap().algorithm(), Some("RS"));
    }
}
