//! JSON Web Tokens
//!
//! Parsing, signing and verification of the three-segment JWT form used
//! throughout backed assertions. The signing input is always the exact
//! byte sequence `header_b64url "." payload_b64url`; signatures are
//! produced and checked over those bytes, never over re-serialized JSON.

// Layer 2: Third-party crate imports
use serde_json::{json, Value};

// Layer 3: Internal module imports
use crate::codec;
use crate::error::{BidError, BidResult};
use crate::jose::alg::SignatureAlgorithm;
use crate::jose::jwk::{Jwk, KeySource};

/// A parsed JWT.
#[derive(Debug, Clone)]
pub struct Jwt {
    /// Decoded header object
    pub header: Value,

    /// Decoded payload object
    pub payload: Value,

    /// Raw signature bytes
    pub signature: Vec<u8>,

    /// The exact signing input: `header_b64url "." payload_b64url`
    pub signing_input: String,

    /// The full encoded token
    pub encoded: String,
}

impl Jwt {
    /// Parse a `.`-separated three-segment token.
    pub fn parse(token: &str) -> BidResult<Self> {
        let mut segments = token.split('.');
        let (header_b64, payload_b64, signature_b64) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(BidError::InvalidJwt),
            };

        let header = codec::decode_json(header_b64).map_err(|_| BidError::InvalidJwt)?;
        let payload = codec::decode_json(payload_b64).map_err(|_| BidError::InvalidJwt)?;
        if !header.is_object() || !payload.is_object() {
            return Err(BidError::InvalidJwt);
        }

        let signature = codec::base64url_decode(signature_b64)?;

        Ok(Self {
            header,
            payload,
            signature,
            signing_input: format!("{header_b64}.{payload_b64}"),
            encoded: token.to_string(),
        })
    }

    /// The token's signature algorithm, from the header `alg`.
    pub fn algorithm(&self) -> BidResult<SignatureAlgorithm> {
        let name = self
            .header
            .get("alg")
            .ok_or(BidError::MissingAlgorithm)?
            .as_str()
            .ok_or(BidError::MissingAlgorithm)?;
        SignatureAlgorithm::from_name(name)
    }

    /// Sign `payload` with `key`, producing an encoded token.
    pub fn sign(payload: Value, algorithm: SignatureAlgorithm, key: &Jwk) -> BidResult<Self> {
        if !payload.is_object() {
            return Err(BidError::InvalidParameter("JWT payload must be an object"));
        }

        let header = json!({"alg": algorithm.name()});
        let header_b64 = codec::encode_json(&header)?;
        let payload_b64 = codec::encode_json(&payload)?;
        let signing_input = format!("{header_b64}.{payload_b64}");

        let signature = algorithm.sign(key, signing_input.as_bytes())?;
        let encoded = format!("{signing_input}.{}", codec::base64url_encode(&signature));

        Ok(Self {
            header,
            payload,
            signature,
            signing_input,
            encoded,
        })
    }

    /// Verify this token's signature against a key source.
    ///
    /// The header `alg` selects the algorithm; the key source must yield a
    /// key of the matching family (an `x5c` chain on the resolved key
    /// supersedes its algebraic fields). Signature equality is
    /// constant-time.
    pub fn verify(&self, keys: &KeySource) -> BidResult<()> {
        let algorithm = self.algorithm()?;
        let key = keys.key_for(algorithm.key_family())?;
        self.verify_with_key(&key)
    }

    /// Verify this token's signature under a specific JWK.
    pub fn verify_with_key(&self, key: &Jwk) -> BidResult<()> {
        let algorithm = self.algorithm()?;
        if algorithm.verify(key, self.signing_input.as_bytes(), &self.signature)? {
            Ok(())
        } else {
            Err(BidError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hs_key() -> Jwk {
        Jwk::from_value(json!({
            "algorithm": "HS",
            "secret-key": codec::base64url_encode(b"an adequately long hmac test key"),
        }))
        .unwrap()
    }

    #[test]
    fn test_sign_parse_round_trip() {
        let payload = json!({"aud": "https://rp.example.com", "exp": 2000000000000i64});
        let jwt = Jwt::sign(payload.clone(), SignatureAlgorithm::Hs256, &hs_key()).unwrap();

        let parsed = Jwt::parse(&jwt.encoded).unwrap();
        assert_eq!(parsed.payload, payload);
        assert_eq!(parsed.header["alg"], "HS256");
        assert_eq!(parsed.signing_input, jwt.signing_input);
        assert_eq!(parsed.encoded, jwt.encoded);
        parsed.verify_with_key(&hs_key()).unwrap();
    }

    #[test]
    fn test_wrong_segment_count() {
        assert_eq!(Jwt::parse("a.b").unwrap_err(), BidError::InvalidJwt);
        assert_eq!(Jwt::parse("a.b.c.d").unwrap_err(), BidError::InvalidJwt);
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let header = codec::encode_json(&json!({"alg": "HS256"})).unwrap();
        let payload = codec::encode_json(&json!(["not", "an", "object"])).unwrap();
        let token = format!("{header}.{payload}.AA");
        assert_eq!(Jwt::parse(&token).unwrap_err(), BidError::InvalidJwt);
    }

    #[test]
    fn test_unknown_algorithm() {
        let header = codec::encode_json(&json!({"alg": "none"})).unwrap();
        let payload = codec::encode_json(&json!({})).unwrap();
        let token = format!("{header}.{payload}.");
        let jwt = Jwt::parse(&token).unwrap();
        assert!(matches!(
            jwt.algorithm(),
            Err(BidError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_missing_algorithm() {
        let header = codec::encode_json(&json!({"typ": "JWT"})).unwrap();
        let payload = codec::encode_json(&json!({})).unwrap();
        let jwt = Jwt::parse(&format!("{header}.{payload}.")).unwrap();
        assert_eq!(jwt.algorithm().unwrap_err(), BidError::MissingAlgorithm);
    }

    #[test]
    fn test_tampered_signature_fails() {
        let jwt = Jwt::sign(json!({"n": "abc"}), SignatureAlgorithm::Hs256, &hs_key()).unwrap();
        let mut segments: Vec<String> = jwt.encoded.split('.').map(str::to_string).collect();
        // Flip the leading character of the signature segment.
        let replacement = if segments[2].starts_with('A') { "B" } else { "A" };
        segments[2].replace_range(0..1, replacement);
        let tampered = segments.join(".");

        let parsed = Jwt::parse(&tampered).unwrap();
        assert_eq!(
            parsed.verify_with_key(&hs_key()).unwrap_err(),
            BidError::InvalidSignature
        );
    }

    #[test]
    fn test_tampered_payload_fails() {
        let jwt = Jwt::sign(
            json!({"aud": "https://rp.example.com"}),
            SignatureAlgorithm::Hs256,
            &hs_key(),
        )
        .unwrap();
        let payload = codec::encode_json(&json!({"aud": "https://evil.example.com"})).unwrap();
        let mut segments: Vec<&str> = jwt.encoded.split('.').collect();
        segments[1] = &payload;
        let tampered = segments.join(".");

        let parsed = Jwt::parse(&tampered).unwrap();
        assert_eq!(
            parsed.verify_with_key(&hs_key()).unwrap_err(),
            BidError::InvalidSignature
        );
    }
}
