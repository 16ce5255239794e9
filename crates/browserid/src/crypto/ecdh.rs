//! ECDH Key Agreement
//!
//! NIST prime-curve Diffie-Hellman for security-context key establishment:
//! key generation, affine point import/export as JWK `{crv, x, y, d}`, and
//! raw shared-secret computation (identity KDF — callers derive usable keys
//! through [`crate::crypto::kdf`]).

// Layer 2: Third-party crate imports
use elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use rand::rngs::OsRng;
use serde_json::{json, Value};

// Layer 3: Internal module imports
use crate::codec;
use crate::error::{BidError, BidResult};
use crate::crypto::secret::SecretBytes;
use crate::json;

/// Supported curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    /// Resolve a curve from its JWK `crv` name.
    pub fn from_name(name: &str) -> BidResult<Self> {
        match name {
            "P-256" => Ok(EcCurve::P256),
            "P-384" => Ok(EcCurve::P384),
            "P-521" => Ok(EcCurve::P521),
            other => Err(BidError::UnknownAlgorithm(other.to_string())),
        }
    }

    /// JWK `crv` name.
    pub fn name(self) -> &'static str {
        match self {
            EcCurve::P256 => "P-256",
            EcCurve::P384 => "P-384",
            EcCurve::P521 => "P-521",
        }
    }

    /// Field element width in bytes (also the shared-secret length).
    pub fn field_len(self) -> usize {
        match self {
            EcCurve::P256 => 32,
            EcCurve::P384 => 48,
            EcCurve::P521 => 66,
        }
    }
}

/// An ECDH key pair (or, when `d` is absent, a bare public point) in JWK
/// form.
#[derive(Debug, Clone)]
pub struct EcdhKey {
    curve: EcCurve,
    jwk: Value,
}

struct GeneratedKey {
    x: Vec<u8>,
    y: Vec<u8>,
    d: SecretBytes,
}

/// Left-pad big-endian bytes to a fixed field width.
fn left_pad(bytes: &[u8], len: usize) -> BidResult<Vec<u8>> {
    if bytes.len() > len {
        return Err(BidError::BufferTooLong);
    }
    let mut padded = vec![0u8; len - bytes.len()];
    padded.extend_from_slice(bytes);
    Ok(padded)
}

macro_rules! curve_ops {
    ($generate:ident, $agree:ident, $curve:ident) => {
        fn $generate() -> BidResult<GeneratedKey> {
            let secret = $curve::SecretKey::random(&mut OsRng);
            let point = secret.public_key().to_encoded_point(false);
            let x = point
                .x()
                .ok_or_else(|| BidError::CryptoError("point at infinity".to_string()))?
                .to_vec();
            let y = point
                .y()
                .ok_or_else(|| BidError::CryptoError("point at infinity".to_string()))?
                .to_vec();
            let d = SecretBytes::new(secret.to_bytes().to_vec());
            Ok(GeneratedKey { x, y, d })
        }

        fn $agree(d: &[u8], peer_x: &[u8], peer_y: &[u8]) -> BidResult<SecretBytes> {
            let secret =
                $curve::SecretKey::from_slice(d).map_err(|_| BidError::InvalidKey)?;
            let point = $curve::EncodedPoint::from_affine_coordinates(
                $curve::FieldBytes::from_slice(peer_x),
                $curve::FieldBytes::from_slice(peer_y),
                false,
            );
            let peer: Option<$curve::PublicKey> =
                $curve::PublicKey::from_encoded_point(&point).into();
            let peer = peer.ok_or(BidError::InvalidKey)?;
            let shared =
                $curve::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
            Ok(SecretBytes::new(shared.raw_secret_bytes().to_vec()))
        }
    };
}

curve_ops!(generate_p256, agree_p256, p256);
curve_ops!(generate_p384, agree_p384, p384);
curve_ops!(generate_p521, agree_p521, p521);

impl EcdhKey {
    /// Generate a fresh key pair on `curve`.
    pub fn generate(curve: EcCurve) -> BidResult<Self> {
        let generated = match curve {
            EcCurve::P256 => generate_p256()?,
            EcCurve::P384 => generate_p384()?,
            EcCurve::P521 => generate_p521()?,
        };
        let jwk = json!({
            "crv": curve.name(),
            "x": codec::base64url_encode(&generated.x),
            "y": codec::base64url_encode(&generated.y),
            "d": codec::base64url_encode(generated.d.expose()),
        });
        Ok(Self { curve, jwk })
    }

    /// Import a key from JWK form. `x` and `y` are required; `d` only for
    /// key pairs that will compute shared secrets.
    pub fn from_jwk(value: &Value) -> BidResult<Self> {
        let crv = json::str_value(value, "crv").ok_or(BidError::InvalidKey)?;
        let curve = EcCurve::from_name(crv)?;
        if json::str_value(value, "x").is_none() || json::str_value(value, "y").is_none() {
            return Err(BidError::InvalidKey);
        }
        Ok(Self {
            curve,
            jwk: value.clone(),
        })
    }

    /// The curve this key lives on.
    pub fn curve(&self) -> EcCurve {
        self.curve
    }

    /// The full JWK, including `d` when present.
    pub fn as_jwk(&self) -> &Value {
        &self.jwk
    }

    /// The public half as a JWK `{crv, x, y}`.
    pub fn public_jwk(&self) -> Value {
        json!({
            "crv": self.curve.name(),
            "x": self.jwk.get("x").cloned().unwrap_or(Value::Null),
            "y": self.jwk.get("y").cloned().unwrap_or(Value::Null),
        })
    }

    fn field_element(&self, source: &Value, key: &str) -> BidResult<Vec<u8>> {
        let raw = json::binary_value(source, key).map_err(|_| BidError::InvalidKey)?;
        left_pad(&raw, self.curve.field_len())
    }

    /// Compute the raw shared secret against a peer public point.
    ///
    /// The result has the curve's field width; the buffer is zeroed on
    /// drop and on every failure path.
    pub fn shared_secret(&self, peer: &Value) -> BidResult<SecretBytes> {
        let d = SecretBytes::new(self.field_element(&self.jwk, "d")?);
        let peer_x = self.field_element(peer, "x")?;
        let peer_y = self.field_element(peer, "y")?;

        match self.curve {
            EcCurve::P256 => agree_p256(d.expose(), &peer_x, &peer_y),
            EcCurve::P384 => agree_p384(d.expose(), &peer_x, &peer_y),
            EcCurve::P521 => agree_p521(d.expose(), &peer_x, &peer_y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_exports_affine_point() {
        let key = EcdhKey::generate(EcCurve::P256).unwrap();
        let public = key.public_jwk();
        assert_eq!(public["crv"], "P-256");
        assert!(public["x"].is_string());
        assert!(public["y"].is_string());
        assert!(public.get("d").is_none());
    }

    #[test]
    fn test_agreement_is_symmetric() {
        for curve in [EcCurve::P256, EcCurve::P384, EcCurve::P521] {
            let alice = EcdhKey::generate(curve).unwrap();
            let bob = EcdhKey::generate(curve).unwrap();

            let ab = alice.shared_secret(&bob.public_jwk()).unwrap();
            let ba = bob.shared_secret(&alice.public_jwk()).unwrap();

            assert_eq!(ab, ba);
            assert_eq!(ab.len(), curve.field_len());
        }
    }

    #[test]
    fn test_import_requires_coordinates() {
        let missing_y = serde_json::json!({"crv": "P-256", "x": "AA"});
        assert_eq!(
            EcdhKey::from_jwk(&missing_y).unwrap_err(),
            BidError::InvalidKey
        );
    }

    #[test]
    fn test_unknown_curve_is_rejected() {
        let jwk = serde_json::json!({"crv": "P-192", "x": "AA", "y": "AA"});
        assert!(matches!(
            EcdhKey::from_jwk(&jwk),
            Err(BidError::UnknownAlgorithm(_))
        ));
    }
}
