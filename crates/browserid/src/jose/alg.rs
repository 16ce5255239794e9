//! Signature Algorithms
//!
//! The closed algorithm set used by backed assertions. `RS256`, `RS128`
//! and `RS64` all run PKCS#1 v1.5 over a SHA-256 `DigestInfo`: the legacy
//! identifiers survive from tokens that advertised RS128/RS64 while in
//! fact signing RS256, and the aliasing is kept for compatibility with
//! that corpus. `DS256`/`DS128` are DSA over SHA-256/SHA-1 with the
//! signature encoded as `r || s`, each value left-padded to the digest
//! width. `HS256` is HMAC-SHA-256 keyed from the JWK `secret-key`.

// Layer 2: Third-party crate imports
use dsa::signature::{DigestSigner, DigestVerifier};
use hmac::{Hmac, Mac};
use num_bigint_dig::BigUint;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

// Layer 3: Internal module imports
use crate::codec;
use crate::error::{BidError, BidResult};
use crate::jose::jwk::Jwk;

/// The closed set of JWT signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Rs256,
    Rs128,
    Rs64,
    Ds256,
    Ds128,
    Hs256,
}

impl SignatureAlgorithm {
    /// Resolve an algorithm from its JWT `alg` identifier.
    pub fn from_name(name: &str) -> BidResult<Self> {
        match name {
            "RS256" => Ok(SignatureAlgorithm::Rs256),
            "RS128" => Ok(SignatureAlgorithm::Rs128),
            "RS64" => Ok(SignatureAlgorithm::Rs64),
            "DS256" => Ok(SignatureAlgorithm::Ds256),
            "DS128" => Ok(SignatureAlgorithm::Ds128),
            "HS256" => Ok(SignatureAlgorithm::Hs256),
            other => Err(BidError::UnknownAlgorithm(other.to_string())),
        }
    }

    /// The JWT `alg` identifier.
    pub fn name(self) -> &'static str {
        match self {
            SignatureAlgorithm::Rs256 => "RS256",
            SignatureAlgorithm::Rs128 => "RS128",
            SignatureAlgorithm::Rs64 => "RS64",
            SignatureAlgorithm::Ds256 => "DS256",
            SignatureAlgorithm::Ds128 => "DS128",
            SignatureAlgorithm::Hs256 => "HS256",
        }
    }

    /// The JWK key family this algorithm needs.
    pub fn key_family(self) -> &'static str {
        match self {
            SignatureAlgorithm::Rs256
            | SignatureAlgorithm::Rs128
            | SignatureAlgorithm::Rs64 => "RS",
            SignatureAlgorithm::Ds256 | SignatureAlgorithm::Ds128 => "DS",
            SignatureAlgorithm::Hs256 => "HS",
        }
    }

    fn dsa_digest_len(self) -> usize {
        match self {
            SignatureAlgorithm::Ds256 => 32,
            SignatureAlgorithm::Ds128 => 20,
            _ => 0,
        }
    }

    /// Produce a signature over `signing_input`.
    pub fn sign(self, key: &Jwk, signing_input: &[u8]) -> BidResult<Vec<u8>> {
        match self {
            SignatureAlgorithm::Rs256
            | SignatureAlgorithm::Rs128
            | SignatureAlgorithm::Rs64 => rsa_sign(key, signing_input),
            SignatureAlgorithm::Ds256 | SignatureAlgorithm::Ds128 => {
                dsa_sign(self, key, signing_input)
            }
            SignatureAlgorithm::Hs256 => hmac_compute(key, signing_input),
        }
    }

    /// Check a signature over `signing_input`. `Ok(false)` means the
    /// signature is well-formed but wrong; key problems are errors.
    pub fn verify(self, key: &Jwk, signing_input: &[u8], signature: &[u8]) -> BidResult<bool> {
        match self {
            SignatureAlgorithm::Rs256
            | SignatureAlgorithm::Rs128
            | SignatureAlgorithm::Rs64 => rsa_verify(key, signing_input, signature),
            SignatureAlgorithm::Ds256 | SignatureAlgorithm::Ds128 => {
                dsa_verify(self, key, signing_input, signature)
            }
            SignatureAlgorithm::Hs256 => {
                let expected = hmac_compute(key, signing_input)?;
                Ok(codec::timing_safe_eq(&expected, signature))
            }
        }
    }

    /// Key size in bytes, used to dimension derived key material.
    pub fn key_size(self, key: &Jwk) -> BidResult<usize> {
        match self {
            SignatureAlgorithm::Rs256
            | SignatureAlgorithm::Rs128
            | SignatureAlgorithm::Rs64 => {
                let modulus = key.big_uint("n")?;
                Ok(modulus.to_bytes_be().len())
            }
            SignatureAlgorithm::Ds256 | SignatureAlgorithm::Ds128 => {
                // Rounded to the FIPS 186-3 (L, N) pairings.
                let p_len = key.big_uint("p")?.to_bytes_be().len();
                Ok(match p_len {
                    n if n < 160 => 160,
                    n if n < 224 => 224,
                    n if n < 256 => 256,
                    n => n,
                })
            }
            SignatureAlgorithm::Hs256 => Ok(key.secret_key()?.len()),
        }
    }
}

// --- RSA ---

fn rsa_public_key(key: &Jwk) -> BidResult<RsaPublicKey> {
    if key.x5c().is_some() {
        return rsa_key_from_x5c(key);
    }
    let n = key.big_uint("n")?;
    let e = key.big_uint("e")?;
    RsaPublicKey::new(n, e).map_err(|_| BidError::InvalidKey)
}

/// An `x5c` chain supersedes the algebraic fields: the verification key is
/// the subject key of the first certificate.
fn rsa_key_from_x5c(key: &Jwk) -> BidResult<RsaPublicKey> {
    let der = key.x5c_der(0)?;
    let (_, cert) = X509Certificate::from_der(&der).map_err(|_| BidError::MissingCert)?;
    match cert.public_key().parsed() {
        Ok(x509_parser::public_key::PublicKey::RSA(rsa_pub)) => {
            let n = BigUint::from_bytes_be(rsa_pub.modulus);
            let e = BigUint::from_bytes_be(rsa_pub.exponent);
            RsaPublicKey::new(n, e).map_err(|_| BidError::InvalidKey)
        }
        _ => Err(BidError::NoKey),
    }
}

fn rsa_private_key(key: &Jwk) -> BidResult<RsaPrivateKey> {
    let n = key.big_uint("n")?;
    let e = key.big_uint("e")?;
    let d = key.big_uint("d")?;
    RsaPrivateKey::from_components(n, e, d, Vec::new()).map_err(|_| BidError::InvalidKey)
}

fn rsa_sign(key: &Jwk, signing_input: &[u8]) -> BidResult<Vec<u8>> {
    let private_key = rsa_private_key(key)?;
    let digest = Sha256::digest(signing_input);
    private_key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|e| BidError::CryptoError(e.to_string()))
}

fn rsa_verify(key: &Jwk, signing_input: &[u8], signature: &[u8]) -> BidResult<bool> {
    let public_key = rsa_public_key(key)?;
    let digest = Sha256::digest(signing_input);
    Ok(public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .is_ok())
}

// --- DSA ---

fn dsa_components(key: &Jwk) -> BidResult<dsa::Components> {
    let p = key.big_uint("p")?;
    let q = key.big_uint("q")?;
    let g = key.big_uint("g")?;
    dsa::Components::from_components(p, q, g).map_err(|_| BidError::InvalidKey)
}

fn dsa_verifying_key(key: &Jwk) -> BidResult<dsa::VerifyingKey> {
    let y = key.big_uint("y")?;
    dsa::VerifyingKey::from_components(dsa_components(key)?, y).map_err(|_| BidError::InvalidKey)
}

fn dsa_signing_key(key: &Jwk) -> BidResult<dsa::SigningKey> {
    let x = key.big_uint("x")?;
    let y = key.big_uint("y").or_else(|_| {
        // Public value is recoverable as g^x mod p.
        let components = dsa_components(key)?;
        Ok::<BigUint, BidError>(components.g().modpow(&key.big_uint("x")?, components.p()))
    })?;
    let verifying_key = dsa::VerifyingKey::from_components(dsa_components(key)?, y)
        .map_err(|_| BidError::InvalidKey)?;
    dsa::SigningKey::from_components(verifying_key, x).map_err(|_| BidError::InvalidKey)
}

/// Encode a DSA signature as `r || s`, each left-padded to the digest
/// width. Values wider than the digest make the signature unrepresentable
/// and are rejected.
fn dsa_encode(alg: SignatureAlgorithm, signature: &dsa::Signature) -> BidResult<Vec<u8>> {
    let width = alg.dsa_digest_len();
    let r = signature.r().to_bytes_be();
    let s = signature.s().to_bytes_be();
    if r.len() > width || s.len() > width {
        return Err(BidError::CryptoError("DSA value exceeds digest width".to_string()));
    }

    let mut encoded = vec![0u8; 2 * width];
    encoded[width - r.len()..width].copy_from_slice(&r);
    encoded[2 * width - s.len()..].copy_from_slice(&s);
    Ok(encoded)
}

fn dsa_sign(alg: SignatureAlgorithm, key: &Jwk, signing_input: &[u8]) -> BidResult<Vec<u8>> {
    let signing_key = dsa_signing_key(key)?;
    let signature: dsa::Signature = match alg {
        SignatureAlgorithm::Ds256 => signing_key
            .try_sign_digest(Sha256::new_with_prefix(signing_input))
            .map_err(|e| BidError::CryptoError(e.to_string()))?,
        _ => {
            use sha1::Digest as _;
            signing_key
                .try_sign_digest(Sha1::new_with_prefix(signing_input))
                .map_err(|e| BidError::CryptoError(e.to_string()))?
        }
    };
    dsa_encode(alg, &signature)
}

fn dsa_verify(
    alg: SignatureAlgorithm,
    key: &Jwk,
    signing_input: &[u8],
    signature: &[u8],
) -> BidResult<bool> {
    let width = alg.dsa_digest_len();
    if signature.len() != 2 * width {
        return Ok(false);
    }

    let verifying_key = dsa_verifying_key(key)?;
    let r = BigUint::from_bytes_be(&signature[..width]);
    let s = BigUint::from_bytes_be(&signature[width..]);
    let signature = match dsa::Signature::from_components(r, s) {
        Ok(signature) => signature,
        Err(_) => return Ok(false),
    };

    let valid = match alg {
        SignatureAlgorithm::Ds256 => verifying_key
            .verify_digest(Sha256::new_with_prefix(signing_input), &signature)
            .is_ok(),
        _ => {
            use sha1::Digest as _;
            verifying_key
                .verify_digest(Sha1::new_with_prefix(signing_input), &signature)
                .is_ok()
        }
    };
    Ok(valid)
}

// --- HMAC ---

fn hmac_compute(key: &Jwk, signing_input: &[u8]) -> BidResult<Vec<u8>> {
    let secret = key.secret_key()?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose())
        .map_err(|_| BidError::CryptoError("HMAC key setup".to_string()))?;
    mac.update(signing_input);
    Ok(mac.finalize().into_bytes().to_vec())
}
