//! Key Derivation
//!
//! The single-block derivation `HMAC-SHA256(K, "BrowserID" || K || S || 0x01)`,
//! laid out to be compatible with the Windows CNG derivation function
//! (HMAC-Hash(Key, Prepend | Key | Append)). Used with salt `"ARK"` to turn a
//! session key into the authenticator root key, and with an authenticator's
//! signing input as salt to produce the per-authenticator session key.

// Layer 2: Third-party crate imports
use hmac::{Hmac, Mac};
use sha2::Sha256;

// Layer 3: Internal module imports
use crate::crypto::secret::SecretBytes;
use crate::error::{BidError, BidResult};

const KDF_LABEL: &[u8] = b"BrowserID";

/// Derive a 32-byte subkey from `secret` and `salt`.
pub fn derive_key(secret: &[u8], salt: &[u8]) -> BidResult<SecretBytes> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|_| BidError::CryptoError("HMAC key setup".to_string()))?;
    mac.update(KDF_LABEL);
    mac.update(secret);
    mac.update(salt);
    mac.update(&[0x01]);
    Ok(SecretBytes::new(mac.finalize().into_bytes().to_vec()))
}
