//! Zeroized Secret Buffers
//!
//! Every secret byte buffer in the crate (session keys, HMAC keys, derived
//! keys, ECDH shared secrets) is held in a [`SecretBytes`], which zeroes its
//! contents on every exit path including drop.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use zeroize::Zeroizing;

// Layer 3: Internal module imports
use crate::codec;

/// A byte buffer that is zeroed when dropped.
///
/// Intentionally does not implement `Deref` or `Display`; callers must go
/// through [`SecretBytes::expose`] so accidental logging stays visible in
/// review.
#[derive(Clone)]
pub struct SecretBytes(Zeroizing<Vec<u8>>);

impl SecretBytes {
    /// Take ownership of secret material.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Borrow the secret material.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// base64url rendering, for embedding in a JWK `secret-key` field.
    pub fn to_base64url(&self) -> String {
        codec::base64url_encode(&self.0)
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl PartialEq for SecretBytes {
    fn eq(&self, other: &Self) -> bool {
        codec::timing_safe_eq(self.expose(), other.expose())
    }
}

impl Eq for SecretBytes {}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes([redacted; {} bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretBytes::new(vec![1, 2, 3, 4]);
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains('1'));
        assert!(rendered.contains("4 bytes"));
    }

    #[test]
    fn test_equality_is_by_content() {
        assert_eq!(
            SecretBytes::new(vec![9, 9]),
            SecretBytes::new(vec![9, 9])
        );
        assert_ne!(SecretBytes::new(vec![9]), SecretBytes::new(vec![9, 9]));
    }
}
