//! Digest Selection
//!
//! Digests are named by the two-to-four character suffix of a signature
//! algorithm identifier: `S128` is SHA-1, `S224` through `S512` are the
//! SHA-2 family.

// Layer 2: Third-party crate imports
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

// Layer 3: Internal module imports
use crate::error::{BidError, BidResult};

/// The closed set of digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl ShaAlgorithm {
    /// Resolve a digest from an algorithm-identifier suffix (`S128`,
    /// `S224`, `S256`, `S384`, `S512`).
    pub fn from_suffix(suffix: &str) -> BidResult<Self> {
        match suffix {
            "S128" => Ok(ShaAlgorithm::Sha1),
            "S224" => Ok(ShaAlgorithm::Sha224),
            "S256" => Ok(ShaAlgorithm::Sha256),
            "S384" => Ok(ShaAlgorithm::Sha384),
            "S512" => Ok(ShaAlgorithm::Sha512),
            other => Err(BidError::UnknownAlgorithm(other.to_string())),
        }
    }

    /// Digest output length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            ShaAlgorithm::Sha1 => 20,
            ShaAlgorithm::Sha224 => 28,
            ShaAlgorithm::Sha256 => 32,
            ShaAlgorithm::Sha384 => 48,
            ShaAlgorithm::Sha512 => 64,
        }
    }

    /// Hash `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            ShaAlgorithm::Sha1 => {
                use sha1::Digest as _;
                Sha1::digest(data).to_vec()
            }
            ShaAlgorithm::Sha224 => Sha224::digest(data).to_vec(),
            ShaAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            ShaAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            ShaAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}
