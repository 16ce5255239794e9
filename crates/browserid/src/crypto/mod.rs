//! Cryptographic Primitives
//!
//! Digest selection, the BrowserID key-derivation function, zeroize-on-drop
//! secret buffers, and ECDH key agreement. Signature algorithms live in
//! [`crate::jose::alg`], which dispatches into these primitives.

pub mod digest;
pub mod ecdh;
pub mod kdf;
pub mod secret;

pub use digest::ShaAlgorithm;
pub use ecdh::{EcCurve, EcdhKey};
pub use kdf::derive_key;
pub use secret::SecretBytes;
