//! JWT Engine
//!
//! The JSON Web Token and JSON Web Key formats actually used by backed
//! assertions: dynamic JWKs with legacy big-integer encodings, the closed
//! signature-algorithm set, and JWT parse/sign/verify with a strict
//! signing-input discipline.

pub mod alg;
pub mod jwk;
pub mod jwt;

pub use alg::SignatureAlgorithm;
pub use jwk::{Jwk, KeySource};
pub use jwt::Jwt;
