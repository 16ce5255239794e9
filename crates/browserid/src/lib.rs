//! BrowserID Assertion Verification and Reauthentication
//!
//! This crate implements the relying-party and user-agent core of the
//! BrowserID (Mozilla Persona) protocol: it turns a caller-supplied
//! *backed identity assertion* plus an expected audience and optional
//! channel bindings into either a verified [`Identity`] or a typed
//! [`BidError`], and it mints short-lived fast-reauthentication
//! assertions from previously established sessions.
//!
//! # Architecture
//!
//! The engine is organized in layers:
//!
//! - **Codec** (`codec`, `json`): base64url, compact JSON, constant-time
//!   comparison, dynamic JSON accessors
//! - **Crypto** (`crypto`): digests, the BrowserID KDF, zeroized secret
//!   buffers, ECDH key agreement
//! - **JOSE** (`jose`): JWKs with legacy big-integer encodings, the closed
//!   signature-algorithm set, JWT parse/sign/verify
//! - **Trust** (`authority`): issuer discovery, delegation, authority
//!   caching
//! - **Verification** (`assertion`, `verify`, `attrcert`): backed-assertion
//!   framing and the verification pipeline
//! - **Reauthentication** (`reauth`, `identity`, `cache`): key schedule,
//!   ticket and replay caches, identity materialization
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use browserid::{BidConfig, BidContext, VerifyOptions};
//!
//! # async fn example() -> Result<(), browserid::BidError> {
//! let context = BidContext::new(BidConfig::default())?;
//!
//! let verified = context
//!     .verify_assertion(
//!         "~eyJ...~eyJ...",            // backed assertion
//!         "https://rp.example.com",    // expected audience
//!         None,                        // channel bindings
//!         chrono::Utc::now().timestamp_millis(),
//!         &VerifyOptions::default(),
//!     )
//!     .await?;
//!
//! println!("verified {:?}", verified.identity.email());
//! # Ok(())
//! # }
//! ```
//!
//! # Reauthentication
//!
//! After a primary verification and session-key establishment, the
//! acceptor registers credentials with
//! [`BidContext::register_reauth_credentials`] and returns the resulting
//! ticket to the initiator, which stores it via
//! [`BidContext::store_ticket`]. Later contexts call
//! [`BidContext::reauth_assertion`] to mint a keyed authenticator that
//! verifies without touching the network.

pub mod assertion;
pub mod authority;
pub mod cache;
pub mod codec;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod jose;
pub mod json;
pub mod verify;

mod attrcert;
mod reauth;

// Re-exports for the public API
pub use assertion::{pack_audience, unpack_audience, BackedAssertion};
pub use authority::AuthorityResolver;
pub use cache::{Cache, CachePurpose};
pub use config::{BidConfig, BidConfigBuilder, ContextOptions, BID_MAX_CERTS};
pub use context::{BidContext, BidContextBuilder};
pub use crypto::{EcCurve, EcdhKey, SecretBytes, ShaAlgorithm};
pub use error::{BidError, BidResult};
pub use identity::Identity;
pub use jose::{Jwk, Jwt, KeySource, SignatureAlgorithm};
pub use json::Timestamp;
pub use verify::{VerifiedAssertion, VerifyOptions};
