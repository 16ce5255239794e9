//! Error Types for Assertion Verification and Reauthentication
//!
//! This module provides the closed error taxonomy used across the crate,
//! with stable integer codes for embedding in foreign error surfaces.

/// Errors produced by assertion verification, reauthentication and their
/// supporting machinery.
///
/// The set is closed: new failure modes map onto an existing variant. Each
/// variant has a stable integer code (see [`BidError::code`]) that never
/// changes between releases.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BidError {
    // --- Input ---
    /// Assertion is structurally malformed (bad framing, missing segments)
    #[error("invalid assertion")]
    InvalidAssertion,

    /// A JSON document failed to parse
    #[error("invalid JSON")]
    InvalidJson,

    /// A base64url segment failed to decode
    #[error("invalid base64")]
    InvalidBase64,

    /// A JWT had the wrong segment count or a non-object header/payload
    #[error("invalid JSON web token")]
    InvalidJwt,

    /// A caller-supplied argument was unusable
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Certificate chain exceeds the permitted length
    #[error("too many certificates")]
    TooManyCerts,

    // --- Audience and time ---
    /// Assertion carries no audience claim
    #[error("missing audience")]
    MissingAudience,

    /// Assertion audience does not match the expected audience
    #[error("bad audience")]
    BadAudience,

    /// Channel bindings were supplied but the assertion has no `cbt` claim
    #[error("missing channel bindings")]
    MissingChannelBindings,

    /// Assertion `cbt` does not match the supplied channel bindings
    #[error("channel bindings mismatch")]
    ChannelBindingsMismatch,

    /// Assertion expiry lies too far in the past
    #[error("expired assertion")]
    ExpiredAssertion,

    /// Assertion `nbf` lies too far in the future
    #[error("assertion not yet valid")]
    AssertionNotYetValid,

    /// Certificate expiry lies too far in the past
    #[error("expired certificate")]
    ExpiredCert,

    /// Certificate `nbf` lies too far in the future
    #[error("certificate not yet valid")]
    CertNotYetValid,

    // --- Trust ---
    /// Certificate carries no issuer claim
    #[error("missing issuer")]
    MissingIssuer,

    /// Issuer or principal email is not parseable as a domain
    #[error("invalid issuer")]
    InvalidIssuer,

    /// Issuer is not authoritative for the principal's email domain
    #[error("untrusted issuer")]
    UntrustedIssuer,

    /// Leaf certificate carries no principal
    #[error("missing principal")]
    MissingPrincipal,

    /// Principal exists but has no recognized naming attribute
    #[error("unknown principal type")]
    UnknownPrincipalType,

    /// Operation requires a certificate the assertion does not carry
    #[error("missing certificate")]
    MissingCert,

    // --- Keys and signatures ---
    /// JWT `alg` or JWK `algorithm` names an algorithm outside the closed set
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// JWT header carries no `alg`
    #[error("missing algorithm")]
    MissingAlgorithm,

    /// A JWK is missing required fields or its fields do not decode
    #[error("invalid key")]
    InvalidKey,

    /// A keyset document is structurally unusable
    #[error("invalid key set")]
    InvalidKeySet,

    /// No key was available to verify or sign with
    #[error("no key")]
    NoKey,

    /// A signature failed verification
    #[error("invalid signature")]
    InvalidSignature,

    /// An underlying cryptographic operation failed
    #[error("crypto error: {0}")]
    CryptoError(String),

    // --- Attribute certificates ---
    /// Attribute certificate carries no `cb` binding
    #[error("missing certificate binding")]
    MissingCertBinding,

    /// Attribute certificate `cb` does not match the leaf certificate hash
    #[error("certificate binding mismatch")]
    CertBindingMismatch,

    // --- Replay and reauthentication ---
    /// Assertion was already accepted within its lifetime
    #[error("replayed assertion")]
    ReplayedAssertion,

    /// Ticket cache entry is present but unusable
    #[error("bad ticket cache")]
    BadTicketCache,

    /// No ticket cache is configured
    #[error("no ticket cache")]
    NoTicketCache,

    // --- I/O ---
    /// Authority document retrieval failed
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The authority document has not changed since the cached copy.
    /// Sentinel, not a failure; never escapes the resolver.
    #[error("document not modified")]
    DocumentNotModified,

    /// Cache lookup missed
    #[error("cache key not found")]
    CacheKeyNotFound,

    /// Cache file could not be opened or persisted
    #[error("cache open error: {0}")]
    CacheOpenError(String),

    // --- Resource ---
    /// A buffer was too small for the requested operation
    #[error("buffer too small")]
    BufferTooSmall,

    /// An input exceeded an internal size bound
    #[error("buffer too long")]
    BufferTooLong,

    /// The requested facility is disabled in this configuration
    #[error("unavailable")]
    Unavailable,

    /// The requested facility is not implemented
    #[error("not implemented")]
    NotImplemented,
}

/// Type alias for results produced by this crate
pub type BidResult<T> = Result<T, BidError>;

impl BidError {
    /// Stable integer code for this error.
    ///
    /// Codes are grouped by stage (input 1x, audience/time 2x, trust 3x,
    /// key/signature 4x, attribute-cert 5x, replay/reauth 6x, I/O 7x,
    /// resource 8x) and are part of the public contract.
    pub fn code(&self) -> u32 {
        match self {
            BidError::InvalidAssertion => 10,
            BidError::InvalidJson => 11,
            BidError::InvalidBase64 => 12,
            BidError::InvalidJwt => 13,
            BidError::InvalidParameter(_) => 14,
            BidError::TooManyCerts => 15,
            BidError::MissingAudience => 20,
            BidError::BadAudience => 21,
            BidError::MissingChannelBindings => 22,
            BidError::ChannelBindingsMismatch => 23,
            BidError::ExpiredAssertion => 24,
            BidError::AssertionNotYetValid => 25,
            BidError::ExpiredCert => 26,
            BidError::CertNotYetValid => 27,
            BidError::MissingIssuer => 30,
            BidError::InvalidIssuer => 31,
            BidError::UntrustedIssuer => 32,
            BidError::MissingPrincipal => 33,
            BidError::UnknownPrincipalType => 34,
            BidError::MissingCert => 35,
            BidError::UnknownAlgorithm(_) => 40,
            BidError::MissingAlgorithm => 41,
            BidError::InvalidKey => 42,
            BidError::InvalidKeySet => 43,
            BidError::NoKey => 44,
            BidError::InvalidSignature => 45,
            BidError::CryptoError(_) => 46,
            BidError::MissingCertBinding => 50,
            BidError::CertBindingMismatch => 51,
            BidError::ReplayedAssertion => 60,
            BidError::BadTicketCache => 61,
            BidError::NoTicketCache => 62,
            BidError::HttpError(_) => 70,
            BidError::DocumentNotModified => 71,
            BidError::CacheKeyNotFound => 72,
            BidError::CacheOpenError(_) => 73,
            BidError::BufferTooSmall => 80,
            BidError::BufferTooLong => 81,
            BidError::Unavailable => 82,
            BidError::NotImplemented => 83,
        }
    }

    /// Rewrite assertion-expiry errors to their certificate-specific
    /// counterparts. Identity for every other variant.
    pub(crate) fn for_certificate(self) -> Self {
        match self {
            BidError::AssertionNotYetValid => BidError::CertNotYetValid,
            BidError::ExpiredAssertion => BidError::ExpiredCert,
            other => other,
        }
    }
}
