//! Attribute Certificates
//!
//! Selectively disclosed attribute certificates are IdP-signed JWTs
//! carried in the assertion payload's `attr-certs` array. Each must be
//! issued by the leaf certificate's issuer, be bound to the leaf
//! certificate by a `cb` hash, verify under the authority key, and
//! satisfy the expiry policy. Invalid entries are logged and skipped so
//! this path never fails an otherwise valid verification, unless the
//! caller opts into strict mode.

// Layer 2: Third-party crate imports
use serde_json::{Map, Value};
use tracing::debug;

// Layer 3: Internal module imports
use crate::assertion::BackedAssertion;
use crate::codec;
use crate::error::{BidError, BidResult};
use crate::jose::jwk::KeySource;
use crate::jose::jwt::Jwt;
use crate::json::{self, Timestamp};
use crate::verify::validate_expiry;

/// Claims that never propagate out of an attribute certificate.
const RESERVED_CLAIMS: [&str; 5] = ["iss", "exp", "iat", "cb", "id"];

/// Validate the assertion's attribute certificates and collect their
/// claims: flattened into one map, or keyed by certificate `id`.
pub(crate) fn validate_attr_certs(
    backed: &BackedAssertion,
    verification_time: Timestamp,
    skew_ms: i64,
    authority_keys: &KeySource,
    flatten: bool,
    strict: bool,
) -> BidResult<Value> {
    let mut collected = Map::new();

    let attr_certs = match backed.assertion.payload.get("attr-certs") {
        None => return Ok(Value::Object(collected)),
        Some(member) => member
            .as_array()
            .ok_or(BidError::InvalidAssertion)?,
    };
    if attr_certs.is_empty() {
        return Ok(Value::Object(collected));
    }

    let leaf = backed.leaf_cert().ok_or(BidError::MissingCert)?;
    let leaf_issuer = json::str_value(&leaf.payload, "iss").ok_or(BidError::MissingIssuer)?;
    let leaf_hash = codec::replay_key(&leaf.encoded);

    for entry in attr_certs {
        match validate_one(
            entry,
            verification_time,
            skew_ms,
            authority_keys,
            leaf_issuer,
            &leaf_hash,
        ) {
            Ok((id, claims)) => {
                if flatten {
                    if let Some(claims) = claims.as_object() {
                        for (key, value) in claims {
                            collected.insert(key.clone(), value.clone());
                        }
                    }
                } else if let Some(id) = id {
                    collected.insert(id, claims);
                }
            }
            Err(e) if strict => return Err(e),
            Err(e) => {
                debug!(error = %e, "skipping invalid attribute certificate");
            }
        }
    }

    Ok(Value::Object(collected))
}

fn validate_one(
    entry: &Value,
    verification_time: Timestamp,
    skew_ms: i64,
    authority_keys: &KeySource,
    leaf_issuer: &str,
    leaf_hash: &str,
) -> BidResult<(Option<String>, Value)> {
    let encoded = entry.as_str().ok_or(BidError::InvalidAssertion)?;
    let attr_cert = Jwt::parse(encoded)?;

    // Expiry is inherited from the leaf certificate unless the attribute
    // certificate declares its own.
    if attr_cert.payload.get("exp").is_some() {
        validate_expiry(&attr_cert.payload, verification_time, skew_ms)
            .map_err(BidError::for_certificate)?;
    }

    if let Some(issuer) = json::str_value(&attr_cert.payload, "iss") {
        if issuer != leaf_issuer {
            return Err(BidError::InvalidIssuer);
        }
    }

    attr_cert.verify(authority_keys)?;

    let binding = json::str_value(&attr_cert.payload, "cb").ok_or(BidError::MissingCertBinding)?;
    if binding != leaf_hash {
        return Err(BidError::CertBindingMismatch);
    }

    let claims: Map<String, Value> = attr_cert
        .payload
        .as_object()
        .map(|payload| {
            payload
                .iter()
                .filter(|(key, _)| !RESERVED_CLAIMS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    let id = json::str_value(&attr_cert.payload, "id").map(str::to_string);

    Ok((id, Value::Object(claims)))
}
