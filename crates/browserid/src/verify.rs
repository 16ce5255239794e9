//! Assertion Verification
//!
//! The full backed-assertion pipeline: unpack, reauth fast path, audience
//! and channel-binding checks, the expiry policy, certificate-chain
//! validation against the issuer authority, assertion signature, replay
//! gate, and identity materialization. Every failure is fatal; partial
//! results are never returned.

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

// Layer 3: Internal module imports
use crate::assertion::BackedAssertion;
use crate::attrcert;
use crate::authority::AuthorityResolver;
use crate::cache::Cache;
use crate::codec;
use crate::config::BidConfig;
use crate::error::{BidError, BidResult};
use crate::identity::Identity;
use crate::jose::jwk::KeySource;
use crate::json::{self, Timestamp};
use crate::reauth;

/// Caller-supplied verification options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// Refuse the reauthentication fast path even when the engine allows
    /// it
    pub no_reauth: bool,

    /// Merge attribute-certificate claims into a flat map instead of
    /// keying them by certificate id
    pub flatten_attr_certs: bool,

    /// Fail verification on the first invalid attribute certificate
    /// instead of skipping it
    pub strict_attr_certs: bool,
}

/// The outcome of a successful verification.
#[derive(Debug)]
pub struct VerifiedAssertion {
    /// The verified identity
    pub identity: Identity,

    /// Effective assertion expiry, milliseconds
    pub expiry: Option<Timestamp>,

    /// Whether the reauthentication fast path was taken
    pub reauth: bool,
}

/// Apply the expiry policy to a JWT payload.
///
/// `iat` too far in the future is a hard failure; `nbf` too far in the
/// future is "not yet valid"; a missing `exp` defaults to `iat + skew`
/// (skew doubles as the default lifetime); `exp` more than skew in the
/// past is "expired". A payload with neither `exp` nor `iat` carries no
/// temporal bound and is rejected outright.
pub(crate) fn validate_expiry(
    payload: &Value,
    verification_time: Timestamp,
    skew_ms: i64,
) -> BidResult<()> {
    let issued_at = json::ts_value(payload, "iat");
    if let Some(iat) = issued_at {
        if iat - verification_time > skew_ms {
            return Err(BidError::InvalidAssertion);
        }
    }

    if let Some(nbf) = json::ts_value(payload, "nbf") {
        if nbf - verification_time > skew_ms {
            return Err(BidError::AssertionNotYetValid);
        }
    }

    let expiry = match json::ts_value(payload, "exp") {
        Some(exp) => exp,
        None => issued_at.map(|iat| iat + skew_ms).ok_or(BidError::InvalidAssertion)?,
    };

    if verification_time - expiry > skew_ms {
        return Err(BidError::ExpiredAssertion);
    }

    Ok(())
}

/// One verification run, borrowing the engine's collaborators.
pub(crate) struct Verifier<'a> {
    pub config: &'a BidConfig,
    pub resolver: &'a AuthorityResolver,
    pub replay_cache: &'a Cache,
}

impl Verifier<'_> {
    pub(crate) async fn verify(
        &self,
        assertion: &str,
        audience: &str,
        channel_bindings: Option<&[u8]>,
        verification_time: Timestamp,
        options: &VerifyOptions,
    ) -> BidResult<VerifiedAssertion> {
        let skew_ms = self.config.skew_ms();

        let mut backed = BackedAssertion::unpack(assertion, self.config.max_certs)?;

        // Reauth fast path: no certificates, authenticator keyed by a
        // previously established ARK.
        let reauth_state = if backed.certificates.is_empty() {
            if !self.config.options.reauth || options.no_reauth {
                return Err(BidError::InvalidAssertion);
            }
            Some(reauth::verify_authenticator(
                self.replay_cache,
                &mut backed,
                verification_time,
                self.config,
            )?)
        } else {
            None
        };

        validate_audience(&backed, audience, channel_bindings)?;
        validate_expiry(&backed.assertion.payload, verification_time, skew_ms)?;

        // Multi-certificate chains parse but are rejected until chained
        // provisioning exists end to end.
        if backed.certificates.len() > 1 {
            return Err(BidError::TooManyCerts);
        }

        let authority_doc = if backed.certificates.is_empty() {
            None
        } else {
            self.validate_cert_issuer(&backed).await?;
            Some(self.validate_cert_chain(&backed, verification_time).await?)
        };

        self.verify_assertion_signature(&backed, reauth_state.as_ref().map(|(_, ark)| ark))?;

        if self.config.options.replay_cache {
            self.replay_gate(&backed, verification_time, skew_ms)?;
        }

        let (identity, reauth) = match reauth_state {
            Some((identity, _)) => (identity, true),
            None => {
                let leaf = backed.leaf_cert().ok_or(BidError::MissingCert)?;
                let mut identity =
                    Identity::from_assertion(&backed.assertion.payload, &leaf.payload)?;

                if let Some(doc) = &authority_doc {
                    let authority_keys = KeySource::from_value(doc.clone())?;
                    let claims = attrcert::validate_attr_certs(
                        &backed,
                        verification_time,
                        skew_ms,
                        &authority_keys,
                        options.flatten_attr_certs,
                        options.strict_attr_certs,
                    )?;
                    identity.merge_attributes(claims);
                }

                (identity, false)
            }
        };

        let expiry = identity
            .expires()
            .or_else(|| json::ts_value(&backed.assertion.payload, "exp"));

        debug!(
            email = identity.email().unwrap_or("<none>"),
            audience,
            reauth,
            "assertion verified"
        );

        Ok(VerifiedAssertion {
            identity,
            expiry,
            reauth,
        })
    }

    /// Leaf-certificate trust: the issuer must be authoritative for the
    /// principal email's domain.
    async fn validate_cert_issuer(&self, backed: &BackedAssertion) -> BidResult<()> {
        let leaf = backed.leaf_cert().ok_or(BidError::MissingCert)?;

        let principal = leaf
            .payload
            .get("principal")
            .ok_or(BidError::MissingPrincipal)?;
        let email = json::str_value(principal, "email").ok_or(BidError::UnknownPrincipalType)?;
        let email_domain = match email.split_once('@') {
            Some((_, domain)) if !domain.is_empty() => domain,
            _ => return Err(BidError::InvalidIssuer),
        };

        let cert_issuer = json::str_value(&leaf.payload, "iss").ok_or(BidError::MissingIssuer)?;

        self.resolver.is_authoritative(email_domain, cert_issuer).await
    }

    /// Walk the chain root to leaf: each certificate must satisfy the
    /// expiry policy and verify under its predecessor's key, the root
    /// under the authority key. Returns the resolved authority document.
    async fn validate_cert_chain(
        &self,
        backed: &BackedAssertion,
        verification_time: Timestamp,
    ) -> BidResult<Value> {
        let root = backed.root_cert().ok_or(BidError::MissingCert)?;
        let root_issuer = json::str_value(&root.payload, "iss").ok_or(BidError::MissingIssuer)?;

        let authority_doc = self.resolver.authority(root_issuer).await?;
        let mut signer = KeySource::from_value(authority_doc.clone())?;

        for certificate in &backed.certificates {
            validate_expiry(&certificate.payload, verification_time, self.config.skew_ms())
                .map_err(BidError::for_certificate)?;
            certificate.verify(&signer)?;
            signer = KeySource::from_value(certificate.payload.clone())?;
        }

        Ok(authority_doc)
    }

    /// The final JWT verifies under the leaf certificate's subject key, or
    /// under the ARK on the reauth path.
    fn verify_assertion_signature(
        &self,
        backed: &BackedAssertion,
        reauth_key: Option<&Value>,
    ) -> BidResult<()> {
        let keys = match reauth_key {
            Some(ark) => KeySource::from_value(ark.clone())?,
            None => {
                let leaf = backed.leaf_cert().ok_or(BidError::MissingCert)?;
                KeySource::from_value(leaf.payload.clone())?
            }
        };
        backed.assertion.verify(&keys)
    }

    /// No assertion is accepted twice within its lifetime.
    fn replay_gate(
        &self,
        backed: &BackedAssertion,
        verification_time: Timestamp,
        skew_ms: i64,
    ) -> BidResult<()> {
        let key = codec::replay_key(&backed.encoded);

        if let Ok(entry) = self.replay_cache.get(&key) {
            if json::ts_value(&entry, "exp").is_some_and(|exp| exp > verification_time) {
                debug!("replayed assertion");
                return Err(BidError::ReplayedAssertion);
            }
        }

        let expiry = json::ts_value(&backed.assertion.payload, "exp")
            .unwrap_or(verification_time + skew_ms);
        self.replay_cache.set(
            &key,
            json!({"iat": verification_time, "exp": expiry}),
        )
    }
}

/// Audience and channel-binding checks, in that order.
fn validate_audience(
    backed: &BackedAssertion,
    audience: &str,
    channel_bindings: Option<&[u8]>,
) -> BidResult<()> {
    let claims = &backed.assertion.payload;

    let assertion_audience = json::str_value(claims, "aud").ok_or(BidError::MissingAudience)?;
    if assertion_audience != audience {
        return Err(BidError::BadAudience);
    }

    if let Some(bindings) = channel_bindings {
        let assertion_bindings = match json::binary_value(claims, "cbt") {
            Ok(bytes) => bytes,
            Err(BidError::CacheKeyNotFound) => return Err(BidError::MissingChannelBindings),
            Err(e) => return Err(e),
        };
        if assertion_bindings != bindings {
            return Err(BidError::ChannelBindingsMismatch);
        }
    }

    Ok(())
}
