//! Fast Reauthentication
//!
//! After one successful primary verification and session-key
//! establishment, the initiator can present a cheap keyed authenticator
//! bound to the original audience instead of a full certificate chain.
//!
//! Key schedule: `ARK = derive(sessionKey, "ARK")` is the authenticator
//! root key; each authenticator's session key is
//! `derive(ARK, signing_input(authenticator))`, so both sides agree on a
//! fresh key per reauthentication without further exchange.

// Layer 2: Third-party crate imports
use rand::RngCore;
use serde_json::{json, Map, Value};
use tracing::debug;

// Layer 3: Internal module imports
use crate::assertion::BackedAssertion;
use crate::cache::Cache;
use crate::codec;
use crate::config::BidConfig;
use crate::crypto::kdf::derive_key;
use crate::crypto::secret::SecretBytes;
use crate::error::{BidError, BidResult};
use crate::identity::Identity;
use crate::jose::alg::SignatureAlgorithm;
use crate::jose::jwk::Jwk;
use crate::jose::jwt::Jwt;
use crate::json::{self, Timestamp};
use crate::verify::validate_expiry;

const ARK_SALT: &[u8] = b"ARK";
const NONCE_LEN: usize = 16;

/// Derive the authenticator root key from a session key, as a symmetric
/// JWK.
pub(crate) fn derive_ark_jwk(session_key: &SecretBytes) -> BidResult<Value> {
    let ark = derive_key(session_key.expose(), ARK_SALT)?;
    Ok(json!({"secret-key": ark.to_base64url()}))
}

/// Derive the per-authenticator session key from an ARK JWK and the
/// authenticator's signing input.
pub(crate) fn derive_authenticator_session_key(
    ark: &Value,
    signing_input: &str,
) -> BidResult<SecretBytes> {
    let ark_key = Jwk::from_value(ark.clone())?.secret_key()?;
    derive_key(ark_key.expose(), signing_input.as_bytes())
}

fn generate_nonce() -> String {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    codec::base64url_encode(&nonce)
}

/// Build an authenticator payload for `packed_audience` referencing the
/// ticket `jti`.
fn make_authenticator(
    packed_audience: &str,
    channel_bindings: Option<&[u8]>,
    ticket_jti: &Value,
    now: Timestamp,
    skew_ms: i64,
) -> Value {
    let mut payload = Map::new();
    payload.insert("iat".to_string(), Value::from(now));
    payload.insert("exp".to_string(), Value::from(now + skew_ms));
    payload.insert("n".to_string(), Value::String(generate_nonce()));
    payload.insert("tkt".to_string(), ticket_jti.clone());
    payload.insert("aud".to_string(), Value::String(packed_audience.to_string()));
    if let Some(bindings) = channel_bindings {
        payload.insert(
            "cbt".to_string(),
            Value::String(codec::base64url_encode(bindings)),
        );
    }
    Value::Object(payload)
}

/// Locate a ticket-cache credential: by packed audience, or by
/// `(audience, subject)` scan when a subject hint is supplied.
fn find_ticket(
    ticket_cache: &Cache,
    packed_audience: &str,
    subject: Option<&str>,
) -> BidResult<Value> {
    match subject {
        None => ticket_cache.get(packed_audience),
        Some(subject) => ticket_cache
            .entries()?
            .into_iter()
            .map(|(_, value)| value)
            .find(|value| {
                json::str_value(value, "audience") == Some(packed_audience)
                    && json::str_value(value, "sub") == Some(subject)
            })
            .ok_or(BidError::CacheKeyNotFound),
    }
}

/// Identity minted from a stored credential and an authenticator: the
/// credential attributes minus secrets, with the derived session key.
fn make_reauth_identity(credential: &Value, signing_input: &str) -> BidResult<Identity> {
    let ark = credential.get("ark").ok_or(BidError::BadTicketCache)?;
    let session_key = derive_authenticator_session_key(ark, signing_input)?;

    let attributes: Map<String, Value> = credential
        .as_object()
        .ok_or(BidError::BadTicketCache)?
        .iter()
        .filter(|(key, _)| key.as_str() != "ark" && key.as_str() != "a-exp")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let mut identity = Identity::new(Value::Object(attributes));
    if let Some(assertion_expiry) = credential.get("a-exp") {
        if let Some(private) = identity.private_attributes_mut().as_object_mut() {
            private.insert("a-exp".to_string(), assertion_expiry.clone());
        }
    }
    identity.set_session_key(session_key);
    Ok(identity)
}

/// Mint a reauthentication assertion from the ticket cache.
///
/// Returns the packed assertion, the asserted identity (session key
/// already derived) and the ticket expiry.
pub(crate) fn get_reauth_assertion(
    ticket_cache: &Cache,
    config: &BidConfig,
    packed_audience: &str,
    channel_bindings: Option<&[u8]>,
    subject: Option<&str>,
    now: Timestamp,
) -> BidResult<(String, Identity, Option<Timestamp>)> {
    let credential = find_ticket(ticket_cache, packed_audience, subject)?;

    let ticket = credential.get("tkt").ok_or(BidError::BadTicketCache)?;
    let jti = ticket.get("jti").ok_or(BidError::BadTicketCache)?;

    // A dead ticket must never yield an assertion.
    validate_expiry(ticket, now, config.skew_ms())?;

    let payload = make_authenticator(
        packed_audience,
        channel_bindings,
        jti,
        now,
        config.skew_ms(),
    );

    let ark = credential.get("ark").ok_or(BidError::BadTicketCache)?;
    let ark_jwk = Jwk::from_value(ark.clone())?;
    let authenticator = Jwt::sign(payload, SignatureAlgorithm::Hs256, &ark_jwk)?;

    let assertion = BackedAssertion::pack(&[], &authenticator);
    let identity = make_reauth_identity(&credential, &authenticator.signing_input)?;
    let expiry = json::ts_value(ticket, "exp");

    debug!(audience = packed_audience, "minted reauth assertion");

    Ok((assertion, identity, expiry))
}

/// Acceptor half of the reauth fast path: resolve the authenticator's
/// ticket to the stored credential record and prepare the identity.
///
/// The authenticator's own `exp` is deleted before the caller applies the
/// expiry policy: authenticators live exactly `skew` past their `iat`, no
/// matter what the initiator attached. The signature is checked later in
/// the pipeline under the returned ARK.
pub(crate) fn verify_authenticator(
    replay_cache: &Cache,
    backed: &mut BackedAssertion,
    verification_time: Timestamp,
    config: &BidConfig,
) -> BidResult<(Identity, Value)> {
    let ticket_jti = json::str_value(&backed.assertion.payload, "tkt")
        .ok_or(BidError::InvalidAssertion)?
        .to_string();

    let credential = replay_cache
        .get(&ticket_jti)
        .map_err(|_| BidError::InvalidAssertion)?;

    // The ticket itself must still be alive, independently of the
    // authenticator's claims.
    let ticket_expiry = json::ts_value(&credential, "r-exp")
        .or_else(|| json::ts_value(&credential, "exp"));
    let ticket_window = json!({
        "iat": credential.get("iat").cloned().unwrap_or(Value::Null),
        "exp": ticket_expiry.map(Value::from).unwrap_or(Value::Null),
    });
    validate_expiry(&ticket_window, verification_time, config.skew_ms())?;

    if let Some(payload) = backed.assertion.payload.as_object_mut() {
        payload.remove("exp");
    }

    let ark = credential
        .get("ark")
        .cloned()
        .ok_or(BidError::BadTicketCache)?;
    let identity = make_reauth_identity(&credential, &backed.assertion.signing_input)?;

    Ok((identity, ark))
}

/// Register reauthentication credentials after a primary verification:
/// enrich the assertion's replay record with the identity attributes, the
/// ARK and the ticket lease, and hand the ticket to the identity.
///
/// Requires the session key established by the security-context layer.
pub(crate) fn register_credentials(
    replay_cache: &Cache,
    identity: &mut Identity,
    assertion: &str,
    verification_time: Timestamp,
    config: &BidConfig,
) -> BidResult<()> {
    let session_key = identity.session_key().ok_or(BidError::NoKey)?;
    let ark = derive_ark_jwk(session_key)?;

    let replay_key = codec::replay_key(assertion);
    let ticket_expiry = verification_time + config.ticket_lifetime_ms();

    let mut record: Map<String, Value> = identity
        .attributes()
        .as_object()
        .cloned()
        .unwrap_or_default();
    record.insert("iat".to_string(), Value::from(verification_time));
    let assertion_expiry = identity
        .expires()
        .unwrap_or(verification_time + config.skew_ms());
    record.insert("exp".to_string(), Value::from(assertion_expiry));
    record.insert("ark".to_string(), ark);
    record.insert("r-exp".to_string(), Value::from(ticket_expiry));

    replay_cache.set(&replay_key, Value::Object(record))?;

    let ticket = json!({"jti": replay_key, "exp": ticket_expiry});
    if let Some(private) = identity.private_attributes_mut().as_object_mut() {
        private.insert("tkt".to_string(), ticket);
    }

    Ok(())
}

/// Initiator half of credential storage: persist a credential under the
/// packed audience so future contexts can reauthenticate.
pub(crate) fn store_ticket(
    ticket_cache: &Cache,
    identity: &Identity,
    packed_audience: &str,
    ticket: &Value,
) -> BidResult<()> {
    if !ticket.is_object() {
        return Err(BidError::InvalidParameter("ticket"));
    }
    let session_key = identity.session_key().ok_or(BidError::NoKey)?;
    let ark = derive_ark_jwk(session_key)?;

    let mut credential: Map<String, Value> = identity
        .attributes()
        .as_object()
        .cloned()
        .unwrap_or_default();
    credential.insert("tkt".to_string(), ticket.clone());
    credential.insert("ark".to_string(), ark);
    if let Some(assertion_expiry) = identity.expires() {
        credential.insert("a-exp".to_string(), Value::from(assertion_expiry));
    }

    ticket_cache.set(packed_audience, Value::Object(credential))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn now_ms() -> Timestamp {
        Utc::now().timestamp_millis()
    }

    fn config() -> BidConfig {
        BidConfig::builder().reauth(true).build().unwrap()
    }

    fn identity_with_key() -> Identity {
        let mut identity = Identity::new(json!({
            "email": "alice@example.org",
            "sub": "alice@example.org",
            "audience": "https://rp.example.com",
            "expires": now_ms() + 3_600_000,
        }));
        identity.set_session_key(SecretBytes::new(vec![0x42; 32]));
        identity
    }

    #[test]
    fn test_ark_derivation_is_deterministic() {
        let key = SecretBytes::new(vec![7; 32]);
        assert_eq!(derive_ark_jwk(&key).unwrap(), derive_ark_jwk(&key).unwrap());
    }

    #[test]
    fn test_register_then_mint_then_verify() {
        let replay = Cache::memory();
        let tickets = Cache::memory();
        let config = config();
        let t = now_ms();

        // Acceptor registers credentials after context establishment.
        let mut acceptor_identity = identity_with_key();
        register_credentials(&replay, &mut acceptor_identity, "~fake.assertion.bytes", t, &config)
            .unwrap();
        let ticket = acceptor_identity.ticket().cloned().unwrap();
        assert!(ticket.get("jti").is_some());

        // Initiator stores the returned ticket.
        let initiator_identity = identity_with_key();
        store_ticket(&tickets, &initiator_identity, "https://rp.example.com", &ticket).unwrap();

        // Initiator mints a reauth assertion.
        let (assertion, minted_identity, expiry) = get_reauth_assertion(
            &tickets,
            &config,
            "https://rp.example.com",
            None,
            None,
            now_ms(),
        )
        .unwrap();
        assert!(assertion.starts_with('~'));
        assert!(expiry.is_some());
        let minted_key = minted_identity.session_key().cloned().unwrap();

        // Acceptor resolves the authenticator back to the credential.
        let mut backed = BackedAssertion::unpack(&assertion, 6).unwrap();
        let (accepted_identity, ark) =
            verify_authenticator(&replay, &mut backed, now_ms(), &config).unwrap();

        // Authenticator exp was stripped; signature verifies under the ARK.
        assert!(backed.assertion.payload.get("exp").is_none());
        backed
            .assertion
            .verify_with_key(&Jwk::from_value(ark).unwrap())
            .unwrap();

        // Both sides derive the same per-authenticator session key.
        assert_eq!(accepted_identity.session_key().cloned().unwrap(), minted_key);
        assert_eq!(accepted_identity.email(), Some("alice@example.org"));
    }

    #[test]
    fn test_expired_ticket_refuses_to_mint() {
        let tickets = Cache::memory();
        let config = config();
        let t = now_ms();

        let mut identity = identity_with_key();
        let dead_ticket = json!({"jti": "abc", "exp": t - 10 * 3_600_000});
        store_ticket(&tickets, &identity, "aud", &dead_ticket).unwrap();
        identity.clear_session_key();

        assert_eq!(
            get_reauth_assertion(&tickets, &config, "aud", None, None, t).unwrap_err(),
            BidError::ExpiredAssertion
        );
    }

    #[test]
    fn test_missing_ticket_is_bad_cache() {
        let tickets = Cache::memory();
        let identity = identity_with_key();
        // Credential without a `tkt` member.
        tickets
            .set("aud", identity.attributes().clone())
            .unwrap();

        assert_eq!(
            get_reauth_assertion(&tickets, &config(), "aud", None, None, now_ms()).unwrap_err(),
            BidError::BadTicketCache
        );
    }

    #[test]
    fn test_subject_scan_lookup() {
        let tickets = Cache::memory();
        let identity = identity_with_key();
        let ticket = json!({"jti": "j", "exp": now_ms() + 3_600_000});
        store_ticket(&tickets, &identity, "https://rp.example.com", &ticket).unwrap();

        find_ticket(&tickets, "https://rp.example.com", Some("alice@example.org")).unwrap();
        assert_eq!(
            find_ticket(&tickets, "https://rp.example.com", Some("mallory@example.org"))
                .unwrap_err(),
            BidError::CacheKeyNotFound
        );
    }

    #[test]
    fn test_register_requires_session_key() {
        let replay = Cache::memory();
        let mut identity = Identity::new(json!({"email": "a@b.c"}));
        assert_eq!(
            register_credentials(&replay, &mut identity, "~a.b.c", now_ms(), &config())
                .unwrap_err(),
            BidError::NoKey
        );
    }

    #[test]
    fn test_unknown_authenticator_ticket() {
        let replay = Cache::memory();
        let config = config();

        let ark = derive_ark_jwk(&SecretBytes::new(vec![1; 32])).unwrap();
        let payload = make_authenticator("aud", None, &json!("unknown"), now_ms(), 300_000);
        let authenticator =
            Jwt::sign(payload, SignatureAlgorithm::Hs256, &Jwk::from_value(ark).unwrap()).unwrap();
        let mut backed =
            BackedAssertion::unpack(&BackedAssertion::pack(&[], &authenticator), 6).unwrap();

        assert_eq!(
            verify_authenticator(&replay, &mut backed, now_ms(), &config).unwrap_err(),
            BidError::InvalidAssertion
        );
    }
}
