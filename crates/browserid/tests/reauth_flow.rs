//! End-to-end fast-reauthentication: primary verification, credential
//! registration, ticket storage, minting, and acceptor-side verification.

use std::sync::OnceLock;

use browserid::{
    codec, BackedAssertion, BidConfig, BidContext, BidError, Jwk, Jwt, SecretBytes,
    SignatureAlgorithm, VerifyOptions,
};
use chrono::Utc;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUDIENCE: &str = "https://rp.example.com";

struct TestKeys {
    authority_private: Value,
    authority_public: Value,
    leaf_private: Value,
    leaf_public: Value,
}

fn keys() -> &'static TestKeys {
    static KEYS: OnceLock<TestKeys> = OnceLock::new();
    KEYS.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let authority = RsaPrivateKey::new(&mut rng, 2048).expect("authority key");
        let leaf = RsaPrivateKey::new(&mut rng, 2048).expect("leaf key");
        let (authority_private, authority_public) = rsa_jwk(&authority);
        let (leaf_private, leaf_public) = rsa_jwk(&leaf);
        TestKeys {
            authority_private,
            authority_public,
            leaf_private,
            leaf_public,
        }
    })
}

fn rsa_jwk(key: &RsaPrivateKey) -> (Value, Value) {
    let n = codec::base64url_encode(&key.n().to_bytes_be());
    let e = codec::base64url_encode(&key.e().to_bytes_be());
    let d = codec::base64url_encode(&key.d().to_bytes_be());
    (
        json!({"version": "2012.08.15", "algorithm": "RS", "n": n, "e": e, "d": d}),
        json!({"version": "2012.08.15", "algorithm": "RS", "n": n, "e": e}),
    )
}

fn primary_assertion(now: i64) -> String {
    let authority_key = Jwk::from_value(keys().authority_private.clone()).expect("jwk");
    let leaf_key = Jwk::from_value(keys().leaf_private.clone()).expect("jwk");

    let cert = Jwt::sign(
        json!({
            "iss": "example.org",
            "exp": now + 3_600_000,
            "principal": {"email": "alice@example.org"},
            "public-key": keys().leaf_public,
        }),
        SignatureAlgorithm::Rs256,
        &authority_key,
    )
    .expect("cert");

    let assertion = Jwt::sign(
        json!({"aud": AUDIENCE, "exp": now + 120_000, "iat": now}),
        SignatureAlgorithm::Rs256,
        &leaf_key,
    )
    .expect("assertion");

    BackedAssertion::pack(std::slice::from_ref(&cert), &assertion)
}

async fn reauth_context(server: &MockServer) -> BidContext {
    let config = BidConfig::builder()
        .authority_proxy(url::Url::parse(&server.uri()).expect("server uri"))
        .reauth(true)
        .build()
        .expect("config");
    BidContext::new(config).expect("context")
}

async fn mount_authority(server: &MockServer, now: i64) {
    Mock::given(method("GET"))
        .and(path("/example.org/.well-known/browserid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "public-key": keys().authority_public,
            "expires": now + 3_600_000,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn s6_full_reauth_round_trip() {
    let now = Utc::now().timestamp_millis();
    let server = MockServer::start().await;
    mount_authority(&server, now).await;
    let context = reauth_context(&server).await;

    // Primary verification on the acceptor.
    let assertion = primary_assertion(now);
    let mut verified = context
        .verify_assertion(&assertion, AUDIENCE, None, now, &VerifyOptions::default())
        .await
        .expect("primary verification");
    assert!(!verified.reauth);

    // The security-context layer establishes a session key on both sides.
    let session_key = SecretBytes::new(vec![0x5a; 32]);
    verified.identity.set_session_key(session_key.clone());

    // Acceptor registers the reauth credential and hands the ticket back.
    context
        .register_reauth_credentials(&mut verified.identity, &assertion, now)
        .expect("credential registration");
    let ticket = verified.identity.ticket().cloned().expect("ticket");
    assert!(ticket.get("jti").is_some());
    assert!(ticket.get("exp").is_some());

    // Initiator stores the ticket against the audience.
    context
        .store_ticket(&verified.identity, AUDIENCE, None, &ticket)
        .expect("ticket storage");

    // Initiator mints a reauthentication assertion.
    let (reauth_assertion, minted_identity, ticket_expiry) = context
        .reauth_assertion(AUDIENCE, None, None)
        .expect("reauth minting");
    assert!(reauth_assertion.starts_with('~'));
    assert!(ticket_expiry.is_some());
    let minted_key = minted_identity.session_key().cloned().expect("session key");

    // Acceptor verifies the reauth assertion; no network involved.
    let accepted = context
        .verify_assertion(
            &reauth_assertion,
            AUDIENCE,
            None,
            Utc::now().timestamp_millis(),
            &VerifyOptions::default(),
        )
        .await
        .expect("reauth verification");

    assert!(accepted.reauth);
    assert_eq!(accepted.identity.email(), Some("alice@example.org"));
    // Both sides derived the same per-authenticator session key.
    assert_eq!(accepted.identity.session_key().cloned().expect("key"), minted_key);
}

#[tokio::test]
async fn reauth_assertion_replays_are_rejected() {
    let now = Utc::now().timestamp_millis();
    let server = MockServer::start().await;
    mount_authority(&server, now).await;
    let context = reauth_context(&server).await;

    let assertion = primary_assertion(now);
    let mut verified = context
        .verify_assertion(&assertion, AUDIENCE, None, now, &VerifyOptions::default())
        .await
        .expect("primary verification");
    verified.identity.set_session_key(SecretBytes::new(vec![0x5a; 32]));
    context
        .register_reauth_credentials(&mut verified.identity, &assertion, now)
        .expect("registration");
    let ticket = verified.identity.ticket().cloned().expect("ticket");
    context
        .store_ticket(&verified.identity, AUDIENCE, None, &ticket)
        .expect("storage");

    let (reauth_assertion, _, _) = context
        .reauth_assertion(AUDIENCE, None, None)
        .expect("minting");

    let t = Utc::now().timestamp_millis();
    context
        .verify_assertion(&reauth_assertion, AUDIENCE, None, t, &VerifyOptions::default())
        .await
        .expect("first acceptance");

    let err = context
        .verify_assertion(&reauth_assertion, AUDIENCE, None, t + 1_000, &VerifyOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, BidError::ReplayedAssertion);
}

#[tokio::test]
async fn no_reauth_flag_refuses_the_fast_path() {
    let now = Utc::now().timestamp_millis();
    let server = MockServer::start().await;
    mount_authority(&server, now).await;
    let context = reauth_context(&server).await;

    let assertion = primary_assertion(now);
    let mut verified = context
        .verify_assertion(&assertion, AUDIENCE, None, now, &VerifyOptions::default())
        .await
        .expect("primary verification");
    verified.identity.set_session_key(SecretBytes::new(vec![0x5a; 32]));
    context
        .register_reauth_credentials(&mut verified.identity, &assertion, now)
        .expect("registration");
    context
        .store_ticket(
            &verified.identity,
            AUDIENCE,
            None,
            &verified.identity.ticket().cloned().expect("ticket"),
        )
        .expect("storage");

    let (reauth_assertion, _, _) = context
        .reauth_assertion(AUDIENCE, None, None)
        .expect("minting");

    let options = VerifyOptions {
        no_reauth: true,
        ..VerifyOptions::default()
    };
    let err = context
        .verify_assertion(
            &reauth_assertion,
            AUDIENCE,
            None,
            Utc::now().timestamp_millis(),
            &options,
        )
        .await
        .unwrap_err();
    assert_eq!(err, BidError::InvalidAssertion);
}

#[tokio::test]
async fn subject_hint_selects_the_credential() {
    let now = Utc::now().timestamp_millis();
    let server = MockServer::start().await;
    mount_authority(&server, now).await;
    let context = reauth_context(&server).await;

    let assertion = primary_assertion(now);
    let mut verified = context
        .verify_assertion(&assertion, AUDIENCE, None, now, &VerifyOptions::default())
        .await
        .expect("primary verification");
    verified.identity.set_session_key(SecretBytes::new(vec![0x5a; 32]));
    context
        .register_reauth_credentials(&mut verified.identity, &assertion, now)
        .expect("registration");
    context
        .store_ticket(
            &verified.identity,
            AUDIENCE,
            None,
            &verified.identity.ticket().cloned().expect("ticket"),
        )
        .expect("storage");

    context
        .reauth_assertion(AUDIENCE, None, Some("alice@example.org"))
        .expect("minting with matching subject hint");

    let err = context
        .reauth_assertion(AUDIENCE, None, Some("mallory@example.org"))
        .unwrap_err();
    assert_eq!(err, BidError::CacheKeyNotFound);
}
