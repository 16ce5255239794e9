//! Engine Context
//!
//! [`BidContext`] ties the configuration, the authority resolver and the
//! three caches together behind the public operations: verification of
//! backed assertions, minting of reauthentication assertions, and the
//! credential bookkeeping between them.

// Layer 2: Third-party crate imports
use chrono::Utc;
use serde_json::Value;

// Layer 3: Internal module imports
use crate::assertion::pack_audience;
use crate::authority::AuthorityResolver;
use crate::cache::{Cache, CachePurpose};
use crate::config::BidConfig;
use crate::error::{BidError, BidResult};
use crate::identity::Identity;
use crate::json::Timestamp;
use crate::reauth;
use crate::verify::{VerifiedAssertion, Verifier, VerifyOptions};

/// The verification and reauthentication engine.
///
/// All operations run to completion on the calling task; only assertion
/// verification can suspend, on the authority resolver's HTTP fetch.
#[derive(Debug)]
pub struct BidContext {
    config: BidConfig,
    resolver: AuthorityResolver,
    replay_cache: Cache,
    ticket_cache: Cache,
}

impl BidContext {
    /// An engine with the given configuration and volatile in-memory
    /// caches.
    pub fn new(config: BidConfig) -> BidResult<Self> {
        Self::builder().config(config).build()
    }

    /// Start building an engine with explicit cache selection.
    pub fn builder() -> BidContextBuilder {
        BidContextBuilder::default()
    }

    /// The engine configuration.
    pub fn config(&self) -> &BidConfig {
        &self.config
    }

    /// The replay cache in use.
    pub fn replay_cache(&self) -> &Cache {
        &self.replay_cache
    }

    /// The ticket cache in use.
    pub fn ticket_cache(&self) -> &Cache {
        &self.ticket_cache
    }

    /// Verify a backed assertion against an expected audience and optional
    /// channel bindings at `verification_time` (milliseconds).
    ///
    /// On success the returned identity is fully materialized; on any
    /// failure no partial result escapes.
    pub async fn verify_assertion(
        &self,
        assertion: &str,
        audience: &str,
        channel_bindings: Option<&[u8]>,
        verification_time: Timestamp,
        options: &VerifyOptions,
    ) -> BidResult<VerifiedAssertion> {
        let expected_audience = self.effective_audience(audience, channel_bindings)?;

        let verifier = Verifier {
            config: &self.config,
            resolver: &self.resolver,
            replay_cache: &self.replay_cache,
        };
        verifier
            .verify(
                assertion,
                &expected_audience,
                channel_bindings,
                verification_time,
                options,
            )
            .await
    }

    /// Mint a fast-reauthentication assertion for `audience` from the
    /// ticket cache.
    ///
    /// Returns the packed assertion, the asserted identity (carrying the
    /// derived session key) and the ticket expiry.
    pub fn reauth_assertion(
        &self,
        audience: &str,
        channel_bindings: Option<&[u8]>,
        subject: Option<&str>,
    ) -> BidResult<(String, Identity, Option<Timestamp>)> {
        if !self.config.options.reauth {
            return Err(BidError::Unavailable);
        }

        let packed_audience = self.effective_audience(audience, channel_bindings)?;
        reauth::get_reauth_assertion(
            &self.ticket_cache,
            &self.config,
            &packed_audience,
            channel_bindings,
            subject,
            Utc::now().timestamp_millis(),
        )
    }

    /// Store a reauthentication credential for `audience` in the ticket
    /// cache. The ticket is the `{jti, exp}` object handed back by the
    /// acceptor; the identity must carry the established session key.
    pub fn store_ticket(
        &self,
        identity: &Identity,
        audience: &str,
        channel_bindings: Option<&[u8]>,
        ticket: &Value,
    ) -> BidResult<()> {
        if !self.config.options.reauth {
            return Err(BidError::Unavailable);
        }

        let packed_audience = self.effective_audience(audience, channel_bindings)?;
        reauth::store_ticket(&self.ticket_cache, identity, &packed_audience, ticket)
    }

    /// Acceptor-side credential registration: once the security-context
    /// layer has installed the session key on a verified identity, enrich
    /// the assertion's replay record into a reauthentication credential
    /// and attach the ticket to the identity.
    pub fn register_reauth_credentials(
        &self,
        identity: &mut Identity,
        assertion: &str,
        verification_time: Timestamp,
    ) -> BidResult<()> {
        if !self.config.options.reauth {
            return Err(BidError::Unavailable);
        }

        reauth::register_credentials(
            &self.replay_cache,
            identity,
            assertion,
            verification_time,
            &self.config,
        )
    }

    /// The audience string assertions actually carry: packed with channel
    /// bindings in GSS mode, verbatim otherwise.
    fn effective_audience(
        &self,
        audience: &str,
        channel_bindings: Option<&[u8]>,
    ) -> BidResult<String> {
        if self.config.options.gss_audience {
            pack_audience(audience, channel_bindings, true)
        } else {
            Ok(audience.to_string())
        }
    }
}

/// Builder for [`BidContext`].
#[derive(Debug, Default)]
pub struct BidContextBuilder {
    config: Option<BidConfig>,
    replay_cache: Option<Cache>,
    ticket_cache: Option<Cache>,
    authority_cache: Option<Cache>,
}

impl BidContextBuilder {
    /// Use this configuration.
    pub fn config(mut self, config: BidConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this replay cache.
    pub fn replay_cache(mut self, cache: Cache) -> Self {
        self.replay_cache = Some(cache);
        self
    }

    /// Use this ticket cache.
    pub fn ticket_cache(mut self, cache: Cache) -> Self {
        self.ticket_cache = Some(cache);
        self
    }

    /// Use this authority cache.
    pub fn authority_cache(mut self, cache: Cache) -> Self {
        self.authority_cache = Some(cache);
        self
    }

    /// Use the default persistent caches for every purpose.
    pub fn persistent_caches(mut self) -> BidResult<Self> {
        self.replay_cache = Some(Cache::default_for(CachePurpose::Replay)?);
        self.ticket_cache = Some(Cache::default_for(CachePurpose::Ticket)?);
        self.authority_cache = Some(Cache::default_for(CachePurpose::Authority)?);
        Ok(self)
    }

    /// Build the engine. Caches not supplied are volatile in-memory ones.
    pub fn build(self) -> BidResult<BidContext> {
        let config = self.config.unwrap_or_default();
        let authority_cache = self.authority_cache.unwrap_or_else(Cache::memory);
        let resolver = AuthorityResolver::new(&config, authority_cache)?;

        Ok(BidContext {
            config,
            resolver,
            replay_cache: self.replay_cache.unwrap_or_else(Cache::memory),
            ticket_cache: self.ticket_cache.unwrap_or_else(Cache::memory),
        })
    }
}
