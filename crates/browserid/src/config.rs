//! Engine Configuration
//!
//! Configuration for the verification and reauthentication engine, with
//! reasonable defaults and a builder for the common adjustments.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::error::{BidError, BidResult};

/// Maximum certificates a backed assertion may carry.
pub const BID_MAX_CERTS: usize = 6;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct BidConfig {
    /// Maximum tolerated clock divergence; also the default assertion and
    /// authenticator lifetime when `exp` is absent
    pub skew: Duration,

    /// Upper bound on certificate chain length when unpacking
    pub max_certs: usize,

    /// Upper bound on authority delegation depth
    pub max_delegations: usize,

    /// How long a stored ticket may be used to mint reauth assertions
    pub ticket_lifetime: Duration,

    /// Clamp applied to authority-document `expires` when caching
    pub authority_cache_ttl: Duration,

    /// Timeout for authority document fetches (advisory)
    pub http_timeout: Duration,

    /// Issuers trusted for any email domain, bypassing delegation checks
    pub trusted_issuers: Vec<String>,

    /// Route authority discovery through this base URL instead of
    /// contacting issuers directly; the issuer host becomes the leading
    /// path segment. Intended for egress proxies and tests.
    pub authority_proxy: Option<url::Url>,

    /// Feature toggles
    pub options: ContextOptions,
}

/// Feature toggles for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextOptions {
    /// Accept and mint fast-reauthentication assertions
    pub reauth: bool,

    /// Maintain the replay cache across verifications
    pub replay_cache: bool,

    /// Audiences are packed `urn:x-gss:` service names with optional
    /// channel-binding suffixes
    pub gss_audience: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            reauth: false,
            replay_cache: true,
            gss_audience: false,
        }
    }
}

impl Default for BidConfig {
    fn default() -> Self {
        Self {
            skew: Duration::from_secs(300),
            max_certs: BID_MAX_CERTS,
            max_delegations: 6,
            ticket_lifetime: Duration::from_secs(10 * 3600),
            authority_cache_ttl: Duration::from_secs(24 * 3600),
            http_timeout: Duration::from_secs(10),
            trusted_issuers: Vec::new(),
            authority_proxy: None,
            options: ContextOptions::default(),
        }
    }
}

impl BidConfig {
    /// Create a configuration builder.
    pub fn builder() -> BidConfigBuilder {
        BidConfigBuilder::default()
    }

    /// Clock skew in milliseconds, the unit every timestamp comparison
    /// uses.
    pub fn skew_ms(&self) -> i64 {
        self.skew.as_millis() as i64
    }

    /// Ticket lifetime in milliseconds.
    pub fn ticket_lifetime_ms(&self) -> i64 {
        self.ticket_lifetime.as_millis() as i64
    }
}

/// Builder for [`BidConfig`].
#[derive(Debug, Default)]
pub struct BidConfigBuilder {
    config: Option<BidConfig>,
}

impl BidConfigBuilder {
    fn config_mut(&mut self) -> &mut BidConfig {
        self.config.get_or_insert_with(BidConfig::default)
    }

    /// Set the clock skew / default lifetime.
    pub fn skew(mut self, skew: Duration) -> Self {
        self.config_mut().skew = skew;
        self
    }

    /// Set the delegation depth bound.
    pub fn max_delegations(mut self, max: usize) -> Self {
        self.config_mut().max_delegations = max;
        self
    }

    /// Set the ticket lifetime.
    pub fn ticket_lifetime(mut self, lifetime: Duration) -> Self {
        self.config_mut().ticket_lifetime = lifetime;
        self
    }

    /// Set the authority cache TTL clamp.
    pub fn authority_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config_mut().authority_cache_ttl = ttl;
        self
    }

    /// Set the HTTP fetch timeout.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config_mut().http_timeout = timeout;
        self
    }

    /// Add an issuer trusted for any email domain.
    pub fn trusted_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config_mut().trusted_issuers.push(issuer.into());
        self
    }

    /// Route authority discovery through a proxy base URL.
    pub fn authority_proxy(mut self, base: url::Url) -> Self {
        self.config_mut().authority_proxy = Some(base);
        self
    }

    /// Enable or disable fast reauthentication.
    pub fn reauth(mut self, enabled: bool) -> Self {
        self.config_mut().options.reauth = enabled;
        self
    }

    /// Enable or disable the replay cache.
    pub fn replay_cache(mut self, enabled: bool) -> Self {
        self.config_mut().options.replay_cache = enabled;
        self
    }

    /// Treat audiences as packed GSS service names.
    pub fn gss_audience(mut self, enabled: bool) -> Self {
        self.config_mut().options.gss_audience = enabled;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(mut self) -> BidResult<BidConfig> {
        let config = self.config.take().unwrap_or_default();

        if config.max_certs == 0 || config.max_certs > BID_MAX_CERTS {
            return Err(BidError::InvalidParameter("max_certs"));
        }
        if config.skew.is_zero() {
            return Err(BidError::InvalidParameter("skew"));
        }
        // Reauth requires the replay cache: the replay record is the
        // reauth credential record.
        if config.options.reauth && !config.options.replay_cache {
            return Err(BidError::InvalidParameter("reauth without replay cache"));
        }

        Ok(config)
    }
}
