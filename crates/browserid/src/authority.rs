//! Authority Resolution
//!
//! Resolves an issuer hostname to its signing key by fetching
//! `https://<issuer>/.well-known/browserid`, following bounded delegation,
//! and caching documents with a clamped TTL. Concurrent verifiers for the
//! same issuer share one fetch: the resolver serializes the
//! fetch-parse-insert sequence per host.

// Layer 1: Standard library imports
use std::collections::HashSet;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use chrono::Utc;
use dashmap::DashMap;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

// Layer 3: Internal module imports
use crate::cache::Cache;
use crate::config::BidConfig;
use crate::error::{BidError, BidResult};
use crate::json::{self, Timestamp};

const WELL_KNOWN_PATH: &str = ".well-known/browserid";

/// Resolver for issuer authority documents.
#[derive(Debug)]
pub struct AuthorityResolver {
    client: reqwest::Client,
    cache: Cache,
    fetch_locks: DashMap<String, Arc<Mutex<()>>>,
    max_delegations: usize,
    cache_ttl_ms: i64,
    trusted_issuers: Vec<String>,
    proxy: Option<Url>,
}

impl AuthorityResolver {
    /// Build a resolver over the given authority cache.
    pub fn new(config: &BidConfig, cache: Cache) -> BidResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| BidError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            cache,
            fetch_locks: DashMap::new(),
            max_delegations: config.max_delegations,
            cache_ttl_ms: config.authority_cache_ttl.as_millis() as i64,
            trusted_issuers: config.trusted_issuers.clone(),
            proxy: config.authority_proxy.clone(),
        })
    }

    /// Resolve `issuer` to an authority document containing a
    /// `public-key`, following delegations up to the configured depth.
    /// Delegation loops are broken by a visited set, not depth alone.
    pub async fn authority(&self, issuer: &str) -> BidResult<Value> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut host = issuer.to_string();

        for _ in 0..=self.max_delegations {
            if !visited.insert(host.clone()) {
                warn!(issuer, host, "delegation loop");
                return Err(BidError::UntrustedIssuer);
            }

            let document = self.document(&host).await?;
            if document.get("public-key").is_some() {
                return Ok(document);
            }

            match json::str_value(&document, "authority") {
                Some(delegate) => {
                    debug!(from = %host, to = %delegate, "authority delegation");
                    host = delegate.to_string();
                }
                None => return Err(BidError::InvalidKeySet),
            }
        }

        Err(BidError::UntrustedIssuer)
    }

    /// Trust test: is `cert_issuer` authoritative for `email_domain`?
    ///
    /// Succeeds when the two are equal, when the issuer is configured as
    /// trusted, or when the email domain's delegation chain reaches the
    /// issuer.
    pub async fn is_authoritative(&self, email_domain: &str, cert_issuer: &str) -> BidResult<()> {
        if email_domain == cert_issuer {
            return Ok(());
        }
        if self.trusted_issuers.iter().any(|issuer| issuer == cert_issuer) {
            return Ok(());
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut host = email_domain.to_string();

        for _ in 0..self.max_delegations {
            if !visited.insert(host.clone()) {
                break;
            }

            let document = self.document(&host).await?;
            match json::str_value(&document, "authority") {
                Some(delegate) if delegate == cert_issuer => return Ok(()),
                Some(delegate) => host = delegate.to_string(),
                None => break,
            }
        }

        warn!(email_domain, cert_issuer, "issuer not authoritative");
        Err(BidError::UntrustedIssuer)
    }

    /// Fetch (or return from cache) the well-known document of one host.
    async fn document(&self, host: &str) -> BidResult<Value> {
        let now = Utc::now().timestamp_millis();

        if let Some(cached) = self.fresh_cached(host, now) {
            return Ok(cached);
        }

        // Serialize the fetch-parse-insert sequence per host so racing
        // verifiers do not issue duplicate fetches.
        let lock = {
            let entry = self
                .fetch_locks
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        let _guard = lock.lock().await;

        // The loser of the race finds the winner's entry.
        if let Some(cached) = self.fresh_cached(host, now) {
            return Ok(cached);
        }

        let stale = self.cache.get(host).ok();
        match self.fetch_document(host, stale.as_ref()).await {
            Ok(document) => {
                let entry = self.cache_entry(document, now);
                self.cache.set(host, entry.clone())?;
                Ok(entry)
            }
            Err(BidError::DocumentNotModified) => {
                // 304: refresh the cached copy's lease.
                let mut entry = stale.ok_or(BidError::CacheKeyNotFound)?;
                json_set(&mut entry, "expires", Value::from(now + self.cache_ttl_ms));
                self.cache.set(host, entry.clone())?;
                Ok(entry)
            }
            Err(e) => Err(e),
        }
    }

    fn fresh_cached(&self, host: &str, now: Timestamp) -> Option<Value> {
        let cached = self.cache.get(host).ok()?;
        let expires = json::ts_value(&cached, "expires")?;
        if expires > now {
            debug!(host, "authority cache hit");
            Some(cached)
        } else {
            None
        }
    }

    /// Install the cache lease: the document's own `expires` clamped to
    /// the configured maximum.
    fn cache_entry(&self, mut document: Value, now: Timestamp) -> Value {
        let ceiling = now + self.cache_ttl_ms;
        let expires = json::ts_value(&document, "expires")
            .map(|doc_expires| doc_expires.min(ceiling))
            .unwrap_or(ceiling);
        json_set(&mut document, "expires", Value::from(expires));
        json_set(&mut document, "fetched", Value::from(now));
        document
    }

    fn well_known_url(&self, host: &str) -> BidResult<Url> {
        let url = match &self.proxy {
            Some(base) => base.join(&format!("{host}/{WELL_KNOWN_PATH}")),
            None => Url::parse(&format!("https://{host}/{WELL_KNOWN_PATH}")),
        };
        url.map_err(|_| BidError::InvalidParameter("issuer host"))
    }

    async fn fetch_document(&self, host: &str, stale: Option<&Value>) -> BidResult<Value> {
        let url = self.well_known_url(host)?;
        debug!(host, %url, "fetching authority document");

        let mut request = self.client.get(url);
        if let Some(last_modified) = stale.and_then(|entry| json::str_value(entry, "last-modified"))
        {
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BidError::HttpError(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => return Err(BidError::DocumentNotModified),
            StatusCode::OK => {}
            status => return Err(BidError::HttpError(format!("status {status}"))),
        }

        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut document: Value = response
            .json()
            .await
            .map_err(|_| BidError::InvalidJson)?;
        if !document.is_object() {
            return Err(BidError::InvalidJson);
        }
        if let Some(last_modified) = last_modified {
            json_set(&mut document, "last-modified", Value::String(last_modified));
        }

        Ok(document)
    }
}

fn json_set(object: &mut Value, key: &str, value: Value) {
    if let Some(map) = object.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}
