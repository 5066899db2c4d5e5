//! JWKS (JSON Web Key Set) fetching and caching module.
//!
//! The issuer publishes its public keys at `{issuer}/auth/v1/jwks`. Keys are
//! only needed when a token fails the shared-secret check, so the set is
//! fetched lazily and optionally cached for a bounded time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::auth::AuthError;
use crate::types::KeyId;

/// Path of the key-set endpoint relative to the issuer base URL.
pub const JWKS_PATH: &str = "/auth/v1/jwks";

/// Header carrying the public API key on key-set requests.
pub const API_KEY_HEADER: &str = "apikey";

/// Minimum age of a cached key set before an unknown `kid` may force a
/// refetch. Expiry of the TTL always refetches.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Derive the key-set endpoint from the issuer base URL.
pub fn jwks_url_for(issuer_url: &str) -> String {
    format!("{}{}", issuer_url.trim_end_matches('/'), JWKS_PATH)
}

/// A single JSON Web Key from a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC")
    pub kty: String,
    /// Key ID, matched against the token header's `kid`
    pub kid: Option<String>,
    /// Algorithm (e.g., "RS256")
    pub alg: Option<String>,
    /// Key use (e.g., "sig" for signature)
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url encoded)
    pub n: Option<String>,
    /// RSA exponent (base64url encoded)
    pub e: Option<String>,
    /// EC curve name
    pub crv: Option<String>,
    /// EC x coordinate (base64url encoded)
    pub x: Option<String>,
    /// EC y coordinate (base64url encoded)
    pub y: Option<String>,
}

impl Jwk {
    /// Convert to a decoding key and the algorithm it verifies.
    ///
    /// The algorithm is taken from the key, never from the token header.
    pub fn decoding_key(&self) -> Result<(DecodingKey, Algorithm), AuthError> {
        if self.key_use.as_deref() == Some("enc") {
            return Err(AuthError::VerificationFailed(
                "JWKS key is an encryption key".to_string(),
            ));
        }

        match self.kty.as_str() {
            "RSA" => {
                let algorithm = match self.alg.as_deref() {
                    None | Some("RS256") => Algorithm::RS256,
                    Some("RS384") => Algorithm::RS384,
                    Some("RS512") => Algorithm::RS512,
                    Some(other) => return Err(unsupported_alg(other, "RSA")),
                };
                let n = required_component(&self.n, "n")?;
                let e = required_component(&self.e, "e")?;
                let key = DecodingKey::from_rsa_components(n, e).map_err(|err| {
                    AuthError::VerificationFailed(format!("Invalid RSA components: {}", err))
                })?;
                Ok((key, algorithm))
            }
            "EC" => {
                let algorithm = match (self.crv.as_deref(), self.alg.as_deref()) {
                    (Some("P-256"), None | Some("ES256")) => Algorithm::ES256,
                    (Some("P-384"), None | Some("ES384")) => Algorithm::ES384,
                    (crv, alg) => {
                        return Err(AuthError::VerificationFailed(format!(
                            "Unsupported EC key (crv: {:?}, alg: {:?})",
                            crv, alg
                        )));
                    }
                };
                let x = required_component(&self.x, "x")?;
                let y = required_component(&self.y, "y")?;
                let key = DecodingKey::from_ec_components(x, y).map_err(|err| {
                    AuthError::VerificationFailed(format!("Invalid EC components: {}", err))
                })?;
                Ok((key, algorithm))
            }
            other => Err(AuthError::VerificationFailed(format!(
                "Unsupported JWKS key type: {}",
                other
            ))),
        }
    }
}

fn required_component<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AuthError> {
    value
        .as_deref()
        .ok_or_else(|| AuthError::VerificationFailed(format!("Missing '{}' in JWKS key", name)))
}

fn unsupported_alg(alg: &str, kty: &str) -> AuthError {
    AuthError::VerificationFailed(format!("Unsupported algorithm {} for {} key", alg, kty))
}

/// A JWKS document containing multiple keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwksDocument {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl JwksDocument {
    /// Find the key whose `kid` matches.
    pub fn find(&self, kid: &KeyId) -> Option<&Jwk> {
        self.keys
            .iter()
            .find(|jwk| jwk.kid.as_deref() == Some(kid.as_str()))
    }
}

/// HTTP client for the issuer's key-set endpoint.
pub struct JwksFetcher {
    jwks_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl JwksFetcher {
    /// Create a fetcher with a bounded request timeout.
    pub fn new(
        jwks_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            jwks_url: jwks_url.into(),
            api_key,
            client,
        })
    }

    /// The endpoint this fetcher reads from.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Fetch and parse the key set.
    ///
    /// A 401 answered to a request carrying the API key is retried once
    /// without it. Any other non-success status is a fetch failure.
    pub async fn fetch(&self) -> Result<JwksDocument, AuthError> {
        debug!("Fetching JWKS from {}", self.jwks_url);

        let mut response = self.send(self.api_key.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED && self.api_key.is_some() {
            warn!("JWKS request with API key failed with 401, retrying without API key");
            response = self.send(None).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::KeySetFetch(format!(
                "HTTP {} from JWKS endpoint",
                status
            )));
        }

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|e| AuthError::KeySetFetch(format!("Invalid JWKS document: {}", e)))?;

        debug!("Fetched {} keys from JWKS endpoint", document.keys.len());
        Ok(document)
    }

    async fn send(&self, api_key: Option<&str>) -> Result<reqwest::Response, AuthError> {
        let mut request = self.client.get(&self.jwks_url);
        if let Some(key) = api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        request
            .send()
            .await
            .map_err(|e| AuthError::KeySetFetch(e.to_string()))
    }
}

/// Snapshot of the last successfully fetched key set.
struct CachedKeySet {
    document: Arc<JwksDocument>,
    fetched_at: Instant,
}

enum CachedLookup {
    Hit(Jwk),
    /// Fresh snapshot without the kid, fetched too recently to refetch.
    Throttled,
    Refresh,
}

/// Key-set lookup with an optional time-bounded cache.
///
/// With a zero TTL every lookup fetches. Otherwise a fresh snapshot is
/// served without I/O, and a stale snapshot triggers one refresh before
/// `KeyNotFound` is reported. A `kid` missing from a fresh snapshot also
/// refreshes, but only once the snapshot is older than the minimum refresh
/// interval, so unknown kids cannot drive a fetch per request. The snapshot
/// is replaced whole; the lock is never held across the network call.
pub struct JwksCache {
    fetcher: JwksFetcher,
    ttl: Duration,
    min_refresh_interval: Duration,
    snapshot: RwLock<Option<CachedKeySet>>,
}

impl JwksCache {
    /// Create a new cache in front of `fetcher`.
    pub fn new(fetcher: JwksFetcher, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            min_refresh_interval: MIN_REFRESH_INTERVAL,
            snapshot: RwLock::new(None),
        }
    }

    /// Override the minimum snapshot age before a `kid` miss refetches.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Whether snapshots are kept between lookups.
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// The endpoint keys are fetched from.
    pub fn jwks_url(&self) -> &str {
        self.fetcher.jwks_url()
    }

    /// Look up the key for `kid`, fetching the key set as needed.
    pub async fn find_key(&self, kid: &KeyId) -> Result<Jwk, AuthError> {
        if self.is_enabled() {
            match self.cached_lookup(kid).await {
                CachedLookup::Hit(jwk) => {
                    debug!("JWKS cache hit for kid {}", kid);
                    return Ok(jwk);
                }
                CachedLookup::Throttled => {
                    debug!("kid {} not in recently fetched JWKS, skipping refresh", kid);
                    return Err(AuthError::KeyNotFound(kid.to_string()));
                }
                CachedLookup::Refresh => {}
            }
        }

        let document = self.refresh().await?;
        document
            .find(kid)
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))
    }

    async fn cached_lookup(&self, kid: &KeyId) -> CachedLookup {
        let snapshot = self.snapshot.read().await;
        let Some(cached) = snapshot.as_ref() else {
            return CachedLookup::Refresh;
        };

        let age = cached.fetched_at.elapsed();
        if age >= self.ttl {
            return CachedLookup::Refresh;
        }

        match cached.document.find(kid) {
            Some(jwk) => CachedLookup::Hit(jwk.clone()),
            None if age < self.min_refresh_interval => CachedLookup::Throttled,
            None => CachedLookup::Refresh,
        }
    }

    async fn refresh(&self) -> Result<Arc<JwksDocument>, AuthError> {
        let document = Arc::new(self.fetcher.fetch().await?);

        if self.is_enabled() {
            let mut snapshot = self.snapshot.write().await;
            *snapshot = Some(CachedKeySet {
                document: Arc::clone(&document),
                fetched_at: Instant::now(),
            });
        }

        Ok(document)
    }

    /// Drop the cached snapshot.
    pub async fn clear(&self) {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = None;
    }
}
