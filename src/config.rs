use std::{env, fmt, time::Duration};

use tracing::{info, warn};

/// Environment variable holding the auth issuer base URL.
pub const ISSUER_URL_VAR: &str = "SUPABASE_URL";
/// Environment variable holding the public (anon) API key.
pub const API_KEY_VAR: &str = "SUPABASE_ANON_KEY";
/// Environment variable holding the shared HS256 secret.
pub const JWT_SECRET_VAR: &str = "SUPABASE_JWT_SECRET";

/// Default timeout for key-set requests, in seconds.
pub const DEFAULT_JWKS_TIMEOUT_SECONDS: u64 = 5;

/// Default key-set cache TTL in seconds. Zero disables caching.
pub const DEFAULT_JWKS_CACHE_SECONDS: u64 = 300;

/// Settings the token verifier is built from.
///
/// The three credentials are optional here so that a missing value surfaces
/// as a configuration error when the verifier is constructed, not as a parse
/// failure somewhere earlier.
#[derive(Clone)]
pub struct VerifierConfig {
    pub issuer_url: Option<String>,
    pub api_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub jwks_timeout: Duration,
    pub jwks_cache_ttl: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            issuer_url: None,
            api_key: None,
            jwt_secret: None,
            jwks_timeout: Duration::from_secs(DEFAULT_JWKS_TIMEOUT_SECONDS),
            jwks_cache_ttl: Duration::from_secs(DEFAULT_JWKS_CACHE_SECONDS),
        }
    }
}

impl VerifierConfig {
    /// Read the verifier settings from the process environment.
    pub fn from_env() -> Self {
        Self {
            issuer_url: env::var(ISSUER_URL_VAR).ok(),
            api_key: env::var(API_KEY_VAR).ok(),
            jwt_secret: env::var(JWT_SECRET_VAR).ok(),
            jwks_timeout: seconds_from_env("JWKS_TIMEOUT_SECONDS", DEFAULT_JWKS_TIMEOUT_SECONDS),
            jwks_cache_ttl: seconds_from_env("JWKS_CACHE_SECONDS", DEFAULT_JWKS_CACHE_SECONDS),
        }
    }

    /// Log which required settings are present, without their values.
    pub fn log_status(&self) {
        for (name, value) in [
            (ISSUER_URL_VAR, &self.issuer_url),
            (API_KEY_VAR, &self.api_key),
            (JWT_SECRET_VAR, &self.jwt_secret),
        ] {
            if is_present(value.as_deref()) {
                info!("  {}: set", name);
            } else {
                warn!("  {}: missing", name);
            }
        }
    }
}

impl fmt::Debug for VerifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierConfig")
            .field("issuer_url", &self.issuer_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("jwks_timeout", &self.jwks_timeout)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .finish()
    }
}

fn is_present(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

fn seconds_from_env(name: &str, default: u64) -> Duration {
    let seconds = env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let config = VerifierConfig::default();
        assert!(config.issuer_url.is_none());
        assert_eq!(
            config.jwks_timeout,
            Duration::from_secs(DEFAULT_JWKS_TIMEOUT_SECONDS)
        );
        assert_eq!(
            config.jwks_cache_ttl,
            Duration::from_secs(DEFAULT_JWKS_CACHE_SECONDS)
        );
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = VerifierConfig {
            issuer_url: Some("https://project.supabase.co".to_string()),
            api_key: Some("anon-key-value".to_string()),
            jwt_secret: Some("super-secret-value".to_string()),
            ..Default::default()
        };

        let rendered = format!("{:?}", config);
        assert!(rendered.contains("https://project.supabase.co"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("anon-key-value"));
        assert!(!rendered.contains("super-secret-value"));
    }

    #[test]
    fn test_is_present() {
        assert!(is_present(Some("value")));
        assert!(!is_present(Some("   ")));
        assert!(!is_present(Some("")));
        assert!(!is_present(None));
    }
}
