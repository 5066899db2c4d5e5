//! Dual-algorithm bearer token verification.
//!
//! Tokens are first checked against the shared HS256 secret. Any failure
//! there falls through to asymmetric verification with the key named by the
//! token's `kid`, looked up in the issuer's JWKS. The token header's `alg` is
//! never used to choose between the two paths.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::claims::{AuthenticatedUser, Claims, UserInfo};
use crate::auth::jwks::{JwksCache, JwksFetcher, jwks_url_for};
use crate::auth::AuthError;
use crate::config::{API_KEY_VAR, ISSUER_URL_VAR, JWT_SECRET_VAR, VerifierConfig};
use crate::types::KeyId;

/// Audience every accepted token must carry.
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

/// Verifies bearer tokens and extracts identity claims.
///
/// Built once at startup and shared behind an `Arc`. Verification does not
/// mutate the verifier; the only shared state is the key-set cache.
pub struct TokenVerifier {
    issuer_url: String,
    secret_key: DecodingKey,
    key_set: JwksCache,
}

impl TokenVerifier {
    /// Build a verifier, failing fast if any required setting is missing.
    pub fn new(config: VerifierConfig) -> Result<Self, AuthError> {
        let issuer_url = required(config.issuer_url.as_deref(), ISSUER_URL_VAR)?.trim();
        let api_key = required(config.api_key.as_deref(), API_KEY_VAR)?.trim();
        let jwt_secret = required(config.jwt_secret.as_deref(), JWT_SECRET_VAR)?;

        let parsed = Url::parse(issuer_url).map_err(|e| {
            AuthError::Configuration(format!("{} is not a valid URL: {}", ISSUER_URL_VAR, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AuthError::Configuration(format!(
                "{} must be an http(s) URL",
                ISSUER_URL_VAR
            )));
        }

        let fetcher = JwksFetcher::new(
            jwks_url_for(issuer_url),
            Some(api_key.to_string()),
            config.jwks_timeout,
        )?;
        let key_set = JwksCache::new(fetcher, config.jwks_cache_ttl);

        info!(
            jwks_url = key_set.jwks_url(),
            jwks_cache_enabled = key_set.is_enabled(),
            "Token verifier initialized for issuer {}",
            issuer_url
        );

        Ok(Self {
            issuer_url: issuer_url.to_string(),
            secret_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            key_set,
        })
    }

    /// The configured issuer base URL.
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    /// The derived key-set endpoint.
    pub fn jwks_url(&self) -> &str {
        self.key_set.jwks_url()
    }

    /// Verify a token and return its claims.
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let fingerprint = token_fingerprint(token);
        debug!(token = %fingerprint, length = token.len(), "Verifying bearer token");

        let symmetric_err = match self.verify_symmetric(token) {
            Ok(claims) => {
                info!(
                    token = %fingerprint,
                    "Verified HS256 token for user: {}",
                    claims.subject().unwrap_or("<none>")
                );
                return Ok(claims);
            }
            Err(err) => err,
        };

        match symmetric_err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                debug!(token = %fingerprint, error = %symmetric_err, "HS256 verification failed, falling back to JWKS");
            }
            _ => {
                warn!(token = %fingerprint, error = %symmetric_err, "HS256 verification failed, falling back to JWKS");
            }
        }

        match self.verify_asymmetric(token).await {
            Ok(claims) => {
                info!(
                    token = %fingerprint,
                    "Verified JWKS token for user: {}",
                    claims.subject().unwrap_or("<none>")
                );
                Ok(claims)
            }
            Err(err) => {
                // Expiry is only reported after a valid HS256 signature, so
                // the fallback failing afterwards says nothing new.
                let err = if matches!(symmetric_err.kind(), ErrorKind::ExpiredSignature) {
                    AuthError::ExpiredToken
                } else {
                    err
                };
                warn!(token = %fingerprint, kind = err.kind(), "Token verification failed: {}", err);
                Err(err)
            }
        }
    }

    /// Project verified claims onto the fixed identity record.
    pub fn extract_user_info(&self, claims: &Claims) -> UserInfo {
        UserInfo::from(claims)
    }

    /// Verify a token and require a subject.
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.verify(token).await?;
        let info = self.extract_user_info(&claims);

        AuthenticatedUser::from_user_info(info).ok_or_else(|| {
            warn!("Token payload missing user_id (sub)");
            AuthError::MissingIdentity
        })
    }

    fn verify_symmetric(&self, token: &str) -> Result<Claims, JwtError> {
        decode::<Claims>(token, &self.secret_key, &validation(Algorithm::HS256))
            .map(|data| data.claims)
    }

    async fn verify_asymmetric(&self, token: &str) -> Result<Claims, AuthError> {
        let kid = unverified_key_id(token)?;
        debug!("Token kid: {}", kid);

        let jwk = self.key_set.find_key(&kid).await?;
        let (decoding_key, algorithm) = jwk.decoding_key()?;

        decode::<Claims>(token, &decoding_key, &validation(algorithm))
            .map(|data| data.claims)
            .map_err(|e| AuthError::from_jwt(&e))
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, AuthError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AuthError::Configuration(format!("{} environment variable is required", name)))
}

fn validation(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.set_audience(&[AUTHENTICATED_AUDIENCE]);
    validation.validate_exp = true;
    validation.leeway = 0;
    validation
}

/// Read the `kid` from an unverified token, checking its structure first.
fn unverified_key_id(token: &str) -> Result<KeyId, AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(AuthError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    let header = decode_header(token)
        .map_err(|e| AuthError::MalformedToken(format!("Invalid JWT header: {}", e)))?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::MalformedToken(format!("Invalid JWT payload: {}", e)))?;
    serde_json::from_slice::<Map<String, Value>>(&payload)
        .map_err(|e| AuthError::MalformedToken(format!("Invalid JWT payload: {}", e)))?;

    header
        .kid
        .filter(|kid| !kid.is_empty())
        .map(KeyId::new)
        .ok_or_else(|| AuthError::MalformedToken("Token header missing 'kid' field".to_string()))
}

/// Short, non-reversible identifier for a token in logs.
fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let hex = format!("{:x}", digest);
    hex.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{
        TEST_EC_KID, TEST_KID, TEST_SECRET, es256_token, hs256_token, mount_jwks, rs256_token,
        token_claims, verifier_config,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::MockServer;

    fn offline_verifier() -> TokenVerifier {
        let mut config = verifier_config("http://127.0.0.1:9");
        config.jwks_timeout = Duration::from_millis(500);
        TokenVerifier::new(config).unwrap()
    }

    #[test]
    fn test_new_derives_jwks_url() {
        let verifier = TokenVerifier::new(verifier_config("https://project.supabase.co/")).unwrap();
        assert_eq!(verifier.issuer_url(), "https://project.supabase.co/");
        assert_eq!(
            verifier.jwks_url(),
            "https://project.supabase.co/auth/v1/jwks"
        );
    }

    #[test]
    fn test_new_requires_every_setting() {
        let base = verifier_config("https://project.supabase.co");

        let cases = [
            VerifierConfig { issuer_url: None, ..base.clone() },
            VerifierConfig { issuer_url: Some("  ".into()), ..base.clone() },
            VerifierConfig { api_key: None, ..base.clone() },
            VerifierConfig { api_key: Some(String::new()), ..base.clone() },
            VerifierConfig { jwt_secret: None, ..base.clone() },
            VerifierConfig { jwt_secret: Some(String::new()), ..base.clone() },
        ];

        for config in cases {
            let err = TokenVerifier::new(config).err().unwrap();
            assert!(matches!(err, AuthError::Configuration(_)), "got {:?}", err);
            assert!(!err.is_authentication_failure());
        }
    }

    #[test]
    fn test_new_names_missing_setting() {
        let config = VerifierConfig {
            jwt_secret: None,
            ..verifier_config("https://project.supabase.co")
        };
        let err = TokenVerifier::new(config).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Configuration error: SUPABASE_JWT_SECRET environment variable is required"
        );
    }

    #[test]
    fn test_new_rejects_invalid_issuer_url() {
        for url in ["not a url", "ftp://project.supabase.co"] {
            let err = TokenVerifier::new(verifier_config(url)).err().unwrap();
            assert!(matches!(err, AuthError::Configuration(_)));
        }
    }

    #[tokio::test]
    async fn test_valid_hs256_token_verifies() {
        let verifier = offline_verifier();
        let token = hs256_token(&token_claims("user-123", 3600), TEST_SECRET);

        let claims = verifier.verify(&token).await.unwrap();
        let info = verifier.extract_user_info(&claims);

        assert_eq!(info.user_id.as_deref(), Some("user-123"));
        assert_eq!(info.email.as_deref(), Some("user-123@example.com"));
        assert_eq!(info.role, "authenticated");
        assert_eq!(info.aud, Some(json!("authenticated")));
    }

    #[tokio::test]
    async fn test_verify_is_idempotent() {
        let verifier = offline_verifier();
        let token = hs256_token(&token_claims("user-123", 3600), TEST_SECRET);

        let first = verifier.verify(&token).await.unwrap();
        let second = verifier.verify(&token).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_expired_hs256_token_is_rejected() {
        let verifier = offline_verifier();
        let token = hs256_token(&token_claims("user-123", -3600), TEST_SECRET);

        let err = verifier.verify(&token).await.unwrap_err();
        assert_eq!(err, AuthError::ExpiredToken);
    }

    #[tokio::test]
    async fn test_wrong_audience_is_rejected() {
        let verifier = offline_verifier();
        let mut claims = token_claims("user-123", 3600);
        claims["aud"] = json!("anon");
        let token = hs256_token(&claims, TEST_SECRET);

        // No kid in the HS256 header, so the fallback stops before any I/O.
        let err = verifier.verify(&token).await.unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[tokio::test]
    async fn test_wrong_secret_without_kid_is_malformed() {
        let verifier = offline_verifier();
        let token = hs256_token(&token_claims("user-123", 3600), "some-other-secret");

        let err = verifier.verify(&token).await.unwrap_err();
        assert_eq!(
            err,
            AuthError::MalformedToken("Token header missing 'kid' field".to_string())
        );
    }

    #[tokio::test]
    async fn test_malformed_tokens_are_rejected() {
        let verifier = offline_verifier();

        for token in [
            "",
            "not-a-jwt",
            "only.two",
            "a.b.c.d",
            "eyJhbGciOiJIUzI1NiJ9.!!!.sig",
            "%%%.eyJzdWIiOiJ4In0.sig",
        ] {
            let err = verifier.verify(token).await.unwrap_err();
            assert!(
                matches!(err, AuthError::MalformedToken(_)),
                "token {:?} gave {:?}",
                token,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_rs256_token_verifies_via_jwks() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let verifier = TokenVerifier::new(verifier_config(&server.uri())).unwrap();
        let token = rs256_token(&token_claims("rsa-user", 3600), TEST_KID);

        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims.subject(), Some("rsa-user"));
    }

    #[tokio::test]
    async fn test_es256_token_verifies_via_jwks() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let verifier = TokenVerifier::new(verifier_config(&server.uri())).unwrap();
        let token = es256_token(&token_claims("ec-user", 3600), TEST_EC_KID);

        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims.subject(), Some("ec-user"));
        assert_eq!(
            verifier.extract_user_info(&claims).email.as_deref(),
            Some("ec-user@example.com")
        );
    }

    #[tokio::test]
    async fn test_es256_token_under_rsa_kid_fails_verification() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let verifier = TokenVerifier::new(verifier_config(&server.uri())).unwrap();
        let token = es256_token(&token_claims("ec-user", 3600), TEST_KID);

        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::VerificationFailed(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_unknown_kid_is_key_not_found() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let verifier = TokenVerifier::new(verifier_config(&server.uri())).unwrap();
        let token = rs256_token(&token_claims("rsa-user", 3600), "unknown-kid");

        let err = verifier.verify(&token).await.unwrap_err();
        assert_eq!(err, AuthError::KeyNotFound("unknown-kid".to_string()));
    }

    #[tokio::test]
    async fn test_expired_rs256_token_is_expired() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let verifier = TokenVerifier::new(verifier_config(&server.uri())).unwrap();
        let token = rs256_token(&token_claims("rsa-user", -60), TEST_KID);

        let err = verifier.verify(&token).await.unwrap_err();
        assert_eq!(err, AuthError::ExpiredToken);
    }

    #[tokio::test]
    async fn test_jwks_outage_is_authentication_failure() {
        let verifier = offline_verifier();
        let token = rs256_token(&token_claims("rsa-user", 3600), TEST_KID);

        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::KeySetFetch(_)));
        assert!(err.is_authentication_failure());
    }

    #[tokio::test]
    async fn test_hs256_token_with_kid_and_bad_secret_fails_verification() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let verifier = TokenVerifier::new(verifier_config(&server.uri())).unwrap();
        let token = crate::auth::test_support::hs256_token_with_kid(
            &token_claims("user-123", 3600),
            "some-other-secret",
            TEST_KID,
        );

        // Key lookup succeeds, but an HS256 token cannot pass RS256 checks.
        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::VerificationFailed(_)));
    }

    #[tokio::test]
    async fn test_authenticate_requires_subject() {
        let verifier = offline_verifier();
        let mut claims = token_claims("ignored", 3600);
        claims.as_object_mut().unwrap().remove("sub");
        let token = hs256_token(&claims, TEST_SECRET);

        let err = verifier.authenticate(&token).await.unwrap_err();
        assert_eq!(err, AuthError::MissingIdentity);
    }

    #[tokio::test]
    async fn test_authenticate_returns_user() {
        let verifier = offline_verifier();
        let token = hs256_token(&token_claims("user-123", 3600), TEST_SECRET);

        let user = verifier.authenticate(&token).await.unwrap();
        assert_eq!(user.user_id().as_str(), "user-123");
        assert_eq!(user.role(), "authenticated");
    }

    #[tokio::test]
    async fn test_concurrent_verification_does_not_interfere() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let verifier = Arc::new(TokenVerifier::new(verifier_config(&server.uri())).unwrap());
        let hs_token = hs256_token(&token_claims("hs-user", 3600), TEST_SECRET);
        let rs_token = rs256_token(&token_claims("rs-user", 3600), TEST_KID);

        let mut handles = Vec::new();
        for i in 0..8 {
            let verifier = Arc::clone(&verifier);
            let (token, expected) = if i % 2 == 0 {
                (hs_token.clone(), "hs-user")
            } else {
                (rs_token.clone(), "rs-user")
            };
            handles.push(tokio::spawn(async move {
                let claims = verifier.verify(&token).await.unwrap();
                assert_eq!(claims.subject(), Some(expected));
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[test]
    fn test_token_fingerprint_is_stable_and_short() {
        let a = token_fingerprint("token-a");
        assert_eq!(a.len(), 12);
        assert_eq!(a, token_fingerprint("token-a"));
        assert_ne!(a, token_fingerprint("token-b"));
    }
}
