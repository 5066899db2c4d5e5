//! Shared fixtures for auth tests: credentials, token minting, JWKS mocks.

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, get_current_timestamp};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::auth::jwks::JWKS_PATH;
use crate::config::VerifierConfig;

pub const TEST_SECRET: &str = "test-jwt-secret-with-at-least-32-bytes!";
pub const TEST_ANON_KEY: &str = "test-anon-key";
pub const TEST_KID: &str = "test-rsa-key";
pub const TEST_EC_KID: &str = "test-ec-key";

/// PEMs for the keys whose public halves are published in [`JWKS_JSON`].
pub const RSA_PRIVATE_PEM: &str = include_str!("testdata/rs256_private.pem");
pub const EC_PRIVATE_PEM: &str = include_str!("testdata/es256_private.pem");
pub const JWKS_JSON: &str = include_str!("testdata/jwks.json");

/// Verifier settings pointing at `issuer_url` with the test credentials.
pub fn verifier_config(issuer_url: &str) -> VerifierConfig {
    VerifierConfig {
        issuer_url: Some(issuer_url.to_string()),
        api_key: Some(TEST_ANON_KEY.to_string()),
        jwt_secret: Some(TEST_SECRET.to_string()),
        ..Default::default()
    }
}

/// Typical issuer claims for `sub`, expiring `exp_offset` seconds from now.
pub fn token_claims(sub: &str, exp_offset: i64) -> Value {
    let now = get_current_timestamp() as i64;
    json!({
        "sub": sub,
        "email": format!("{}@example.com", sub),
        "aud": "authenticated",
        "role": "authenticated",
        "iat": now,
        "exp": now + exp_offset,
        "iss": "https://project.supabase.co/auth/v1",
    })
}

pub fn hs256_token(claims: &Value, secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn hs256_token_with_kid(claims: &Value, secret: &str, kid: &str) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

pub fn rs256_token(claims: &Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(RSA_PRIVATE_PEM.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

pub fn es256_token(claims: &Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_ec_pem(EC_PRIVATE_PEM.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Serve the fixture key set at the issuer's JWKS path.
pub async fn mount_jwks(server: &MockServer) {
    let body: Value = serde_json::from_str(JWKS_JSON).unwrap();
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}
