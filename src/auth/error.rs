//! Error types for token verification.

use std::fmt;

use jsonwebtoken::errors::{Error as JwtError, ErrorKind};

/// Errors that can occur while verifying a bearer token.
///
/// Every kind except `Configuration` is an authentication failure and is
/// answered with 401. The distinctions exist for logs, not for callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The `exp` claim is in the past.
    ExpiredToken,
    /// Header or payload could not be parsed, or the header has no `kid`.
    MalformedToken(String),
    /// No key in the issuer's key set matches the token's `kid`.
    KeyNotFound(String),
    /// Signature, audience or algorithm check failed.
    VerificationFailed(String),
    /// The token verified but carries no subject.
    MissingIdentity,
    /// Required startup configuration is absent or invalid.
    Configuration(String),
    /// The key set could not be fetched or parsed.
    KeySetFetch(String),
}

impl AuthError {
    /// Whether this error should reject the request rather than abort startup.
    pub fn is_authentication_failure(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }

    /// Short machine-readable name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExpiredToken => "expired_token",
            Self::MalformedToken(_) => "malformed_token",
            Self::KeyNotFound(_) => "key_not_found",
            Self::VerificationFailed(_) => "verification_failed",
            Self::MissingIdentity => "missing_identity",
            Self::Configuration(_) => "configuration",
            Self::KeySetFetch(_) => "key_set_fetch",
        }
    }

    /// Classify a `jsonwebtoken` decode failure.
    pub(crate) fn from_jwt(err: &JwtError) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::ExpiredToken,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::MalformedToken(err.to_string()),
            _ => Self::VerificationFailed(err.to_string()),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpiredToken => write!(f, "Token has expired"),
            Self::MalformedToken(msg) => write!(f, "Malformed token: {}", msg),
            Self::KeyNotFound(kid) => write!(f, "Unable to find signing key with kid: {}", kid),
            Self::VerificationFailed(msg) => write!(f, "Token verification failed: {}", msg),
            Self::MissingIdentity => write!(f, "Invalid token: missing user identifier"),
            Self::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            Self::KeySetFetch(msg) => write!(f, "Failed to fetch JWKS: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}
