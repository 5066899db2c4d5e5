//! Verified token claims and the identity projected from them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::UserId;

/// Role assumed when a token carries no `role` claim.
pub const DEFAULT_ROLE: &str = "authenticated";

/// Payload of a verified token.
///
/// Kept as a raw JSON object so claims with unexpected shapes are carried
/// through untouched; typed access goes through the accessor methods.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Wrap an already-verified claims object.
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Get a claim by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Get a string claim, or `None` if absent or not a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Get an integer claim, or `None` if absent or not an integer.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    /// The `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// The underlying claims object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Fixed-shape identity record extracted from claims.
///
/// No validation happens here. Claims of the wrong type are left absent,
/// except `aud`, which is passed through as-is since issuers send either a
/// string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub role: String,
    pub aud: Option<Value>,
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    pub iss: Option<String>,
}

impl From<&Claims> for UserInfo {
    fn from(claims: &Claims) -> Self {
        Self {
            user_id: claims.subject().map(str::to_string),
            email: claims.get_str("email").map(str::to_string),
            role: claims.get_str("role").unwrap_or(DEFAULT_ROLE).to_string(),
            aud: claims.get("aud").cloned(),
            exp: claims.get_i64("exp"),
            iat: claims.get_i64("iat"),
            iss: claims.get_str("iss").map(str::to_string),
        }
    }
}

/// Identity attached to a request once its bearer token has been verified.
///
/// Unlike [`UserInfo`], the user id here is guaranteed to be present and
/// non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    user_id: UserId,
    info: UserInfo,
}

impl AuthenticatedUser {
    /// Build from projected claims. Returns `None` if the subject is absent
    /// or blank.
    pub fn from_user_info(info: UserInfo) -> Option<Self> {
        let user_id = info
            .user_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map(UserId::new)?;
        Some(Self { user_id, info })
    }

    /// Get the authenticated user id.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Get the email if the token carried one.
    pub fn email(&self) -> Option<&str> {
        self.info.email.as_deref()
    }

    /// Get the role claim.
    pub fn role(&self) -> &str {
        &self.info.role
    }

    /// Get the full projected claims.
    pub fn info(&self) -> &UserInfo {
        &self.info
    }
}
