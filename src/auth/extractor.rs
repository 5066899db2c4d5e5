//! Authentication extractor for HTTP requests.
//!
//! `require_auth` rejects requests without a valid bearer token and stores
//! the [`AuthenticatedUser`] in request extensions. `optional_auth` does the
//! same but lets unauthenticated requests through.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::auth::claims::AuthenticatedUser;
use crate::auth::verifier::TokenVerifier;
use crate::auth::AuthError;

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// No usable `Authorization: Bearer` header.
    MissingCredentials,
    /// A token was presented but did not verify.
    InvalidCredentials(AuthError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            Self::MissingCredentials => (StatusCode::UNAUTHORIZED, "Not authenticated".to_string()),
            Self::InvalidCredentials(AuthError::MissingIdentity) => (
                StatusCode::UNAUTHORIZED,
                AuthError::MissingIdentity.to_string(),
            ),
            Self::InvalidCredentials(err) if err.is_authentication_failure() => (
                StatusCode::UNAUTHORIZED,
                format!("Could not validate credentials: {}", err),
            ),
            Self::InvalidCredentials(err) => {
                error!("Token verifier misconfigured: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let mut response = (status, Json(json!({ "detail": detail }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
///
/// The scheme name is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Middleware for routes that require an authenticated user.
pub async fn require_auth(
    State(verifier): State<Arc<TokenVerifier>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let token = bearer_token(req.headers()).ok_or_else(|| {
        debug!("Missing or invalid Authorization header");
        AuthRejection::MissingCredentials
    })?;

    let user = verifier.authenticate(token).await.map_err(|err| {
        warn!(kind = err.kind(), "Authentication failed: {}", err);
        AuthRejection::InvalidCredentials(err)
    })?;

    debug!(
        user_id = %user.user_id(),
        role = user.role(),
        "Authentication successful"
    );
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Middleware for routes where authentication is optional.
///
/// A valid token attaches the user; a missing or invalid one is ignored.
pub async fn optional_auth(
    State(verifier): State<Arc<TokenVerifier>>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(req.headers()) {
        match verifier.authenticate(token).await {
            Ok(user) => {
                req.extensions_mut().insert(user);
            }
            Err(err) => {
                warn!(kind = err.kind(), "Optional authentication failed: {}", err);
            }
        }
    }

    next.run(req).await
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AuthRejection::MissingCredentials)
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}
