//! Bearer token authentication.
//!
//! Tokens are checked against the shared HS256 secret first and, failing
//! that, against the issuer's published JWKS. The HTTP middleware in
//! [`extractor`] attaches the resulting [`AuthenticatedUser`] to requests.

mod claims;
mod error;
mod extractor;
pub mod jwks;
mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use claims::{AuthenticatedUser, Claims, DEFAULT_ROLE, UserInfo};
pub use error::AuthError;
pub use extractor::{AuthRejection, bearer_token, optional_auth, require_auth};
pub use jwks::{JwksCache, JwksFetcher};
pub use verifier::{AUTHENTICATED_AUDIENCE, TokenVerifier};
