//! Bearer-token authentication.
//!
//! [`TokenAuthority`] issues and verifies HS256 JWTs carrying `sub` (user id)
//! and `exp` (unix seconds). It is handed to the router explicitly and
//! [`require_bearer`] guards the measurement routes with it.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;

use crate::errors::AppError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email or password invalid")]
    InvalidCredentials,
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("token could not be issued: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("token expiry is out of range")]
    ExpiryOutOfRange,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

#[derive(Clone)]
pub struct TokenAuthority {
    keys: Arc<Keys>,
    expires_in: i64,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    /// `expires_in` is the token lifetime in seconds.
    pub fn new(secret: &str, expires_in: i64) -> Self {
        Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
            }),
            expires_in,
        }
    }

    pub fn issue(&self, subject: &str) -> Result<String, AuthError> {
        let exp = Utc::now()
            .timestamp()
            .checked_add(self.expires_in)
            .ok_or(AuthError::ExpiryOutOfRange)?;
        let claims = Claims {
            sub: subject.to_string(),
            exp,
        };
        self.encode(&claims)
    }

    fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.keys.encoding)
            .map_err(AuthError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(AuthError::InvalidToken)
    }
}

/// Reject requests without a valid `Authorization: Bearer <jwt>` header.
///
/// Verified claims are stored in the request extensions.
pub async fn require_bearer(
    State(authority): State<TokenAuthority>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AuthError::MissingToken)?;

    let claims = authority.verify(token)?;
    tracing::debug!(sub = %claims.sub, "bearer token accepted");

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
