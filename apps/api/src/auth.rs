//! JWT authentication module.
//!
//! Handles token generation and validation. Every token carries a unique
//! `jti`, which is the handle the revocation blacklist operates on.

use axum::extract::FromRequestParts;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    /// Display name of the user
    pub name: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

/// A freshly issued token together with the claims baked into it.
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

/// JWT token manager.
pub struct JwtManager {
    secret: String,
    access_lifetime_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager.
    pub fn new(secret: String, access_lifetime_secs: i64) -> Self {
        JwtManager {
            secret,
            access_lifetime_secs,
        }
    }

    /// Generate an access token for a user.
    pub fn generate_token(&self, user_id: Uuid, user_name: &str) -> Result<IssuedToken, ApiError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_lifetime_secs);
        let token_id = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user_id.to_string(),
            name: user_name.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: token_id.clone(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::Internal(format!("Failed to generate token: {}", e)))?;

        Ok(IssuedToken {
            token,
            token_id,
            expires_at: exp,
        })
    }

    /// Validate and decode a token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, ApiError> {
        let validation = Validation::default();

        let token_data: TokenData<Claims> = decode(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| ApiError::Unauthorized(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Authenticated principal carried through the request pipeline.
///
/// Inserted into request extensions by the revocation interceptor once the
/// token has been validated and checked against the blacklist.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub user_name: String,
    pub token_id: String,
    pub token_expires_at: DateTime<Utc>,
}

impl AuthUser {
    /// Build from validated claims. Fails when the subject is not a UUID.
    pub fn from_claims(claims: &Claims) -> Result<Self, ApiError> {
        let user_id = claims
            .sub
            .parse()
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))?;
        let token_expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| ApiError::Unauthorized("Invalid token expiry".to_string()))?;

        Ok(AuthUser {
            user_id,
            user_name: claims.name.clone(),
            token_id: claims.jti.clone(),
            token_expires_at,
        })
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
    }
}
