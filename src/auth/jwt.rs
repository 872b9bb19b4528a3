use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::{AuthError, AuthUser, Claims};

/// Audience set by the auth provider on end-user tokens
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

/// Validates access tokens signed by the managed auth provider
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    configured: bool,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .field("configured", &self.configured)
            .finish()
    }
}

impl JwtService {
    /// Create a new JWT service with the provider's shared secret.
    /// An empty secret leaves the service unconfigured: every token is refused.
    pub fn new(secret: &str) -> Self {
        if secret.is_empty() {
            tracing::warn!("AUTH_JWT_SECRET is not set, all authenticated routes will answer 401");
        }
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            configured: !secret.is_empty(),
        }
    }

    /// Sign a token the way the provider does; used by tooling and tests
    pub fn create_token(
        &self,
        user_id: Uuid,
        email: &str,
        expires_in: Duration,
    ) -> Result<String, AuthError> {
        if !self.configured {
            return Err(AuthError::NotConfigured);
        }
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: Some(email.to_string()),
            aud: AUTHENTICATED_AUDIENCE.to_string(),
            exp: (now + expires_in).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidToken)
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        if !self.configured {
            tracing::error!("Rejecting bearer token: no JWT secret configured");
            return Err(AuthError::NotConfigured);
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[AUTHENTICATED_AUDIENCE]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|token_data| token_data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }

    /// Extract the caller from a token
    pub fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token)?;
        AuthUser::from_claims(&claims).map_err(|_| AuthError::InvalidToken)
    }
}
