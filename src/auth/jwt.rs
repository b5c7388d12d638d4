//! JWT token management
//!
//! Issues and validates the tenant's administrative credential. Tokens are
//! stateless: HS256, signed with the tenant secret, valid for 30 days.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Subject carried by every administrative token
pub const TOKEN_SUBJECT: &str = "prx-admin";

/// Token lifetime in days
pub const TOKEN_TTL_DAYS: i64 = 30;

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject
    pub sub: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

impl TokenClaims {
    /// Claims issued at `now`
    #[must_use]
    pub fn issued_at(now: DateTime<Utc>) -> Self {
        Self {
            sub: TOKEN_SUBJECT.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
        }
    }
}

/// JWT token manager
pub struct JwtManager {
    /// Encoding key
    encoding_key: EncodingKey,
    /// Decoding key
    decoding_key: DecodingKey,
    /// Validation configuration
    validation: Validation,
}

impl JwtManager {
    /// Create a manager for the given tenant secret
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(GatewayError::config("JWT secret cannot be empty"));
        }

        let encoding_key = EncodingKey::from_secret(secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
        })
    }

    /// Issue a token valid from now
    pub fn issue_token(&self) -> Result<String> {
        self.issue_token_at(Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_token_at(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = TokenClaims::issued_at(now);
        let header = Header::new(Algorithm::HS256);

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| GatewayError::internal_with_source("Token generation failed", e))
    }

    /// Validate and parse token
    ///
    /// Every failure (bad signature, wrong algorithm, expired, malformed,
    /// missing claims, foreign subject) is an authentication error.
    pub fn validate_token(&self, token: &str) -> Result<TokenClaims> {
        let token_data: TokenData<TokenClaims> = decode(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    GatewayError::auth("token has expired")
                }
                _ => GatewayError::auth(format!("token validation failed: {e}")),
            })?;

        let claims = token_data.claims;
        if claims.sub != TOKEN_SUBJECT {
            return Err(GatewayError::auth("token subject is not permitted"));
        }

        Ok(claims)
    }
}
