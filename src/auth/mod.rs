use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Claims carried by tenant tokens. Tokens are issued by the account service;
/// billing only needs the restaurant the caller acts for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantClaims {
    pub sub: String,
    pub restaurant_id: Uuid,
    pub exp: i64,
    pub iat: i64,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<TenantClaims> {
        decode::<TenantClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Rejected tenant token: {}", e);
                AppError::Unauthorized
            })
    }

    /// Signs a token for `restaurant_id`. Used by the seed tool and tests;
    /// production tokens come from the account service with the same secret.
    pub fn issue(&self, subject: &str, restaurant_id: Uuid, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = TenantClaims {
            sub: subject.to_string(),
            restaurant_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
    }
}
