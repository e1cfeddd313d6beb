use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use chrono::{Duration, Utc};

use crate::models::Role;

const HASH_COST: u32 = 10;
pub const ACCESS_TOKEN_TTL_HOURS: i64 = 24;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedPassword {
    pub hash: String,
    pub salt: String,
}

/// Hashes with a freshly generated salt, so equal inputs give different
/// outputs.
pub fn hash_password(password: &str) -> Result<HashedPassword, bcrypt::BcryptError> {
    let parts = bcrypt::hash_with_result(password, HASH_COST)?;
    Ok(HashedPassword {
        hash: parts.format_for_version(bcrypt::Version::TwoB),
        salt: format!("$2b${:02}${}", parts.get_cost(), parts.get_salt()),
    })
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub kind: TokenKind,
    /// Makes every issued refresh token distinct, even within one second.
    pub jti: Uuid,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("expected a {expected:?} token")]
    WrongKind { expected: TokenKind },
}

/// Signing material for access and refresh tokens.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn generate_token(&self, user_id: Uuid, role: Role) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            kind: TokenKind::Access,
            exp: (now + Duration::hours(ACCESS_TOKEN_TTL_HOURS)).timestamp(),
            iat: now.timestamp(),
        };
        self.sign(&claims)
    }

    pub fn generate_refresh_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: user_id,
            kind: TokenKind::Refresh,
            jti: Uuid::new_v4(),
            exp: (now + Duration::days(REFRESH_TOKEN_TTL_DAYS)).timestamp(),
            iat: now.timestamp(),
        };
        self.sign(&claims)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)?.claims;
        if claims.kind != TokenKind::Access {
            return Err(TokenError::WrongKind {
                expected: TokenKind::Access,
            });
        }
        Ok(claims)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims = decode::<RefreshClaims>(token, &self.decoding, &self.validation)?.claims;
        if claims.kind != TokenKind::Refresh {
            return Err(TokenError::WrongKind {
                expected: TokenKind::Refresh,
            });
        }
        Ok(claims)
    }

    pub(crate) fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }
}
