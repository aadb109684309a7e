//! Signed access and refresh tokens (HS256).
//!
//! Access and refresh tokens use separate secrets, and each token carries its
//! type, so one can never be presented in place of the other.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::db::models::User;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub email: String,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token, so a rotated refresh token never equals its predecessor.
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KeyPair {
    fn from_secret(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

pub struct TokenKeys {
    access: KeyPair,
    refresh: KeyPair,
}

impl TokenKeys {
    pub fn from_config(cfg: &AuthConfig) -> AppResult<Self> {
        let access_secret = cfg
            .access_token_secret
            .as_deref()
            .ok_or_else(|| AppError::Internal("auth.access_token_secret is not set".into()))?;
        let refresh_secret = cfg
            .refresh_token_secret
            .as_deref()
            .ok_or_else(|| AppError::Internal("auth.refresh_token_secret is not set".into()))?;

        Ok(Self {
            access: KeyPair::from_secret(access_secret, Duration::minutes(cfg.access_token_minutes)),
            refresh: KeyPair::from_secret(refresh_secret, Duration::days(cfg.refresh_token_days)),
        })
    }

    fn keys(&self, token_type: TokenType) -> &KeyPair {
        match token_type {
            TokenType::Access => &self.access,
            TokenType::Refresh => &self.refresh,
        }
    }

    /// Lifetime of `token_type` tokens in seconds, for cookie `Max-Age`.
    pub fn ttl_secs(&self, token_type: TokenType) -> i64 {
        self.keys(token_type).ttl.num_seconds()
    }

    pub fn issue(&self, user: &User, token_type: TokenType) -> Result<String, JwtError> {
        let keys = self.keys(token_type);
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            token_type,
            iat: now.timestamp(),
            exp: (now + keys.ttl).timestamp(),
            jti: uuid::Uuid::now_v7().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access_token: self.issue(user, TokenType::Access)?,
            refresh_token: self.issue(user, TokenType::Refresh)?,
        })
    }

    /// Validate signature, expiry and token type.
    pub fn verify(&self, token: &str, token_type: TokenType) -> Result<Claims, JwtError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.keys(token_type).decoding, &validation)?;
        if data.claims.token_type != token_type {
            return Err(ErrorKind::InvalidToken.into());
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            access_token_secret: Some("access-secret".into()),
            refresh_token_secret: Some("refresh-secret".into()),
            ..Default::default()
        }
    }

    fn user() -> User {
        User {
            id: "u-1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            full_name: "Alice".into(),
            password_hash: String::new(),
            avatar_url: None,
            avatar_store_id: None,
            cover_image_url: None,
            cover_image_store_id: None,
            refresh_token: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn issued_tokens_verify_with_matching_type() {
        let keys = TokenKeys::from_config(&config()).unwrap();
        let pair = keys.issue_pair(&user()).unwrap();

        let access = keys.verify(&pair.access_token, TokenType::Access).unwrap();
        assert_eq!(access.sub, "u-1");
        assert_eq!(access.username, "alice");
        assert_eq!(access.exp - access.iat, 24 * 60 * 60);

        let refresh = keys.verify(&pair.refresh_token, TokenType::Refresh).unwrap();
        assert_eq!(refresh.token_type, TokenType::Refresh);
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        let keys = TokenKeys::from_config(&config()).unwrap();
        let pair = keys.issue_pair(&user()).unwrap();
        assert!(keys.verify(&pair.refresh_token, TokenType::Access).is_err());
        assert!(keys.verify(&pair.access_token, TokenType::Refresh).is_err());
    }

    #[test]
    fn same_secret_still_checks_type() {
        let cfg = AuthConfig {
            access_token_secret: Some("shared".into()),
            refresh_token_secret: Some("shared".into()),
            ..Default::default()
        };
        let keys = TokenKeys::from_config(&cfg).unwrap();
        let refresh = keys.issue(&user(), TokenType::Refresh).unwrap();
        let err = keys.verify(&refresh, TokenType::Access).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidToken));
    }

    #[test]
    fn expired_token_is_rejected() {
        let cfg = AuthConfig {
            access_token_minutes: -10,
            ..config()
        };
        let keys = TokenKeys::from_config(&cfg).unwrap();
        let token = keys.issue(&user(), TokenType::Access).unwrap();
        let err = keys.verify(&token, TokenType::Access).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ExpiredSignature));
    }

    #[test]
    fn rotated_refresh_tokens_differ() {
        let keys = TokenKeys::from_config(&config()).unwrap();
        let first = keys.issue(&user(), TokenType::Refresh).unwrap();
        let second = keys.issue(&user(), TokenType::Refresh).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn missing_secret_is_an_error() {
        let cfg = AuthConfig::default();
        assert!(TokenKeys::from_config(&cfg).is_err());
    }
}
