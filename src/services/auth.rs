//! Session authentication.
//!
//! Minimal username/password layer: Argon2 password hashes in the users
//! table, an HS256 session token issued at login and verified as a yes/no
//! gate in front of the protected routes. The JWT secret is checked lazily
//! at first use so the service can boot without auth configured.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::user::User;

/// Session token lifetime.
const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth configuration error: {0}")]
    Configuration(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("token encoding failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct AuthService {
    jwt_secret: Option<String>,
    admin_api_key: Option<String>,
}

impl AuthService {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            admin_api_key: config.admin_api_key.clone(),
        }
    }

    #[cfg(test)]
    pub fn for_tests(secret: &str, admin_key: &str) -> Self {
        Self {
            jwt_secret: Some(secret.to_string()),
            admin_api_key: Some(admin_key.to_string()),
        }
    }

    fn secret(&self) -> Result<&[u8], AuthError> {
        self.jwt_secret
            .as_deref()
            .map(str::as_bytes)
            .ok_or_else(|| AuthError::Configuration("JWT_SECRET is not set".into()))
    }

    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hash(e.to_string()))
    }

    pub fn verify_password(&self, password: &str, password_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(password_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret()?),
        )?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let secret = self.secret()?;
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidToken)
    }

    /// Gate for the admin-only user-creation endpoint.
    pub fn verify_admin_key(&self, presented: &str) -> Result<(), AuthError> {
        let expected = self
            .admin_api_key
            .as_deref()
            .ok_or_else(|| AuthError::Configuration("ADMIN_API_KEY is not set".into()))?;
        if presented == expected {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Pull the bearer token out of an Authorization header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn service() -> AuthService {
        AuthService::for_tests("test-secret", "admin-key")
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "ana".to_string(),
            email: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn password_hash_verifies() {
        let auth = service();
        let hash = auth.hash_password("hunter2!").unwrap();
        assert!(auth.verify_password("hunter2!", &hash));
        assert!(!auth.verify_password("hunter3!", &hash));
    }

    #[test]
    fn token_roundtrip() {
        let auth = service();
        let user = user();
        let token = auth.issue_token(&user).unwrap();
        let claims = auth.verify_token(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "ana");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let auth = service();
        let token = auth.issue_token(&user()).unwrap();
        let other = AuthService::for_tests("other-secret", "admin-key");
        assert!(matches!(
            other.verify_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn missing_secret_is_a_configuration_error() {
        let auth = AuthService {
            jwt_secret: None,
            admin_api_key: None,
        };
        assert!(matches!(
            auth.issue_token(&user()),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }
}
