//! Authentication: password hashing, bearer token issuance and verification
//!
//! A request arrives with an optional `Authorization: Bearer <token>`
//! header. No header (or a non-Bearer scheme) is a valid anonymous request;
//! a present-but-invalid token is a hard authentication failure surfaced to
//! the caller, never silently treated as anonymous.

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LibrisError, Result};
use crate::store::{LibraryStore, UserRecord};

/// Initial password assigned to accounts created through `createUser`,
/// which takes no password argument.
pub const DEFAULT_PASSWORD: &str = "secret";

/// Authenticated caller attached to a request context
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: UserRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User id
    sub: String,
    username: String,
    iat: u64,
    exp: u64,
}

/// Issues and verifies bearer tokens against the user store
pub struct AuthService {
    secret: String,
    token_ttl: Duration,
    store: Arc<dyn LibraryStore>,
}

impl AuthService {
    pub fn new(
        secret: impl Into<String>,
        token_ttl: Duration,
        store: Arc<dyn LibraryStore>,
    ) -> Self {
        Self {
            secret: secret.into(),
            token_ttl,
            store,
        }
    }

    /// Hash a password for storage.
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| LibrisError::Internal(format!("password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// Check a password against a stored hash.
    pub fn verify_password(password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Verify credentials and issue a token for the user.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| LibrisError::AuthenticationInvalid("wrong credentials".to_string()))?;

        if !Self::verify_password(password, &user.password_hash) {
            return Err(LibrisError::AuthenticationInvalid(
                "wrong credentials".to_string(),
            ));
        }

        self.issue_token(&user)
    }

    /// Sign a bearer token for an authenticated user.
    pub fn issue_token(&self, user: &UserRecord) -> Result<String> {
        let now = chrono::Utc::now().timestamp() as u64;
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            iat: now,
            exp: now + self.token_ttl.as_secs(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| LibrisError::Internal(format!("token signing failed: {e}")))
    }

    /// Resolve the identity behind a request's `Authorization` header.
    ///
    /// `None` (or a non-Bearer scheme) means anonymous. A bearer token that
    /// fails verification, or whose subject no longer exists, is an
    /// `AuthenticationInvalid` error.
    pub async fn identify(&self, authorization: Option<&str>) -> Result<Option<Identity>> {
        let Some(header) = authorization else {
            return Ok(None);
        };
        let Some(token) = header.strip_prefix("Bearer ") else {
            return Ok(None);
        };

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| LibrisError::AuthenticationInvalid(format!("invalid bearer token: {e}")))?;

        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| {
            LibrisError::AuthenticationInvalid("malformed token subject".to_string())
        })?;

        let user = self.store.find_user(user_id).await?.ok_or_else(|| {
            LibrisError::AuthenticationInvalid("token subject no longer exists".to_string())
        })?;

        Ok(Some(Identity { user }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewUser};

    async fn service_with_user() -> (AuthService, UserRecord) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                username: "reader".to_string(),
                favorite_genre: "scifi".to_string(),
                password_hash: AuthService::hash_password(DEFAULT_PASSWORD).unwrap(),
            })
            .await
            .unwrap();
        let service = AuthService::new("test-secret", Duration::from_secs(3600), store);
        (service, user)
    }

    #[tokio::test]
    async fn token_roundtrip_identifies_user() {
        let (service, user) = service_with_user().await;

        let token = service.issue_token(&user).unwrap();
        let header = format!("Bearer {token}");
        let identity = service.identify(Some(&header)).await.unwrap();
        assert_eq!(identity.unwrap().user.username, "reader");
    }

    #[tokio::test]
    async fn missing_header_is_anonymous() {
        let (service, _) = service_with_user().await;
        assert!(service.identify(None).await.unwrap().is_none());
        assert!(service
            .identify(Some("Basic dXNlcjpwdw=="))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn tampered_token_is_a_hard_failure() {
        let (service, user) = service_with_user().await;
        let token = service.issue_token(&user).unwrap();
        let header = format!("Bearer {token}x");

        let err = service.identify(Some(&header)).await.unwrap_err();
        assert_eq!(err.code(), "AUTHENTICATION_INVALID");
    }

    #[tokio::test]
    async fn wrong_signing_secret_is_rejected() {
        let (service, user) = service_with_user().await;
        let token = service.issue_token(&user).unwrap();

        let other = AuthService::new(
            "different-secret",
            Duration::from_secs(3600),
            Arc::new(MemoryStore::new()),
        );
        let header = format!("Bearer {token}");
        assert!(other.identify(Some(&header)).await.is_err());
    }

    #[tokio::test]
    async fn login_verifies_password() {
        let (service, _) = service_with_user().await;

        let token = service.login("reader", DEFAULT_PASSWORD).await.unwrap();
        assert!(!token.is_empty());

        let err = service.login("reader", "wrong").await.unwrap_err();
        assert_eq!(err.code(), "AUTHENTICATION_INVALID");

        let err = service.login("nobody", DEFAULT_PASSWORD).await.unwrap_err();
        assert_eq!(err.code(), "AUTHENTICATION_INVALID");
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = AuthService::hash_password("hunter2").unwrap();
        assert!(AuthService::verify_password("hunter2", &hash));
        assert!(!AuthService::verify_password("hunter3", &hash));
        assert!(!AuthService::verify_password("hunter2", "not-a-hash"));
    }
}
