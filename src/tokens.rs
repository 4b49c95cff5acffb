//! Access/refresh token pair.
//!
//! Access tokens are verified statelessly. The current refresh token is mirrored on
//! the user record, so issuing a new pair or logging out revokes the previous one.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::core::errors::ApiError;
use crate::models::models::TokenPair;
use crate::store::Store;

const ACCESS: &str = "access";
const REFRESH: &str = "refresh";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token so two pairs minted in the same second still differ.
    pub jti: String,
    pub token_type: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("expected a {expected} token")]
    WrongType { expected: &'static str },
    #[error("token lifetime {0} is out of range")]
    ExpiryOutOfRange(Duration),
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Keys {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

pub struct TokenService {
    access: Keys,
    refresh: Keys,
}

impl TokenService {
    pub fn new(
        access_secret: &str,
        access_ttl: Duration,
        refresh_secret: &str,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access: Keys::new(access_secret, access_ttl),
            refresh: Keys::new(refresh_secret, refresh_ttl),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.access_token_secret,
            config.access_token_expiry,
            &config.refresh_token_secret,
            config.refresh_token_expiry,
        )
    }

    pub fn access_ttl(&self) -> Duration {
        self.access.ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl
    }

    fn sign(&self, keys: &Keys, user_id: &str, token_type: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(keys.ttl)
            .ok_or(TokenError::ExpiryOutOfRange(keys.ttl))?;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: token_type.to_string(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)?)
    }

    fn verify(
        &self,
        keys: &Keys,
        token: &str,
        expected: &'static str,
    ) -> Result<String, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &keys.decoding, &validation)?;
        if data.claims.token_type != expected {
            return Err(TokenError::WrongType { expected });
        }
        Ok(data.claims.sub)
    }

    pub fn verify_access(&self, token: &str) -> Result<String, TokenError> {
        self.verify(&self.access, token, ACCESS)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<String, TokenError> {
        self.verify(&self.refresh, token, REFRESH)
    }

    /// Mints a new pair and makes its refresh token the only one the user can rotate.
    pub async fn issue(&self, store: &dyn Store, user_id: &str) -> Result<TokenPair, ApiError> {
        let pair = TokenPair {
            access_token: self
                .sign(&self.access, user_id, ACCESS)
                .map_err(|e| ApiError::Internal(e.to_string()))?,
            refresh_token: self
                .sign(&self.refresh, user_id, REFRESH)
                .map_err(|e| ApiError::Internal(e.to_string()))?,
        };

        if !store
            .set_refresh_token(user_id, Some(&pair.refresh_token))
            .await?
        {
            return Err(ApiError::not_found("User not found."));
        }
        Ok(pair)
    }

    /// Exchanges the stored refresh token for a fresh pair. A token that verifies but is
    /// no longer the stored one (superseded by a later login, or revoked) is refused.
    pub async fn rotate(
        &self,
        store: &dyn Store,
        refresh_token: &str,
    ) -> Result<TokenPair, ApiError> {
        let user_id = self.verify_refresh(refresh_token).map_err(|e| {
            warn!(error = %e, "Refresh token rejected");
            ApiError::Unauthorized("Invalid refresh token.".to_string())
        })?;

        let user = store
            .find_user(&user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found."))?;

        if user.refresh_token.as_deref() != Some(refresh_token) {
            warn!(user_id = %user_id, "Stale refresh token presented");
            return Err(ApiError::Unauthorized(
                "Unauthorized access: Invalid Refresh Token.".to_string(),
            ));
        }

        let pair = self.issue(store, &user_id).await?;
        info!(user_id = %user_id, "Rotated token pair");
        Ok(pair)
    }

    pub async fn revoke(&self, store: &dyn Store, user_id: &str) -> Result<(), ApiError> {
        if !store.set_refresh_token(user_id, None).await? {
            return Err(ApiError::not_found("User not found."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::helpers::{new_id, now};
    use crate::models::models::User;
    use crate::store::MemoryStore;

    fn service() -> TokenService {
        TokenService::new(
            "access-secret-that-is-long-enough",
            Duration::minutes(15),
            "refresh-secret-that-is-long-enough",
            Duration::days(7),
        )
    }

    async fn store_with_user() -> (MemoryStore, String) {
        let store = MemoryStore::new();
        let id = new_id();
        store
            .insert_user(&User {
                id: id.clone(),
                full_name: "Alice".to_string(),
                username: "alice".to_string(),
                email: "alice@x.com".to_string(),
                password: "hash".to_string(),
                followers: Vec::new(),
                following: Vec::new(),
                liked_posts: Vec::new(),
                bio: None,
                link: None,
                profile_img: None,
                cover_img: None,
                refresh_token: None,
                created_at: now(),
                updated_at: now(),
            })
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn issued_tokens_verify_with_their_own_secret() {
        let (store, id) = store_with_user().await;
        let tokens = service();
        let pair = tokens.issue(&store, &id).await.unwrap();

        assert_eq!(tokens.verify_access(&pair.access_token).unwrap(), id);
        assert_eq!(tokens.verify_refresh(&pair.refresh_token).unwrap(), id);
        assert!(tokens.verify_access(&pair.refresh_token).is_err());
        assert!(tokens.verify_refresh(&pair.access_token).is_err());
        assert!(tokens.verify_access("not.a.token").is_err());
    }

    #[tokio::test]
    async fn same_secret_still_separates_token_types() {
        let (store, id) = store_with_user().await;
        let tokens = TokenService::new("shared", Duration::minutes(5), "shared", Duration::days(1));
        let pair = tokens.issue(&store, &id).await.unwrap();

        assert!(matches!(
            tokens.verify_access(&pair.refresh_token),
            Err(TokenError::WrongType { expected: "access" })
        ));
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected() {
        let (store, id) = store_with_user().await;
        let tokens = TokenService::new(
            "access-secret",
            Duration::seconds(-10),
            "refresh-secret",
            Duration::seconds(-10),
        );
        let pair = tokens.issue(&store, &id).await.unwrap();
        assert!(tokens.verify_access(&pair.access_token).is_err());
        assert!(tokens.verify_refresh(&pair.refresh_token).is_err());
    }

    #[tokio::test]
    async fn oversized_lifetimes_fail_instead_of_panicking() {
        let (store, id) = store_with_user().await;
        let huge = Duration::try_days(100_000_000).unwrap();
        let tokens = TokenService::new("access-secret", huge, "refresh-secret", huge);

        assert!(matches!(
            tokens.sign(&tokens.access, &id, ACCESS),
            Err(TokenError::ExpiryOutOfRange(_))
        ));
        assert!(matches!(
            tokens.issue(&store, &id).await,
            Err(ApiError::Internal(_))
        ));
        assert!(store.find_user(&id).await.unwrap().unwrap().refresh_token.is_none());
    }

    #[tokio::test]
    async fn issuing_overwrites_the_stored_refresh_token() {
        let (store, id) = store_with_user().await;
        let tokens = service();

        let first = tokens.issue(&store, &id).await.unwrap();
        let second = tokens.issue(&store, &id).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let stored = store.find_user(&id).await.unwrap().unwrap().refresh_token;
        assert_eq!(stored.as_deref(), Some(second.refresh_token.as_str()));

        let err = tokens.rotate(&store, &first.refresh_token).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn rotation_replaces_the_pair() {
        let (store, id) = store_with_user().await;
        let tokens = service();
        let pair = tokens.issue(&store, &id).await.unwrap();

        let rotated = tokens.rotate(&store, &pair.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);
        assert!(tokens.rotate(&store, &pair.refresh_token).await.is_err());
        assert!(tokens.rotate(&store, &rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn revoked_refresh_tokens_cannot_rotate() {
        let (store, id) = store_with_user().await;
        let tokens = service();
        let pair = tokens.issue(&store, &id).await.unwrap();

        tokens.revoke(&store, &id).await.unwrap();
        assert!(store.find_user(&id).await.unwrap().unwrap().refresh_token.is_none());
        assert!(matches!(
            tokens.rotate(&store, &pair.refresh_token).await,
            Err(ApiError::Unauthorized(_))
        ));
        // Access tokens stay valid until they expire.
        assert_eq!(tokens.verify_access(&pair.access_token).unwrap(), id);
    }

    #[tokio::test]
    async fn issuing_for_unknown_user_fails() {
        let store = MemoryStore::new();
        assert!(matches!(
            service().issue(&store, &new_id()).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
