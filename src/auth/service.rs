/// Authentication flows: register, login, refresh (rotation + reuse
/// detection), logout and logout-all.
///
/// A refresh token moves from `issued` to exactly one terminal state:
/// redeemed (deleted and replaced), revoked (logout / logout-all), or
/// reuse-detected (every session of the owner is revoked).

use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::jwt::{IssuedRefreshToken, TokenCodec};
use crate::auth::password::{PasswordError, PasswordHasher};
use crate::auth::refresh_token::digest_for_storage;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::middleware::Identity;
use crate::store::{NewRefreshToken, TokenStore, User, UserStore};
use crate::validators::{is_valid_email, is_valid_password, normalize_email};

/// Access + refresh token pair handed to the client
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: User,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    codec: Arc<TokenCodec>,
    hasher: Arc<PasswordHasher>,
    store_timeout: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        codec: Arc<TokenCodec>,
        hasher: Arc<PasswordHasher>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            codec,
            hasher,
            store_timeout,
        }
    }

    pub fn codec(&self) -> Arc<TokenCodec> {
        self.codec.clone()
    }

    /// Validate input, hash the password and create the account.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = is_valid_email(email)?;
        is_valid_password(password)?;

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let password_hash = blocking(move || hasher.hash(&password)).await??;

        let user = self
            .with_deadline("create_user", self.users.create(&email, &password_hash))
            .await?;

        tracing::info!(user_id = user.id, "User registered");
        Ok(user)
    }

    /// Unknown email and wrong password fail identically.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let email = normalize_email(email);
        let user = self
            .with_deadline("find_user_by_email", self.users.find_by_email(email))
            .await?;

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        let verified = blocking(move || match stored_hash {
            Some(hash) => hasher.verify(&hash, &password),
            None => Err(hasher.verify_dummy(&password)),
        })
        .await?;

        let user = match (verified, user) {
            (Ok(()), Some(user)) => user,
            (Err(PasswordError::Hashing(msg)), _) => return Err(AppError::Internal(msg)),
            _ => {
                tracing::warn!("Login rejected");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let (tokens, refresh) = self.issue_pair(&user)?;
        self.with_deadline("insert_refresh_token", self.tokens.insert(refresh))
            .await?;

        tracing::info!(user_id = user.id, "User logged in");
        Ok(LoginOutcome { tokens, user })
    }

    /// Redeem a refresh token for a new pair, invalidating the old one.
    pub async fn refresh(&self, raw_refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self.codec.verify_refresh(raw_refresh_token).map_err(|e| {
            tracing::debug!(error = %e, "Refresh token rejected by codec");
            AppError::Auth(AuthError::TokenInvalid)
        })?;
        let user_id = claims
            .user_id()
            .map_err(|_| AppError::Auth(AuthError::TokenInvalid))?;

        let record = self
            .with_deadline("find_refresh_token", self.tokens.find_by_jti(&claims.jti))
            .await?;

        let record = match record {
            Some(record) => record,
            None => return Err(self.reuse_detected(user_id).await),
        };

        if record.token_hash != digest_for_storage(raw_refresh_token) {
            tracing::warn!(user_id, "Refresh token digest mismatch");
            return Err(AuthError::TokenInvalid.into());
        }
        if record.user_id != user_id || record.expires_at <= Utc::now() {
            tracing::warn!(user_id, "Refresh token record does not match claims");
            return Err(AuthError::TokenInvalid.into());
        }

        let user = self
            .with_deadline("find_user_by_id", self.users.find_by_id(user_id))
            .await?
            .ok_or(AppError::Auth(AuthError::TokenInvalid))?;

        let (tokens, replacement) = self.issue_pair(&user)?;
        let rotated = self
            .with_deadline("rotate_refresh_token", self.tokens.rotate(&claims.jti, replacement))
            .await?;

        if rotated.is_none() {
            // Lost the race against another redemption of the same token.
            return Err(self.reuse_detected(user_id).await);
        }

        tracing::info!(user_id, "Refresh token rotated");
        Ok(tokens)
    }

    /// Revoke one session. Already-revoked tokens are not an error.
    pub async fn logout(&self, identity: &Identity, raw_refresh_token: &str) -> Result<(), AppError> {
        let claims = self.codec.verify_refresh(raw_refresh_token)?;
        let owner = claims.user_id()?;

        if owner != identity.user_id {
            tracing::warn!(
                user_id = identity.user_id,
                "Logout attempted with another user's refresh token"
            );
            return Err(AuthError::TokenInvalid.into());
        }

        let deleted = self
            .with_deadline("delete_refresh_token", self.tokens.delete_by_jti(&claims.jti))
            .await?;

        tracing::info!(user_id = owner, deleted, "User logged out");
        Ok(())
    }

    /// Revoke every session of `user_id`.
    pub async fn logout_all(&self, user_id: i64) -> Result<u64, AppError> {
        let revoked = self
            .with_deadline("delete_user_tokens", self.tokens.delete_all_for_user(user_id))
            .await?;

        tracing::info!(user_id, revoked, "All refresh tokens revoked for user");
        Ok(revoked)
    }

    pub async fn profile(&self, user_id: i64) -> Result<User, AppError> {
        self.with_deadline("find_user_by_id", self.users.find_by_id(user_id))
            .await?
            .ok_or_else(|| DatabaseError::NotFound("user".to_string()).into())
    }

    /// Revoke all sessions after a replayed refresh token. Cleanup failure is
    /// logged; the caller is rejected either way.
    async fn reuse_detected(&self, user_id: i64) -> AppError {
        tracing::warn!(user_id, "Refresh token reuse detected, revoking all sessions");

        match self
            .with_deadline("delete_user_tokens", self.tokens.delete_all_for_user(user_id))
            .await
        {
            Ok(revoked) => tracing::info!(user_id, revoked, "Sessions revoked after reuse"),
            Err(e) => tracing::error!(
                user_id,
                error = %e,
                "Failed to revoke sessions after refresh token reuse"
            ),
        }

        AuthError::ReuseDetected.into()
    }

    fn issue_pair(&self, user: &User) -> Result<(TokenPair, NewRefreshToken), AppError> {
        let access_token = self.codec.issue_access(user.id, &user.email)?;
        let IssuedRefreshToken {
            token,
            jti,
            expires_at,
        } = self.codec.issue_refresh(user.id)?;

        let record = NewRefreshToken {
            user_id: user.id,
            jti,
            token_hash: digest_for_storage(&token),
            expires_at,
        };
        let pair = TokenPair {
            access_token,
            refresh_token: token,
            token_type: "Bearer".to_string(),
            expires_in: self.codec.access_ttl_seconds(),
        };

        Ok((pair, record))
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, future: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.store_timeout, future).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(operation, "Store call exceeded its deadline");
                Err(DatabaseError::Timeout(operation.to_string()).into())
            }
        }
    }
}

/// Run CPU-bound bcrypt work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::RefreshClaims;
    use crate::configuration::JwtSettings;
    use crate::store::{MemoryTokenStore, MemoryUserStore};

    const EMAIL: &str = "a@x.com";
    const PASSWORD: &str = "Password123";

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            issuer: "test".to_string(),
        }
    }

    struct Harness {
        service: AuthService,
        tokens: MemoryTokenStore,
    }

    fn harness() -> Harness {
        let users = MemoryUserStore::new();
        let tokens = MemoryTokenStore::new();
        let service = AuthService::new(
            Arc::new(users),
            Arc::new(tokens.clone()),
            Arc::new(TokenCodec::from_settings(&jwt_settings()).unwrap()),
            Arc::new(PasswordHasher::new(crate::auth::MIN_COST).unwrap()),
            Duration::from_secs(2),
        );

        Harness { service, tokens }
    }

    async fn registered() -> (Harness, User) {
        let h = harness();
        let user = h.service.register(EMAIL, PASSWORD).await.unwrap();
        (h, user)
    }

    fn decode_refresh(h: &Harness, token: &str) -> RefreshClaims {
        h.service.codec().verify_refresh(token).unwrap()
    }

    #[tokio::test]
    async fn register_then_login_succeeds() {
        let (h, user) = registered().await;
        assert_ne!(user.password_hash, PASSWORD);

        let outcome = h.service.login(EMAIL, PASSWORD).await.unwrap();
        assert_eq!(outcome.user.id, user.id);
        assert_eq!(outcome.tokens.token_type, "Bearer");
        assert_eq!(outcome.tokens.expires_in, 900);
        assert_eq!(h.tokens.count_for_user(user.id), 1);

        let claims = h.service.codec().verify_access(&outcome.tokens.access_token).unwrap();
        assert_eq!(claims.email, EMAIL);
    }

    #[tokio::test]
    async fn register_twice_is_duplicate() {
        let (h, _) = registered().await;

        assert!(matches!(
            h.service.register(EMAIL, PASSWORD).await,
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
        ));
    }

    #[tokio::test]
    async fn register_rejects_malformed_input() {
        let h = harness();

        assert!(matches!(
            h.service.register("not-an-email", PASSWORD).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            h.service.register(EMAIL, "").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            h.service.register(EMAIL, &"a".repeat(73)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn register_same_email_twice_with_short_password() {
        let h = harness();

        let first = h.service.register("a@x.com", "pw").await;
        assert!(first.is_ok());

        assert!(matches!(
            h.service.register("a@x.com", "pw").await,
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
        ));
    }

    #[tokio::test]
    async fn login_then_refresh_with_short_password() {
        let h = harness();
        h.service.register("a@x.com", "pw").await.unwrap();

        let outcome = h.service.login("a@x.com", "pw").await.unwrap();
        let rotated = h.service.refresh(&outcome.tokens.refresh_token).await.unwrap();

        assert_ne!(rotated.refresh_token, outcome.tokens.refresh_token);
    }

    #[tokio::test]
    async fn register_then_login_with_surrounding_whitespace() {
        let h = harness();
        let user = h.service.register(" a@x.com", PASSWORD).await.unwrap();
        assert_eq!(user.email, "a@x.com");

        let padded = h.service.login(" a@x.com", PASSWORD).await.unwrap();
        assert_eq!(padded.user.id, user.id);

        let bare = h.service.login("a@x.com\n", PASSWORD).await.unwrap();
        assert_eq!(bare.user.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_detection_ignores_surrounding_whitespace() {
        let (h, _) = registered().await;

        assert!(matches!(
            h.service.register(&format!("  {}  ", EMAIL), PASSWORD).await,
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
        ));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (h, _) = registered().await;

        let unknown = h.service.login("nobody@x.com", PASSWORD).await.unwrap_err();
        let wrong = h.service.login(EMAIL, "Password1234").await.unwrap_err();

        assert!(matches!(unknown, AppError::Auth(AuthError::InvalidCredentials)));
        assert!(matches!(wrong, AppError::Auth(AuthError::InvalidCredentials)));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn refresh_rotates_and_detects_reuse() {
        let (h, user) = registered().await;
        let rt1 = h.service.login(EMAIL, PASSWORD).await.unwrap().tokens.refresh_token;

        let second = h.service.refresh(&rt1).await.unwrap();
        let rt2 = second.refresh_token;
        assert_ne!(rt1, rt2);
        assert_ne!(decode_refresh(&h, &rt1).jti, decode_refresh(&h, &rt2).jti);
        assert_eq!(h.tokens.count_for_user(user.id), 1);

        assert!(matches!(
            h.service.refresh(&rt1).await,
            Err(AppError::Auth(AuthError::ReuseDetected))
        ));
        assert_eq!(h.tokens.count_for_user(user.id), 0);

        // The legitimate successor died with the mass revocation.
        assert!(matches!(
            h.service.refresh(&rt2).await,
            Err(AppError::Auth(AuthError::ReuseDetected))
        ));
    }

    #[tokio::test]
    async fn reuse_revokes_every_session_of_the_user_only() {
        let (h, user) = registered().await;
        let other = h.service.register("b@x.com", PASSWORD).await.unwrap();

        let laptop = h.service.login(EMAIL, PASSWORD).await.unwrap().tokens.refresh_token;
        let phone = h.service.login(EMAIL, PASSWORD).await.unwrap().tokens.refresh_token;
        h.service.login("b@x.com", PASSWORD).await.unwrap();

        h.service.refresh(&laptop).await.unwrap();
        assert!(h.service.refresh(&laptop).await.is_err());

        assert_eq!(h.tokens.count_for_user(user.id), 0);
        assert_eq!(h.tokens.count_for_user(other.id), 1);
        assert!(h.service.refresh(&phone).await.is_err());
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let (h, _) = registered().await;
        let access = h.service.login(EMAIL, PASSWORD).await.unwrap().tokens.access_token;

        assert!(matches!(
            h.service.refresh(&access).await,
            Err(AppError::Auth(AuthError::TokenInvalid))
        ));
    }

    #[tokio::test]
    async fn refresh_with_mismatched_digest_is_invalid_not_reuse() {
        let (h, user) = registered().await;
        let rt = h.service.login(EMAIL, PASSWORD).await.unwrap().tokens.refresh_token;
        let claims = decode_refresh(&h, &rt);

        // Replace the stored digest as if the record belonged to a different token.
        h.tokens.delete_by_jti(&claims.jti).await.unwrap();
        h.tokens
            .insert(NewRefreshToken {
                user_id: user.id,
                jti: claims.jti.clone(),
                token_hash: digest_for_storage("some other token"),
                expires_at: Utc::now() + chrono::Duration::days(1),
            })
            .await
            .unwrap();

        assert!(matches!(
            h.service.refresh(&rt).await,
            Err(AppError::Auth(AuthError::TokenInvalid))
        ));
        assert_eq!(h.tokens.count_for_user(user.id), 1);
    }

    #[tokio::test]
    async fn concurrent_redemptions_succeed_once() {
        let (h, _) = registered().await;
        let rt = h.service.login(EMAIL, PASSWORD).await.unwrap().tokens.refresh_token;

        let (a, b) = tokio::join!(h.service.refresh(&rt), h.service.refresh(&rt));

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[tokio::test]
    async fn logout_revokes_single_session_and_is_idempotent() {
        let (h, user) = registered().await;
        let identity = Identity {
            user_id: user.id,
            email: user.email.clone(),
        };
        let first = h.service.login(EMAIL, PASSWORD).await.unwrap().tokens.refresh_token;
        let second = h.service.login(EMAIL, PASSWORD).await.unwrap().tokens.refresh_token;

        h.service.logout(&identity, &first).await.unwrap();
        h.service.logout(&identity, &first).await.unwrap();

        assert_eq!(h.tokens.count_for_user(user.id), 1);
        assert!(h.service.refresh(&second).await.is_ok());
    }

    #[tokio::test]
    async fn logout_with_foreign_refresh_token_is_rejected() {
        let (h, _) = registered().await;
        h.service.register("b@x.com", PASSWORD).await.unwrap();
        let bobs = h.service.login("b@x.com", PASSWORD).await.unwrap();
        let alice = h.service.login(EMAIL, PASSWORD).await.unwrap().user;
        let identity = Identity {
            user_id: alice.id,
            email: alice.email,
        };

        assert!(matches!(
            h.service.logout(&identity, &bobs.tokens.refresh_token).await,
            Err(AppError::Auth(AuthError::TokenInvalid))
        ));
        assert_eq!(h.tokens.count_for_user(bobs.user.id), 1);
    }

    #[tokio::test]
    async fn logout_all_invalidates_every_refresh_token() {
        let (h, user) = registered().await;
        let first = h.service.login(EMAIL, PASSWORD).await.unwrap().tokens.refresh_token;
        let second = h.service.login(EMAIL, PASSWORD).await.unwrap().tokens.refresh_token;

        assert_eq!(h.service.logout_all(user.id).await.unwrap(), 2);

        for rt in [first, second] {
            assert!(matches!(
                h.service.refresh(&rt).await,
                Err(AppError::Auth(AuthError::ReuseDetected))
            ));
        }
    }

    #[tokio::test]
    async fn profile_of_missing_user_is_not_found() {
        let h = harness();

        assert!(matches!(
            h.service.profile(99).await,
            Err(AppError::Database(DatabaseError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn slow_store_calls_hit_the_deadline() {
        let h = harness();
        let result = h
            .service
            .with_deadline("sleep", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AppError>(())
            })
            .await;

        assert!(matches!(
            result,
            Err(AppError::Database(DatabaseError::Timeout(_)))
        ));
    }
}
