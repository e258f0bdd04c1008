/// Persistence for users and refresh-token records
///
/// The relational store is the only place durable state lives and the only
/// serialization point between concurrent requests. Implementations must make
/// `rotate` and `delete_all_for_user` atomic.

mod memory;
mod postgres;

pub use memory::{MemoryTokenStore, MemoryUserStore};
pub use postgres::{PgTokenStore, PgUserStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;

/// A registered account. The password hash never leaves the service.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// One live refresh token, stored by digest and indexed by `jti`
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub jti: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`RefreshTokenRecord`]
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: i64,
    pub jti: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with a unique-constraint violation when the email is taken.
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError>;

    async fn find_by_jti(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Returns whether a record was deleted. Deleting a missing jti is not an error.
    async fn delete_by_jti(&self, jti: &str) -> Result<bool, AppError>;

    /// Atomically delete every record owned by `user_id`, returning the count.
    async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, AppError>;

    /// Delete `redeemed_jti` and insert `replacement` as one unit.
    ///
    /// `Ok(None)` means the redeemed record was already gone, so a concurrent
    /// redemption won and nothing was inserted.
    async fn rotate(
        &self,
        redeemed_jti: &str,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;
}
