use async_trait::async_trait;
use sqlx::PgPool;

use super::{NewRefreshToken, RefreshTokenRecord, TokenStore, User, UserStore};
use crate::error::{AppError, DatabaseError};

/// `users` table access
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                DatabaseError::UniqueConstraintViolation("users.email".to_string()).into()
            }
            other => other,
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

/// `refresh_tokens` table access
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_REFRESH_TOKEN: &str = r#"
    INSERT INTO refresh_tokens (user_id, jti, token_hash, expires_at)
    VALUES ($1, $2, $3, $4)
    RETURNING id, user_id, jti, token_hash, expires_at, created_at
"#;

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(INSERT_REFRESH_TOKEN)
            .bind(token.user_id)
            .bind(&token.jti)
            .bind(&token.token_hash)
            .bind(token.expires_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    async fn find_by_jti(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, user_id, jti, token_hash, expires_at, created_at
            FROM refresh_tokens
            WHERE jti = $1
            "#,
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_by_jti(&self, jti: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE jti = $1")
            .bind(jti)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn rotate(
        &self,
        redeemed_jti: &str,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let mut transaction = self.pool.begin().await?;

        // Row lock on the redeemed jti: a concurrent rotate blocks here and
        // then sees zero rows.
        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE jti = $1")
            .bind(redeemed_jti)
            .execute(&mut transaction)
            .await?;

        if deleted.rows_affected() == 0 {
            transaction.rollback().await?;
            return Ok(None);
        }

        let record = sqlx::query_as::<_, RefreshTokenRecord>(INSERT_REFRESH_TOKEN)
            .bind(replacement.user_id)
            .bind(&replacement.jti)
            .bind(&replacement.token_hash)
            .bind(replacement.expires_at)
            .fetch_one(&mut transaction)
            .await?;

        transaction.commit().await?;
        Ok(Some(record))
    }
}
