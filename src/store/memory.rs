/// In-process stores with the same contract as the Postgres ones.
///
/// Each operation holds one mutex for its whole duration, which gives the
/// same atomicity the database provides for `rotate` and
/// `delete_all_for_user`. Used by tests and local runs without Postgres.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{NewRefreshToken, RefreshTokenRecord, TokenStore, User, UserStore};
use crate::error::{AppError, DatabaseError};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("in-memory store lock poisoned".to_string()))
}

#[derive(Default)]
struct UserTable {
    next_id: i64,
    by_id: HashMap<i64, User>,
    id_by_email: HashMap<String, i64>,
}

#[derive(Clone, Default)]
pub struct MemoryUserStore {
    inner: Arc<Mutex<UserTable>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, AppError> {
        let mut table = lock(&self.inner)?;

        if table.id_by_email.contains_key(email) {
            return Err(DatabaseError::UniqueConstraintViolation("users.email".to_string()).into());
        }

        table.next_id += 1;
        let user = User {
            id: table.next_id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        table.id_by_email.insert(user.email.clone(), user.id);
        table.by_id.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let table = lock(&self.inner)?;
        Ok(table
            .id_by_email
            .get(email)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(lock(&self.inner)?.by_id.get(&id).cloned())
    }
}

#[derive(Default)]
struct TokenTable {
    next_id: i64,
    by_jti: HashMap<String, RefreshTokenRecord>,
}

impl TokenTable {
    fn insert(&mut self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        if self.by_jti.contains_key(&token.jti) {
            return Err(
                DatabaseError::UniqueConstraintViolation("refresh_tokens.jti".to_string()).into(),
            );
        }

        self.next_id += 1;
        let record = RefreshTokenRecord {
            id: self.next_id,
            user_id: token.user_id,
            jti: token.jti,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            created_at: Utc::now(),
        };
        self.by_jti.insert(record.jti.clone(), record.clone());

        Ok(record)
    }
}

#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    inner: Arc<Mutex<TokenTable>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live records owned by `user_id`
    pub fn count_for_user(&self, user_id: i64) -> usize {
        lock(&self.inner)
            .map(|table| table.by_jti.values().filter(|r| r.user_id == user_id).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        lock(&self.inner)?.insert(token)
    }

    async fn find_by_jti(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(lock(&self.inner)?.by_jti.get(jti).cloned())
    }

    async fn delete_by_jti(&self, jti: &str) -> Result<bool, AppError> {
        Ok(lock(&self.inner)?.by_jti.remove(jti).is_some())
    }

    async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, AppError> {
        let mut table = lock(&self.inner)?;
        let before = table.by_jti.len();
        table.by_jti.retain(|_, record| record.user_id != user_id);

        Ok((before - table.by_jti.len()) as u64)
    }

    async fn rotate(
        &self,
        redeemed_jti: &str,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let mut table = lock(&self.inner)?;

        if table.by_jti.remove(redeemed_jti).is_none() {
            return Ok(None);
        }

        table.insert(replacement).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_token(user_id: i64, jti: &str) -> NewRefreshToken {
        NewRefreshToken {
            user_id,
            jti: jti.to_string(),
            token_hash: format!("hash-{}", jti),
            expires_at: Utc::now() + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let store = MemoryUserStore::new();
        let user = store.create("a@x.com", "hash").await.unwrap();

        assert_eq!(store.find_by_email("a@x.com").await.unwrap(), Some(user.clone()));
        assert_eq!(store.find_by_id(user.id).await.unwrap(), Some(user));
        assert_eq!(store.find_by_email("A@x.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store = MemoryUserStore::new();
        store.create("a@x.com", "hash").await.unwrap();

        assert!(matches!(
            store.create("a@x.com", "other").await,
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
        ));
    }

    #[tokio::test]
    async fn test_user_ids_are_unique() {
        let store = MemoryUserStore::new();
        let first = store.create("a@x.com", "hash").await.unwrap();
        let second = store.create("b@x.com", "hash").await.unwrap();

        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_delete_by_jti_is_idempotent() {
        let store = MemoryTokenStore::new();
        store.insert(new_token(1, "j1")).await.unwrap();

        assert!(store.delete_by_jti("j1").await.unwrap());
        assert!(!store.delete_by_jti("j1").await.unwrap());
        assert_eq!(store.find_by_jti("j1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_all_for_user_only_touches_that_user() {
        let store = MemoryTokenStore::new();
        store.insert(new_token(1, "a")).await.unwrap();
        store.insert(new_token(1, "b")).await.unwrap();
        store.insert(new_token(2, "c")).await.unwrap();

        assert_eq!(store.delete_all_for_user(1).await.unwrap(), 2);
        assert_eq!(store.count_for_user(1), 0);
        assert_eq!(store.count_for_user(2), 1);
    }

    #[tokio::test]
    async fn test_rotate_replaces_record_once() {
        let store = MemoryTokenStore::new();
        store.insert(new_token(1, "old")).await.unwrap();

        let rotated = store.rotate("old", new_token(1, "new")).await.unwrap();
        assert_eq!(rotated.map(|r| r.jti), Some("new".to_string()));

        assert_eq!(store.rotate("old", new_token(1, "newer")).await.unwrap(), None);
        assert_eq!(store.find_by_jti("newer").await.unwrap(), None);
        assert_eq!(store.count_for_user(1), 1);
    }

    #[tokio::test]
    async fn test_duplicate_jti_is_rejected() {
        let store = MemoryTokenStore::new();
        store.insert(new_token(1, "same")).await.unwrap();

        assert!(store.insert(new_token(2, "same")).await.is_err());
    }
}
