//! Named locks with a time-to-live.
//!
//! The relay holds one of these while it works through a batch so that two
//! relay instances never publish the same rows concurrently. A holder that
//! dies without releasing blocks others only until the TTL runs out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::LockError;

/// Proof of holding a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    key: String,
    token: Uuid,
}

impl LockToken {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            token: Uuid::new_v4(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Tries to take `key` for `ttl`. `None` means someone else holds it.
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError>;

    /// Releases the lock if `token` still holds it.
    async fn release(&self, token: &LockToken) -> Result<(), LockError>;
}

#[async_trait]
impl<L: LockProvider + ?Sized> LockProvider for Arc<L> {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        (**self).acquire(key, ttl).await
    }

    async fn release(&self, token: &LockToken) -> Result<(), LockError> {
        (**self).release(token).await
    }
}

/// Process-wide locks. Clones share the same lock table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockProvider {
    held: Arc<Mutex<HashMap<String, (Uuid, Instant)>>>,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` is held and not yet expired.
    pub async fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .await
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now())
    }
}

#[async_trait]
impl LockProvider for InMemoryLockProvider {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let mut held = self.held.lock().await;
        let now = Instant::now();
        if let Some((_, expires_at)) = held.get(key)
            && *expires_at > now
        {
            return Ok(None);
        }

        let token = LockToken::new(key);
        held.insert(key.to_owned(), (token.token, now + ttl));
        Ok(Some(token))
    }

    async fn release(&self, token: &LockToken) -> Result<(), LockError> {
        let mut held = self.held.lock().await;
        if held.get(&token.key).is_some_and(|(owner, _)| *owner == token.token) {
            held.remove(&token.key);
        }
        Ok(())
    }
}

/// Cluster-wide locks in the `outbox_locks` table.
///
/// Runs on the pool directly, outside any business transaction, so the lock
/// is visible to other instances as soon as it is taken.
#[derive(Debug, Clone)]
pub struct PostgresLockProvider {
    pool: PgPool,
}

impl PostgresLockProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockProvider for PostgresLockProvider {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let token = LockToken::new(key);
        let row = sqlx::query(
            r#"
            INSERT INTO outbox_locks (key, token, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE
                SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
                WHERE outbox_locks.expires_at <= NOW()
            RETURNING token
            "#,
        )
        .bind(key)
        .bind(token.token)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        // A row comes back only when the insert or the takeover happened.
        Ok(row.map(|_| token))
    }

    async fn release(&self, token: &LockToken) -> Result<(), LockError> {
        sqlx::query("DELETE FROM outbox_locks WHERE key = $1 AND token = $2")
            .bind(&token.key)
            .bind(token.token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "outbox_event_processor";

    #[tokio::test]
    async fn test_second_acquire_is_refused() {
        let locks = InMemoryLockProvider::new();
        let ttl = Duration::from_secs(60);

        let token = locks.acquire(KEY, ttl).await.unwrap().unwrap();
        assert!(locks.acquire(KEY, ttl).await.unwrap().is_none());
        assert!(locks.acquire("other", ttl).await.unwrap().is_some());

        locks.release(&token).await.unwrap();
        assert!(locks.acquire(KEY, ttl).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_expires_after_ttl() {
        let locks = InMemoryLockProvider::new();
        let stale = locks
            .acquire(KEY, Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!locks.is_held(KEY).await);

        let fresh = locks
            .acquire(KEY, Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        // The expired holder must not free the new holder's lock.
        locks.release(&stale).await.unwrap();
        assert!(locks.is_held(KEY).await);

        locks.release(&fresh).await.unwrap();
        assert!(!locks.is_held(KEY).await);
    }
}
