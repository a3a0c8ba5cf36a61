//! SQLite-backed refresh token storage.
//!
//! One row per subject. Rotation is a single conditional `UPDATE`, so two
//! concurrent reissues with the same prior token cannot both succeed.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::time::Duration;

use crate::refresh::{RefreshStore, StoreError};

const NOW: &str = "CAST(strftime('%s', 'now') AS INTEGER)";

/// Store for the live refresh token of each subject.
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of live sessions.
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

#[async_trait]
impl RefreshStore for TokenStore {
    async fn put(&self, subject: &str, token: &str) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO refresh_tokens (subject, value, updated_at) VALUES (?, ?, {NOW})
             ON CONFLICT(subject) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"
        ))
        .bind(subject)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, subject: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM refresh_tokens WHERE subject = ?")
                .bind(subject)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    async fn replace(&self, subject: &str, expected: &str, new: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE refresh_tokens SET value = ?, updated_at = {NOW} WHERE subject = ? AND value = ?"
        ))
        .bind(new)
        .bind(subject)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    fn atomic_replace(&self) -> bool {
        true
    }

    async fn remove(&self, subject: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE subject = ?")
            .bind(subject)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_stale(&self, max_age: Duration) -> Result<u64, StoreError> {
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        let result = sqlx::query(&format!(
            "DELETE FROM refresh_tokens WHERE updated_at <= {NOW} - ?"
        ))
        .bind(max_age)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
