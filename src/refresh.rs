//! Refresh token storage contract.
//!
//! One live refresh token per subject. A new login overwrites the record,
//! a reissue swaps it with a compare-and-swap so a refresh token can be
//! exchanged at most once.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::jwt::{Clock, SystemClock};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RefreshStore: Send + Sync {
    /// Unconditional upsert, last write wins.
    async fn put(&self, subject: &str, token: &str) -> Result<(), StoreError>;

    /// Current refresh token for the subject. `None` means no active session.
    async fn get(&self, subject: &str) -> Result<Option<String>, StoreError>;

    /// Replace the stored token only if it still equals `expected`.
    ///
    /// This default reads, compares and writes in three steps, so two
    /// concurrent callers can both succeed with the same `expected` token.
    /// Backends with a conditional update override it and `atomic_replace`.
    async fn replace(&self, subject: &str, expected: &str, new: &str) -> Result<bool, StoreError> {
        match self.get(subject).await? {
            Some(current) if current == expected => {
                self.put(subject, new).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Whether `replace` is a true compare-and-swap.
    fn atomic_replace(&self) -> bool {
        false
    }

    /// Delete the subject's record (logout). Returns whether one existed.
    async fn remove(&self, subject: &str) -> Result<bool, StoreError>;

    /// Delete records not written for at least `max_age`.
    async fn purge_stale(&self, max_age: Duration) -> Result<u64, StoreError>;
}

struct MemoryRecord {
    token: String,
    updated_at: u64,
}

/// In-process refresh store. Sessions do not survive a restart.
pub struct MemoryRefreshStore {
    records: Mutex<HashMap<String, MemoryRecord>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryRefreshStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp record writes with `clock` instead of the wall clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryRecord>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("refresh store lock poisoned".into()))
    }
}

#[async_trait]
impl RefreshStore for MemoryRefreshStore {
    async fn put(&self, subject: &str, token: &str) -> Result<(), StoreError> {
        self.lock()?.insert(
            subject.to_string(),
            MemoryRecord {
                token: token.to_string(),
                updated_at: self.clock.now(),
            },
        );
        Ok(())
    }

    async fn get(&self, subject: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(subject).map(|r| r.token.clone()))
    }

    async fn replace(&self, subject: &str, expected: &str, new: &str) -> Result<bool, StoreError> {
        let mut records = self.lock()?;
        match records.get_mut(subject) {
            Some(record) if record.token == expected => {
                record.token = new.to_string();
                record.updated_at = self.clock.now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn atomic_replace(&self) -> bool {
        true
    }

    async fn remove(&self, subject: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.remove(subject).is_some())
    }

    async fn purge_stale(&self, max_age: Duration) -> Result<u64, StoreError> {
        let cutoff = self.clock.now().saturating_sub(max_age.as_secs());
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|_, r| r.updated_at > cutoff);
        Ok((before - records.len()) as u64)
    }
}
