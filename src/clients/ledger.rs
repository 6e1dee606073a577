use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use anyhow::{Error, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::status::IdempotencyStatus;

/// Per-envelope delivery bookkeeping that survives redelivery.
///
/// Records whether a notification was already sent and how many delivery
/// attempts it has consumed, keyed by the envelope's idempotency key.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    async fn check_idempotency(&self, idempotency_key: &str) -> Result<IdempotencyStatus, Error>;

    async fn mark_as_processing(&self, idempotency_key: &str) -> Result<(), Error>;

    async fn mark_as_sent(&self, idempotency_key: &str) -> Result<(), Error>;

    async fn mark_as_failed(&self, idempotency_key: &str) -> Result<(), Error>;

    /// Increments and returns the attempt counter (first call returns 1).
    async fn record_attempt(&self, idempotency_key: &str) -> Result<u32, Error>;

    async fn clear_attempts(&self, idempotency_key: &str) -> Result<(), Error>;

    async fn ping(&self) -> Result<(), Error>;

    fn name(&self) -> &'static str;
}

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// Process-local ledger for single-instance deployments without Redis.
///
/// Duplicate suppression only covers redeliveries seen by this process.
pub struct MemoryLedger {
    ttl: Duration,
    statuses: Mutex<HashMap<String, Entry<IdempotencyStatus>>>,
    attempts: Mutex<HashMap<String, Entry<u32>>>,
}

impl MemoryLedger {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_seconds),
            statuses: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    async fn set_status(&self, idempotency_key: &str, status: IdempotencyStatus) {
        let mut statuses = self.statuses.lock().await;
        let now = Instant::now();
        statuses.retain(|_, entry| entry.expires_at > now);
        statuses.insert(
            idempotency_key.to_string(),
            Entry {
                value: status,
                expires_at: now + self.ttl,
            },
        );
    }
}

#[async_trait]
impl DeliveryLedger for MemoryLedger {
    async fn check_idempotency(&self, idempotency_key: &str) -> Result<IdempotencyStatus, Error> {
        let statuses = self.statuses.lock().await;

        Ok(statuses
            .get(idempotency_key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value)
            .unwrap_or(IdempotencyStatus::NotFound))
    }

    async fn mark_as_processing(&self, idempotency_key: &str) -> Result<(), Error> {
        self.set_status(idempotency_key, IdempotencyStatus::Processing)
            .await;
        Ok(())
    }

    async fn mark_as_sent(&self, idempotency_key: &str) -> Result<(), Error> {
        self.set_status(idempotency_key, IdempotencyStatus::Sent).await;
        Ok(())
    }

    async fn mark_as_failed(&self, idempotency_key: &str) -> Result<(), Error> {
        self.set_status(idempotency_key, IdempotencyStatus::Failed)
            .await;
        Ok(())
    }

    async fn record_attempt(&self, idempotency_key: &str) -> Result<u32, Error> {
        let mut attempts = self.attempts.lock().await;
        let now = Instant::now();
        attempts.retain(|_, entry| entry.expires_at > now);

        let entry = attempts
            .entry(idempotency_key.to_string())
            .or_insert(Entry {
                value: 0,
                expires_at: now + self.ttl,
            });

        entry.value += 1;
        entry.expires_at = now + self.ttl;

        Ok(entry.value)
    }

    async fn clear_attempts(&self, idempotency_key: &str) -> Result<(), Error> {
        self.attempts.lock().await.remove(idempotency_key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
