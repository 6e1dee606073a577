use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{info, warn};

use crate::{
    clients::ledger::DeliveryLedger,
    models::{retry::RetryConfig, status::IdempotencyStatus},
    utils::retry_with_backoff,
};

pub struct RedisClient {
    connection: MultiplexedConnection,
    idempotency_ttl_seconds: u64,
    retry_config: RetryConfig,
}

impl RedisClient {
    pub async fn connect(
        redis_url: &str,
        idempotency_ttl_seconds: u64,
        retry_config: RetryConfig,
    ) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client =
            Client::open(redis_url).map_err(|e| anyhow!("Failed to create redis client: {}", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Redis connection established");

        Ok(Self {
            connection,
            idempotency_ttl_seconds,
            retry_config,
        })
    }

    fn idempotency_key(idempotency_key: &str) -> String {
        format!("notification:idempotency:{}", idempotency_key)
    }

    fn attempts_key(idempotency_key: &str) -> String {
        format!("notification:attempts:{}", idempotency_key)
    }

    async fn set_status(&self, idempotency_key: &str, status: IdempotencyStatus) -> Result<(), Error> {
        let key = Self::idempotency_key(idempotency_key);
        let mut conn = self.connection.clone();

        conn.set_ex::<_, _, ()>(&key, status.as_str(), self.idempotency_ttl_seconds)
            .await
            .map_err(|e| anyhow!("Failed to mark value as {}: {}", status.as_str(), e))?;

        Ok(())
    }
}

#[async_trait]
impl DeliveryLedger for RedisClient {
    async fn check_idempotency(&self, idempotency_key: &str) -> Result<IdempotencyStatus, Error> {
        let key = Self::idempotency_key(idempotency_key);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| anyhow!("Failed to get cached value: {}", e))?;

        let status = IdempotencyStatus::from_str_value(value.as_deref());

        if let Some(other) = value.as_deref()
            && status == IdempotencyStatus::NotFound
        {
            warn!(key = %key, value = other, "Unknown idempotency status");
        }

        Ok(status)
    }

    async fn mark_as_processing(&self, idempotency_key: &str) -> Result<(), Error> {
        self.set_status(idempotency_key, IdempotencyStatus::Processing)
            .await
    }

    async fn mark_as_sent(&self, idempotency_key: &str) -> Result<(), Error> {
        let key = Self::idempotency_key(idempotency_key);

        // A lost "sent" marker means a duplicate email on redelivery, so try harder here.
        retry_with_backoff(&self.retry_config, || {
            let key_clone = key.clone();
            let mut conn = self.connection.clone();
            let ttl = self.idempotency_ttl_seconds;

            async move {
                conn.set_ex::<_, _, ()>(&key_clone, IdempotencyStatus::Sent.as_str(), ttl)
                    .await
                    .map_err(|e| e.to_string())
            }
        })
        .await
        .map_err(|e| anyhow!("mark_as_sent failed: {}", e))?;

        Ok(())
    }

    async fn mark_as_failed(&self, idempotency_key: &str) -> Result<(), Error> {
        self.set_status(idempotency_key, IdempotencyStatus::Failed)
            .await
    }

    async fn record_attempt(&self, idempotency_key: &str) -> Result<u32, Error> {
        let key = Self::attempts_key(idempotency_key);
        let mut conn = self.connection.clone();

        let attempts: u32 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| anyhow!("Failed to increment attempt counter: {}", e))?;

        conn.expire::<_, ()>(&key, self.idempotency_ttl_seconds as i64)
            .await
            .map_err(|e| anyhow!("Failed to set attempt counter expiry: {}", e))?;

        Ok(attempts)
    }

    async fn clear_attempts(&self, idempotency_key: &str) -> Result<(), Error> {
        let key = Self::attempts_key(idempotency_key);
        let mut conn = self.connection.clone();

        conn.del::<_, ()>(&key)
            .await
            .map_err(|e| anyhow!("Failed to clear attempt counter: {}", e))?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.connection.clone();

        conn.ping::<String>()
            .await
            .map_err(|e| anyhow!("Redis ping failed: {}", e))?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
