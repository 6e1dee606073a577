//! The delivery collaborator: whatever actually transmits the welcome email.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure reported by a [`Mailer`].
///
/// The consumer requeues transient failures and dead-letters permanent ones.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network, authentication or rate-limit trouble; worth another attempt.
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// The message can never be delivered as-is (bad address, rejected recipient).
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn transient(message: impl Into<String>) -> Self {
        DeliveryError::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        DeliveryError::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        recipient_email: &str,
        recipient_name: &str,
        recipient_phone: Option<&str>,
        registered_at: DateTime<Utc>,
    ) -> Result<(), DeliveryError>;

    fn name(&self) -> &'static str;

    async fn health_check(&self) -> Result<bool, DeliveryError> {
        Ok(true)
    }
}
