//! Narrow traits over the broker operations the pipeline performs.
//!
//! [`crate::clients::rbmq::RabbitMqClient`] implements all of them on top of a
//! single lapin channel; tests substitute recording or in-memory doubles.

use anyhow::{Error, Result};
use async_trait::async_trait;

use crate::models::{message::DlqMessage, topology::ExchangeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFlags {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

/// Idempotent declare operations used at start-up.
#[async_trait]
pub trait TopologyChannel: Send + Sync {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), Error>;

    async fn declare_queue(&self, name: &str, flags: QueueFlags) -> Result<(), Error>;

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str)
    -> Result<(), Error>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishProperties {
    pub message_id: Option<String>,
    pub content_type: Option<String>,
    pub persistent: bool,
    /// Ask the broker to return the message if no queue is bound for the key.
    pub mandatory: bool,
}

#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Resolves once the broker has confirmed (or refused) the message.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: PublishProperties,
    ) -> Result<(), Error>;
}

/// Settlement operations for deliveries taken from the notification queue.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error>;

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error>;

    async fn publish_to_dlq(&self, message: &DlqMessage) -> Result<(), Error>;
}
