use anyhow::{Error, Result, anyhow};

/// Routing key shared by every publisher and consumer of registration notifications.
///
/// Configuration may restate it but never change it; see [`TopologyDescriptor::validate`].
pub const NOTIFICATION_ROUTING_KEY: &str = "attendee_email";

pub const DEFAULT_EXCHANGE_NAME: &str = "attendee_email_exchange";
pub const DEFAULT_QUEUE_NAME: &str = "attendee_email_queue";
pub const DEFAULT_DEAD_LETTER_QUEUE_NAME: &str = "attendee_email_queue.dead_letter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
        }
    }
}

/// Static description of the exchange, queue and binding the pipeline relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyDescriptor {
    pub exchange_name: String,
    pub exchange_kind: ExchangeKind,
    pub queue_name: String,
    pub routing_key: String,
    pub dead_letter_queue_name: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
}

impl TopologyDescriptor {
    pub fn new(
        exchange_name: impl Into<String>,
        queue_name: impl Into<String>,
        routing_key: impl Into<String>,
        dead_letter_queue_name: impl Into<String>,
    ) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            exchange_kind: ExchangeKind::Direct,
            queue_name: queue_name.into(),
            routing_key: routing_key.into(),
            dead_letter_queue_name: dead_letter_queue_name.into(),
            durable: true,
            auto_delete: false,
            exclusive: false,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        for (field, value) in [
            ("exchange name", &self.exchange_name),
            ("queue name", &self.queue_name),
            ("routing key", &self.routing_key),
            ("dead-letter queue name", &self.dead_letter_queue_name),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("Topology {} cannot be empty", field));
            }
        }

        if self.routing_key != NOTIFICATION_ROUTING_KEY {
            return Err(anyhow!(
                "Configured routing key '{}' disagrees with the shared key '{}'",
                self.routing_key,
                NOTIFICATION_ROUTING_KEY
            ));
        }

        if self.queue_name == self.dead_letter_queue_name {
            return Err(anyhow!(
                "Dead-letter queue must differ from the work queue '{}'",
                self.queue_name
            ));
        }

        if !self.durable || self.auto_delete || self.exclusive {
            return Err(anyhow!(
                "Notification queue must be durable, non-exclusive and not auto-deleted"
            ));
        }

        Ok(())
    }

    /// Fails when two processes would declare or target different infrastructure.
    pub fn ensure_compatible(&self, other: &TopologyDescriptor) -> Result<(), Error> {
        if self == other {
            return Ok(());
        }

        let mut mismatches = Vec::new();

        if self.exchange_name != other.exchange_name {
            mismatches.push(format!(
                "exchange '{}' vs '{}'",
                self.exchange_name, other.exchange_name
            ));
        }
        if self.queue_name != other.queue_name {
            mismatches.push(format!("queue '{}' vs '{}'", self.queue_name, other.queue_name));
        }
        if self.routing_key != other.routing_key {
            mismatches.push(format!(
                "routing key '{}' vs '{}'",
                self.routing_key, other.routing_key
            ));
        }
        if self.dead_letter_queue_name != other.dead_letter_queue_name {
            mismatches.push(format!(
                "dead-letter queue '{}' vs '{}'",
                self.dead_letter_queue_name, other.dead_letter_queue_name
            ));
        }
        if self.exchange_kind != other.exchange_kind
            || self.durable != other.durable
            || self.auto_delete != other.auto_delete
            || self.exclusive != other.exclusive
        {
            mismatches.push("declaration flags".to_string());
        }

        Err(anyhow!("Topology mismatch: {}", mismatches.join(", ")))
    }
}

impl Default for TopologyDescriptor {
    fn default() -> Self {
        Self::new(
            DEFAULT_EXCHANGE_NAME,
            DEFAULT_QUEUE_NAME,
            NOTIFICATION_ROUTING_KEY,
            DEFAULT_DEAD_LETTER_QUEUE_NAME,
        )
    }
}
