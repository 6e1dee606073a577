use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    broker::{MessagePublisher, PublishProperties},
    models::{message::NotificationEnvelope, registrant::Registrant, topology::TopologyDescriptor},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { message_id: Uuid },
    /// The user has no email address; nothing was sent to the broker.
    Skipped,
    /// The broker could not take the message. Already logged.
    Failed { reason: String },
}

/// Hands "user registered" facts to the broker after the user record is committed.
///
/// Publishing is best effort: registration must succeed whether or not the
/// broker is reachable, so [`NotificationPublisher::publish`] never returns an
/// error. There is no outbox, so a notification that fails to publish is lost.
pub struct NotificationPublisher {
    broker: Arc<dyn MessagePublisher>,
    exchange_name: String,
    routing_key: String,
}

impl NotificationPublisher {
    pub fn new(broker: Arc<dyn MessagePublisher>, topology: &TopologyDescriptor) -> Self {
        Self {
            broker,
            exchange_name: topology.exchange_name.clone(),
            routing_key: topology.routing_key.clone(),
        }
    }

    pub async fn publish<R>(&self, registrant: &R) -> PublishOutcome
    where
        R: Registrant + ?Sized,
    {
        if registrant.email().trim().is_empty() {
            info!(
                username = %registrant.display_name(),
                "Registrant has no email address, skipping welcome notification"
            );
            return PublishOutcome::Skipped;
        }

        let envelope = NotificationEnvelope::for_registrant(registrant);
        let message_id = envelope.message_id.unwrap_or_else(Uuid::new_v4);

        let payload = match envelope.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    recipient = %envelope.recipient_email,
                    error = %e,
                    "Failed to serialize welcome notification"
                );
                return PublishOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let properties = PublishProperties {
            message_id: Some(message_id.to_string()),
            content_type: Some("application/json".to_string()),
            persistent: true,
            mandatory: true,
        };

        match self
            .broker
            .publish(&self.exchange_name, &self.routing_key, &payload, properties)
            .await
        {
            Ok(()) => {
                info!(
                    message_id = %message_id,
                    recipient = %envelope.recipient_email,
                    exchange = %self.exchange_name,
                    routing_key = %self.routing_key,
                    "Welcome notification published"
                );
                PublishOutcome::Published { message_id }
            }
            Err(e) => {
                warn!(
                    message_id = %message_id,
                    recipient = %envelope.recipient_email,
                    exchange = %self.exchange_name,
                    error = %e,
                    "Failed to publish welcome notification, registration unaffected"
                );
                PublishOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
