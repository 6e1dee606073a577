use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::{
    broker::DeliveryChannel,
    clients::ledger::DeliveryLedger,
    mailer::Mailer,
    models::{
        message::{DlqMessage, NotificationEnvelope},
        status::{Disposition, IdempotencyStatus},
    },
};

/// One message handed over by the broker.
#[derive(Debug, Clone, Copy)]
pub struct IncomingDelivery<'a> {
    pub delivery_tag: u64,
    pub payload: &'a [u8],
    pub redelivered: bool,
}

/// Turns deliveries from the notification queue into welcome emails.
///
/// Every delivery is settled exactly once, and only after the outcome of the
/// send attempt is known:
///
/// - malformed payload: ack and drop
/// - already sent (redelivery after a lost ack): ack without sending
/// - sent: ack
/// - transient failure below the attempt limit: nack with requeue
/// - permanent failure or attempt limit reached: dead-letter, then ack
pub struct NotificationConsumer {
    mailer: Arc<dyn Mailer>,
    ledger: Arc<dyn DeliveryLedger>,
    max_delivery_attempts: u32,
}

impl NotificationConsumer {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        ledger: Arc<dyn DeliveryLedger>,
        max_delivery_attempts: u32,
    ) -> Self {
        Self {
            mailer,
            ledger,
            max_delivery_attempts: max_delivery_attempts.max(1),
        }
    }

    pub async fn handle_delivery<C>(&self, channel: &C, delivery: IncomingDelivery<'_>) -> Disposition
    where
        C: DeliveryChannel + ?Sized,
    {
        let tag = delivery.delivery_tag;

        let envelope = match NotificationEnvelope::from_payload(delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    delivery_tag = tag,
                    redelivered = delivery.redelivered,
                    error = %e,
                    "Discarding malformed notification message"
                );
                acknowledge(channel, tag).await;
                return Disposition::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        let key = envelope.idempotency_key();

        info!(
            delivery_tag = tag,
            idempotency_key = %key,
            recipient = %envelope.recipient_email,
            redelivered = delivery.redelivered,
            "Processing registration notification"
        );

        match self.ledger.check_idempotency(&key).await {
            Ok(IdempotencyStatus::Sent) => {
                info!(
                    idempotency_key = %key,
                    recipient = %envelope.recipient_email,
                    "Notification already sent, acknowledging duplicate"
                );
                acknowledge(channel, tag).await;
                return Disposition::Duplicate;
            }
            Ok(status) => debug!(idempotency_key = %key, status = status.as_str(), "Idempotency check passed"),
            Err(e) => warn!(
                idempotency_key = %key,
                ledger = self.ledger.name(),
                error = %e,
                "Idempotency check failed, sending anyway"
            ),
        }

        let attempt = match self.ledger.record_attempt(&key).await {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!(
                    idempotency_key = %key,
                    error = %e,
                    "Failed to record delivery attempt, attempt limit not enforced for this delivery"
                );
                1
            }
        };

        if let Err(e) = self.ledger.mark_as_processing(&key).await {
            warn!(idempotency_key = %key, error = %e, "Failed to mark notification as processing");
        }

        let registered_at = envelope.registered_at.unwrap_or_else(Utc::now);

        let result = self
            .mailer
            .send(
                &envelope.recipient_email,
                &envelope.recipient_name,
                envelope.recipient_phone.as_deref(),
                registered_at,
            )
            .await;

        match result {
            Ok(()) => {
                if let Err(e) = self.ledger.mark_as_sent(&key).await {
                    warn!(idempotency_key = %key, error = %e, "Failed to mark notification as sent");
                }
                if let Err(e) = self.ledger.clear_attempts(&key).await {
                    debug!(idempotency_key = %key, error = %e, "Failed to clear attempt counter");
                }

                info!(
                    idempotency_key = %key,
                    recipient = %envelope.recipient_email,
                    attempt,
                    mailer = self.mailer.name(),
                    "Registration notification delivered"
                );

                acknowledge(channel, tag).await;
                Disposition::Acked
            }
            Err(e) => {
                if let Err(ledger_err) = self.ledger.mark_as_failed(&key).await {
                    warn!(idempotency_key = %key, error = %ledger_err, "Failed to mark notification as failed");
                }

                if e.is_transient() && attempt < self.max_delivery_attempts {
                    warn!(
                        idempotency_key = %key,
                        recipient = %envelope.recipient_email,
                        attempt,
                        max_attempts = self.max_delivery_attempts,
                        error = %e,
                        "Notification delivery failed, requeueing"
                    );
                    reject(channel, tag).await;
                    return Disposition::Requeued { attempt };
                }

                let reason = e.to_string();
                let dlq_message = DlqMessage::new(envelope.clone(), reason.clone(), attempt);

                match channel.publish_to_dlq(&dlq_message).await {
                    Ok(()) => {
                        error!(
                            idempotency_key = %key,
                            recipient = %envelope.recipient_email,
                            attempt,
                            error = %e,
                            "Notification delivery abandoned, moved to dead-letter queue"
                        );
                        if let Err(e) = self.ledger.clear_attempts(&key).await {
                            debug!(idempotency_key = %key, error = %e, "Failed to clear attempt counter");
                        }
                        acknowledge(channel, tag).await;
                        Disposition::DeadLettered { attempt, reason }
                    }
                    Err(dlq_err) => {
                        error!(
                            idempotency_key = %key,
                            error = %dlq_err,
                            "Failed to dead-letter notification, requeueing instead"
                        );
                        reject(channel, tag).await;
                        Disposition::Requeued { attempt }
                    }
                }
            }
        }
    }
}

async fn acknowledge<C: DeliveryChannel + ?Sized>(channel: &C, delivery_tag: u64) {
    if let Err(e) = channel.acknowledge(delivery_tag).await {
        error!(delivery_tag, error = %e, "Failed to acknowledge delivery");
    }
}

async fn reject<C: DeliveryChannel + ?Sized>(channel: &C, delivery_tag: u64) {
    if let Err(e) = channel.nack(delivery_tag, true).await {
        error!(delivery_tag, error = %e, "Failed to nack delivery");
    }
}
