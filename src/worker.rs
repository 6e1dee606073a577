use std::fmt::Display;

use anyhow::{Error, Result, anyhow};
use futures_util::{Stream, StreamExt};
use lapin::message::Delivery;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    broker::DeliveryChannel,
    clients::rbmq::RabbitMqClient,
    consumer::{IncomingDelivery, NotificationConsumer},
};

/// A delivery pulled off the queue, detached from the broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedDelivery {
    pub delivery_tag: u64,
    pub data: Vec<u8>,
    pub redelivered: bool,
}

impl ReceivedDelivery {
    pub fn as_incoming(&self) -> IncomingDelivery<'_> {
        IncomingDelivery {
            delivery_tag: self.delivery_tag,
            payload: &self.data,
            redelivered: self.redelivered,
        }
    }
}

impl From<Delivery> for ReceivedDelivery {
    fn from(delivery: Delivery) -> Self {
        Self {
            delivery_tag: delivery.delivery_tag,
            data: delivery.data,
            redelivered: delivery.redelivered,
        }
    }
}

/// Pulls deliveries off the notification queue until shutdown is signalled.
///
/// Anything prefetched but not yet handled goes back to the queue when the
/// channel is closed.
pub async fn run(
    client: &RabbitMqClient,
    consumer: &NotificationConsumer,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let consumer_tag = format!("registration_notifier-{}", Uuid::new_v4());
    let deliveries = client.create_consumer(&consumer_tag).await?;

    info!(consumer_tag = %consumer_tag, "Notification worker started");

    consume(deliveries, client, consumer, shutdown).await
}

/// Settles deliveries from `deliveries` on `channel` one at a time.
///
/// A delivery that has been received is always settled before the shutdown
/// signal is honoured. Returns `Ok` on shutdown and `Err` when the stream
/// fails or ends, since a healthy broker never closes the consumer on its own.
pub async fn consume<S, D, E, C>(
    mut deliveries: S,
    channel: &C,
    consumer: &NotificationConsumer,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error>
where
    S: Stream<Item = Result<D, E>> + Unpin,
    D: Into<ReceivedDelivery>,
    E: Display,
    C: DeliveryChannel + ?Sized,
{
    if *shutdown.borrow() {
        info!("Shutdown already requested, notification worker not started");
        return Ok(());
    }

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Shutdown requested, stopping notification worker");
                    break;
                }
            }
            next = deliveries.next() => {
                match next {
                    Some(Ok(delivery)) => {
                        let delivery: ReceivedDelivery = delivery.into();
                        let disposition = consumer
                            .handle_delivery(channel, delivery.as_incoming())
                            .await;

                        debug!(
                            delivery_tag = delivery.delivery_tag,
                            disposition = %disposition,
                            "Delivery settled"
                        );
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Notification consumer failed");
                        return Err(anyhow!("Notification consumer failed: {}", e));
                    }
                    None => {
                        return Err(anyhow!("Notification consumer stream closed by broker"));
                    }
                }
            }
        }
    }

    info!("Notification worker stopped");

    Ok(())
}
