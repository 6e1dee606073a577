use anyhow::{Error, Result, anyhow};
use tracing::info;

use crate::{
    broker::{QueueFlags, TopologyChannel},
    models::topology::TopologyDescriptor,
};

/// Declares the notification exchange, queue, binding and dead-letter queue.
///
/// Every step is a broker-side idempotent declare, so both the publishing and
/// the consuming process call this on start-up. Any failure is fatal.
pub async fn ensure_topology<C>(channel: &C, topology: &TopologyDescriptor) -> Result<(), Error>
where
    C: TopologyChannel + ?Sized,
{
    topology.validate()?;

    let flags = QueueFlags {
        durable: topology.durable,
        exclusive: topology.exclusive,
        auto_delete: topology.auto_delete,
    };

    channel
        .declare_exchange(
            &topology.exchange_name,
            topology.exchange_kind,
            topology.durable,
        )
        .await
        .map_err(|e| anyhow!("Failed to declare exchange '{}': {}", topology.exchange_name, e))?;

    channel
        .declare_queue(&topology.queue_name, flags)
        .await
        .map_err(|e| anyhow!("Failed to declare queue '{}': {}", topology.queue_name, e))?;

    channel
        .bind_queue(
            &topology.queue_name,
            &topology.exchange_name,
            &topology.routing_key,
        )
        .await
        .map_err(|e| {
            anyhow!(
                "Failed to bind queue '{}' to exchange '{}': {}",
                topology.queue_name,
                topology.exchange_name,
                e
            )
        })?;

    channel
        .declare_queue(&topology.dead_letter_queue_name, flags)
        .await
        .map_err(|e| {
            anyhow!(
                "Failed to declare dead-letter queue '{}': {}",
                topology.dead_letter_queue_name,
                e
            )
        })?;

    info!(
        exchange = %topology.exchange_name,
        exchange_kind = topology.exchange_kind.as_str(),
        queue = %topology.queue_name,
        routing_key = %topology.routing_key,
        dead_letter_queue = %topology.dead_letter_queue_name,
        "Notification topology ensured"
    );

    Ok(())
}
