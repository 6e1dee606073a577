use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    uri::{AMQPAuthority, AMQPUri, AMQPUserInfo},
};
use tracing::{debug, info, warn};

use crate::{
    broker::{DeliveryChannel, MessagePublisher, PublishProperties, QueueFlags, TopologyChannel},
    config::BrokerConfig,
    models::{message::DlqMessage, topology::ExchangeKind},
};

const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Owns the process's single broker connection and channel.
///
/// Created once at start-up, shared behind an `Arc`, and closed on shutdown.
pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
    queue_name: String,
    dead_letter_queue_name: String,
}

impl RabbitMqClient {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, Error> {
        info!(
            host = %config.rabbitmq_host,
            port = config.rabbitmq_port,
            vhost = %config.rabbitmq_vhost,
            "Connecting to RabbitMQ"
        );

        let connection = Connection::connect_uri(amqp_uri(config), ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        info!("RabbitMQ connection established");

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))?;

        debug!(
            prefetch_count = config.prefetch_count,
            "RabbitMQ channel created with publisher confirms"
        );

        Ok(Self {
            connection,
            channel,
            queue_name: config.queue_name.clone(),
            dead_letter_queue_name: config.dead_letter_queue_name.clone(),
        })
    }

    pub async fn create_consumer(&self, consumer_tag: &str) -> Result<Consumer, Error> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))?;

        info!(queue = %self.queue_name, consumer_tag, "Consumer created for queue");

        Ok(consumer)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    /// Closes the channel, returning any unacknowledged deliveries to the queue.
    pub async fn close(&self) -> Result<(), Error> {
        if self.channel.status().connected() {
            self.channel
                .close(200, "Shutting down")
                .await
                .map_err(|e| anyhow!("Failed to close RabbitMQ channel: {}", e))?;
        }

        if self.connection.status().connected() {
            self.connection
                .close(200, "Shutting down")
                .await
                .map_err(|e| anyhow!("Failed to close RabbitMQ connection: {}", e))?;
        }

        info!("RabbitMQ connection closed");

        Ok(())
    }
}

fn amqp_uri(config: &BrokerConfig) -> AMQPUri {
    AMQPUri {
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: config.rabbitmq_username.clone(),
                password: config.rabbitmq_password.clone(),
            },
            host: config.rabbitmq_host.clone(),
            port: config.rabbitmq_port,
        },
        vhost: config.rabbitmq_vhost.clone(),
        ..Default::default()
    }
}

#[async_trait]
impl TopologyChannel for RabbitMqClient {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), Error> {
        let kind = match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        };

        self.channel
            .exchange_declare(
                name,
                kind,
                ExchangeDeclareOptions {
                    durable,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare exchange: {}", e))?;

        Ok(())
    }

    async fn declare_queue(&self, name: &str, flags: QueueFlags) -> Result<(), Error> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: flags.durable,
                    exclusive: flags.exclusive,
                    auto_delete: flags.auto_delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue: {}", e))?;

        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), Error> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to bind queue: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for RabbitMqClient {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: PublishProperties,
    ) -> Result<(), Error> {
        let mut basic_properties = BasicProperties::default();
        if properties.persistent {
            basic_properties = basic_properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        }
        if let Some(content_type) = properties.content_type {
            basic_properties = basic_properties.with_content_type(content_type.into());
        }
        if let Some(message_id) = properties.message_id {
            basic_properties = basic_properties.with_message_id(message_id.into());
        }

        let confirmation = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: properties.mandatory,
                    ..Default::default()
                },
                payload,
                basic_properties,
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message: {}", e))?
            .await
            .map_err(|e| anyhow!("Failed to receive publisher confirm: {}", e))?;

        if confirmation.is_nack() {
            return Err(anyhow!("Broker refused message for exchange '{}'", exchange));
        }

        if confirmation.take_message().is_some() {
            warn!(exchange, routing_key, "Broker returned message as unroutable");
            return Err(anyhow!(
                "No queue is bound to exchange '{}' with routing key '{}'",
                exchange,
                routing_key
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl DeliveryChannel for RabbitMqClient {
    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))?;

        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await
            .map_err(|e| anyhow!("Failed to nack message: {}", e))?;

        Ok(())
    }

    async fn publish_to_dlq(&self, message: &DlqMessage) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;

        self.publish(
            "",
            &self.dead_letter_queue_name,
            &payload,
            PublishProperties {
                message_id: message.original_message.message_id.map(|id| id.to_string()),
                content_type: Some("application/json".to_string()),
                persistent: true,
                mandatory: true,
            },
        )
        .await
        .map_err(|e| anyhow!("Failed to publish message to dlq: {}", e))
    }
}
