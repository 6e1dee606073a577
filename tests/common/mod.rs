#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use registration_notifier::{
    broker::{DeliveryChannel, MessagePublisher, PublishProperties, QueueFlags, TopologyChannel},
    consumer::IncomingDelivery,
    mailer::{DeliveryError, Mailer},
    models::{
        message::DlqMessage,
        topology::{DEFAULT_DEAD_LETTER_QUEUE_NAME, ExchangeKind},
    },
    worker::ReceivedDelivery,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Ack(u64),
    Nack { delivery_tag: u64, requeue: bool },
}

/// Delivery channel that only records what the consumer asked for.
#[derive(Default)]
pub struct RecordingChannel {
    settlements: Mutex<Vec<Settlement>>,
    dead_letters: Mutex<Vec<DlqMessage>>,
    fail_dlq: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_dlq() -> Self {
        let channel = Self::default();
        channel.fail_dlq.store(true, Ordering::SeqCst);
        channel
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.settlements.lock().unwrap().clone()
    }

    pub fn ack_count(&self) -> usize {
        self.settlements()
            .iter()
            .filter(|s| matches!(s, Settlement::Ack(_)))
            .count()
    }

    pub fn nack_count(&self) -> usize {
        self.settlements()
            .iter()
            .filter(|s| matches!(s, Settlement::Nack { .. }))
            .count()
    }

    pub fn dead_letters(&self) -> Vec<DlqMessage> {
        self.dead_letters.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.settlements
            .lock()
            .unwrap()
            .push(Settlement::Ack(delivery_tag));
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.settlements.lock().unwrap().push(Settlement::Nack {
            delivery_tag,
            requeue,
        });
        Ok(())
    }

    async fn publish_to_dlq(&self, message: &DlqMessage) -> Result<(), Error> {
        if self.fail_dlq.load(Ordering::SeqCst) {
            return Err(anyhow!("dead-letter queue unavailable"));
        }
        self.dead_letters.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub payload: Vec<u8>,
    pub properties: PublishProperties,
    pub redelivered: bool,
}

#[derive(Debug, Clone)]
pub struct TakenDelivery {
    pub delivery_tag: u64,
    pub payload: Vec<u8>,
    pub redelivered: bool,
}

impl TakenDelivery {
    pub fn as_incoming(&self) -> IncomingDelivery<'_> {
        IncomingDelivery {
            delivery_tag: self.delivery_tag,
            payload: &self.payload,
            redelivered: self.redelivered,
        }
    }
}

impl From<TakenDelivery> for ReceivedDelivery {
    fn from(taken: TakenDelivery) -> Self {
        ReceivedDelivery {
            delivery_tag: taken.delivery_tag,
            data: taken.payload,
            redelivered: taken.redelivered,
        }
    }
}

struct QueueState {
    flags: QueueFlags,
    messages: VecDeque<StoredMessage>,
}

/// Broker emulation with direct-exchange routing, idempotent declares and
/// unacked tracking so a consumer crash can be replayed.
pub struct InMemoryBroker {
    exchanges: Mutex<HashMap<String, (ExchangeKind, bool)>>,
    queues: Mutex<HashMap<String, QueueState>>,
    bindings: Mutex<Vec<(String, String, String)>>,
    unacked: Mutex<HashMap<u64, (String, StoredMessage)>>,
    dead_letter_queue: String,
    next_tag: AtomicU64,
    fail_publish: AtomicBool,
    published: AtomicU64,
    acks: AtomicU64,
    nacks: AtomicU64,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            exchanges: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            bindings: Mutex::new(Vec::new()),
            unacked: Mutex::new(HashMap::new()),
            dead_letter_queue: DEFAULT_DEAD_LETTER_QUEUE_NAME.to_string(),
            next_tag: AtomicU64::new(1),
            fail_publish: AtomicBool::new(false),
            published: AtomicU64::new(0),
            acks: AtomicU64::new(0),
            nacks: AtomicU64::new(0),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_publish.store(unavailable, Ordering::SeqCst);
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.lock().unwrap().len()
    }

    pub fn queue_count(&self) -> usize {
        self.queues.lock().unwrap().len()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.lock().unwrap().len()
    }

    pub fn has_binding(&self, queue: &str, exchange: &str, routing_key: &str) -> bool {
        self.bindings
            .lock()
            .unwrap()
            .iter()
            .any(|(q, e, k)| q == queue && e == exchange && k == routing_key)
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|state| state.messages.len())
            .unwrap_or(0)
    }

    pub fn messages(&self, queue: &str) -> Vec<StoredMessage> {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|state| state.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    pub fn ack_count(&self) -> u64 {
        self.acks.load(Ordering::SeqCst)
    }

    pub fn nack_count(&self) -> u64 {
        self.nacks.load(Ordering::SeqCst)
    }

    pub fn unacked_count(&self) -> usize {
        self.unacked.lock().unwrap().len()
    }

    /// Hands the head of `queue` to a consumer, keeping it unacked.
    pub fn take(&self, queue: &str) -> Option<TakenDelivery> {
        let message = self
            .queues
            .lock()
            .unwrap()
            .get_mut(queue)?
            .messages
            .pop_front()?;

        let delivery_tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
        let taken = TakenDelivery {
            delivery_tag,
            payload: message.payload.clone(),
            redelivered: message.redelivered,
        };

        self.unacked
            .lock()
            .unwrap()
            .insert(delivery_tag, (queue.to_string(), message));

        Some(taken)
    }

    /// Consumer connection dropped: every unacked message returns to its queue.
    pub fn drop_consumer(&self) {
        let returned: Vec<(u64, (String, StoredMessage))> =
            self.unacked.lock().unwrap().drain().collect();

        let mut returned = returned;
        returned.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));

        let mut queues = self.queues.lock().unwrap();
        for (_, (queue, mut message)) in returned {
            message.redelivered = true;
            if let Some(state) = queues.get_mut(&queue) {
                state.messages.push_front(message);
            }
        }
    }

    fn enqueue(&self, queue: &str, message: StoredMessage) -> Result<(), Error> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| anyhow!("NOT_FOUND - no queue '{}'", queue))?;
        state.messages.push_back(message);
        Ok(())
    }
}

#[async_trait]
impl TopologyChannel for InMemoryBroker {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), Error> {
        let mut exchanges = self.exchanges.lock().unwrap();
        match exchanges.get(name) {
            Some(existing) if *existing != (kind, durable) => Err(anyhow!(
                "PRECONDITION_FAILED - inequivalent arg for exchange '{}'",
                name
            )),
            Some(_) => Ok(()),
            None => {
                exchanges.insert(name.to_string(), (kind, durable));
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, name: &str, flags: QueueFlags) -> Result<(), Error> {
        let mut queues = self.queues.lock().unwrap();
        match queues.get(name) {
            Some(existing) if existing.flags != flags => Err(anyhow!(
                "PRECONDITION_FAILED - inequivalent arg for queue '{}'",
                name
            )),
            Some(_) => Ok(()),
            None => {
                queues.insert(
                    name.to_string(),
                    QueueState {
                        flags,
                        messages: VecDeque::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<(), Error> {
        if !self.queues.lock().unwrap().contains_key(queue) {
            return Err(anyhow!("NOT_FOUND - no queue '{}'", queue));
        }
        if !self.exchanges.lock().unwrap().contains_key(exchange) {
            return Err(anyhow!("NOT_FOUND - no exchange '{}'", exchange));
        }

        let mut bindings = self.bindings.lock().unwrap();
        let binding = (
            queue.to_string(),
            exchange.to_string(),
            routing_key.to_string(),
        );
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: PublishProperties,
    ) -> Result<(), Error> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(anyhow!("Connection refused"));
        }

        let message = StoredMessage {
            payload: payload.to_vec(),
            properties: properties.clone(),
            redelivered: false,
        };

        if exchange.is_empty() {
            self.enqueue(routing_key, message)?;
            self.published.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        if !self.exchanges.lock().unwrap().contains_key(exchange) {
            return Err(anyhow!("NOT_FOUND - no exchange '{}'", exchange));
        }

        let targets: Vec<String> = self
            .bindings
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e, k)| e == exchange && k == routing_key)
            .map(|(q, _, _)| q.clone())
            .collect();

        if targets.is_empty() && properties.mandatory {
            return Err(anyhow!(
                "Message returned as unroutable: exchange '{}', routing key '{}'",
                exchange,
                routing_key
            ));
        }

        for queue in targets {
            self.enqueue(&queue, message.clone())?;
        }
        self.published.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

#[async_trait]
impl DeliveryChannel for InMemoryBroker {
    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.unacked
            .lock()
            .unwrap()
            .remove(&delivery_tag)
            .ok_or_else(|| anyhow!("PRECONDITION_FAILED - unknown delivery tag {}", delivery_tag))?;
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        let (queue, mut message) = self
            .unacked
            .lock()
            .unwrap()
            .remove(&delivery_tag)
            .ok_or_else(|| anyhow!("PRECONDITION_FAILED - unknown delivery tag {}", delivery_tag))?;
        self.nacks.fetch_add(1, Ordering::SeqCst);

        if requeue {
            message.redelivered = true;
            if let Some(state) = self.queues.lock().unwrap().get_mut(&queue) {
                state.messages.push_front(message);
            }
        }
        Ok(())
    }

    async fn publish_to_dlq(&self, message: &DlqMessage) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;
        self.publish(
            "",
            &self.dead_letter_queue,
            &payload,
            PublishProperties {
                content_type: Some("application/json".to_string()),
                persistent: true,
                mandatory: true,
                ..Default::default()
            },
        )
        .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub recipient_email: String,
    pub recipient_name: String,
    pub recipient_phone: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Mailer that replays scripted outcomes, then falls back to a fixed one.
pub struct StubMailer {
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    fallback: Result<(), DeliveryError>,
    calls: Mutex<Vec<SentMail>>,
}

impl StubMailer {
    pub fn succeeding() -> Self {
        Self::scripted(Vec::new(), Ok(()))
    }

    pub fn failing(error: DeliveryError) -> Self {
        Self::scripted(Vec::new(), Err(error))
    }

    pub fn fail_once_then_succeed() -> Self {
        Self::scripted(
            vec![Err(DeliveryError::transient("connection reset by peer"))],
            Ok(()),
        )
    }

    pub fn scripted(
        script: Vec<Result<(), DeliveryError>>,
        fallback: Result<(), DeliveryError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SentMail> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for StubMailer {
    async fn send(
        &self,
        recipient_email: &str,
        recipient_name: &str,
        recipient_phone: Option<&str>,
        registered_at: DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        self.calls.lock().unwrap().push(SentMail {
            recipient_email: recipient_email.to_string(),
            recipient_name: recipient_name.to_string(),
            recipient_phone: recipient_phone.map(str::to_string),
            registered_at,
        });

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}
