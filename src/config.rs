use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{
    retry::RetryConfig,
    topology::{
        DEFAULT_DEAD_LETTER_QUEUE_NAME, DEFAULT_EXCHANGE_NAME, DEFAULT_QUEUE_NAME,
        NOTIFICATION_ROUTING_KEY, TopologyDescriptor,
    },
    validation::validate_recipient_email,
};

/// Broker settings shared by the publishing and the consuming process.
#[derive(Clone, Deserialize, Debug)]
pub struct BrokerConfig {
    pub rabbitmq_host: String,
    #[serde(default = "default_rabbitmq_port")]
    pub rabbitmq_port: u16,
    pub rabbitmq_username: String,
    pub rabbitmq_password: String,
    #[serde(default = "default_rabbitmq_vhost")]
    pub rabbitmq_vhost: String,

    #[serde(default = "default_exchange_name")]
    pub exchange_name: String,
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    #[serde(default = "default_routing_key")]
    pub routing_key: String,
    #[serde(default = "default_dead_letter_queue_name")]
    pub dead_letter_queue_name: String,

    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
}

#[derive(Clone, Deserialize, Debug)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
}

#[derive(Clone, Deserialize, Debug)]
pub struct WorkerConfig {
    pub redis_url: Option<String>,
    #[serde(default = "default_idempotency_ttl_seconds")]
    pub idempotency_ttl_seconds: u64,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

/// Everything the notification worker needs at start-up.
#[derive(Clone, Debug)]
pub struct Config {
    pub broker: BrokerConfig,
    pub smtp: SmtpConfig,
    pub worker: WorkerConfig,
}

impl BrokerConfig {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();
        Self::from_iter(std::env::vars())
    }

    pub fn from_iter<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Self>(vars)
            .map_err(|e| anyhow!("Invalid or missing broker environment variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.rabbitmq_host.trim().is_empty() {
            return Err(anyhow!("RABBITMQ_HOST cannot be empty"));
        }
        if self.rabbitmq_username.trim().is_empty() {
            return Err(anyhow!("RABBITMQ_USERNAME cannot be empty"));
        }
        if self.prefetch_count == 0 {
            return Err(anyhow!("PREFETCH_COUNT must be at least 1"));
        }
        if self.max_delivery_attempts == 0 {
            return Err(anyhow!("MAX_DELIVERY_ATTEMPTS must be at least 1"));
        }

        self.topology().validate()
    }

    pub fn topology(&self) -> TopologyDescriptor {
        TopologyDescriptor::new(
            self.exchange_name.clone(),
            self.queue_name.clone(),
            self.routing_key.clone(),
            self.dead_letter_queue_name.clone(),
        )
    }
}

impl SmtpConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("SMTP_HOST cannot be empty"));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(anyhow!(
                "SMTP_USERNAME and SMTP_PASSWORD must be set together"
            ));
        }
        validate_recipient_email(&self.from_email)
            .map_err(|e| anyhow!("Invalid SMTP_FROM_EMAIL: {}", e))
    }
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();
        Self::from_iter(std::env::vars())
    }

    pub fn from_iter<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();

        let broker = BrokerConfig::from_iter(vars.clone())?;

        let smtp = envy::prefixed("SMTP_")
            .from_iter::<_, SmtpConfig>(vars.clone())
            .map_err(|e| anyhow!("Invalid or missing SMTP environment variable: {}", e))?;
        smtp.validate()?;

        let worker = envy::from_iter::<_, WorkerConfig>(vars)
            .map_err(|e| anyhow!("Invalid or missing worker environment variable: {}", e))?;

        if worker.max_retry_attempts == 0 {
            return Err(anyhow!("MAX_RETRY_ATTEMPTS must be at least 1"));
        }
        if worker.retry_backoff_multiplier == 0 {
            return Err(anyhow!("RETRY_BACKOFF_MULTIPLIER must be at least 1"));
        }

        Ok(Self {
            broker,
            smtp,
            worker,
        })
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.worker.max_retry_attempts,
            initial_delay_ms: self.worker.initial_retry_delay_ms,
            max_delay_ms: self.worker.max_retry_delay_ms,
            backoff_multiplier: self.worker.retry_backoff_multiplier,
        }
    }
}

fn default_rabbitmq_port() -> u16 {
    5672
}

fn default_rabbitmq_vhost() -> String {
    "/".to_string()
}

fn default_exchange_name() -> String {
    DEFAULT_EXCHANGE_NAME.to_string()
}

fn default_queue_name() -> String {
    DEFAULT_QUEUE_NAME.to_string()
}

fn default_routing_key() -> String {
    NOTIFICATION_ROUTING_KEY.to_string()
}

fn default_dead_letter_queue_name() -> String {
    DEFAULT_DEAD_LETTER_QUEUE_NAME.to_string()
}

fn default_prefetch_count() -> u16 {
    1
}

fn default_max_delivery_attempts() -> u32 {
    5
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "SmartEventManagementSystem".to_string()
}

fn default_use_tls() -> bool {
    true
}

fn default_idempotency_ttl_seconds() -> u64 {
    86_400
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    200
}

fn default_max_retry_delay_ms() -> u64 {
    2_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_server_port() -> u16 {
    8080
}
