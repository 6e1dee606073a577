use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{ledger::DeliveryLedger, rbmq::RabbitMqClient},
    mailer::Mailer,
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

const CRITICAL_CHECKS: [&str; 2] = ["message_broker", "delivery_ledger"];

pub struct HealthChecker {
    broker: Arc<RabbitMqClient>,
    ledger: Arc<dyn DeliveryLedger>,
    mailer: Arc<dyn Mailer>,
}

impl HealthChecker {
    pub fn new(
        broker: Arc<RabbitMqClient>,
        ledger: Arc<dyn DeliveryLedger>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            broker,
            ledger,
            mailer,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("message_broker".to_string(), self.check_broker());
        checks.insert("delivery_ledger".to_string(), self.check_ledger().await);
        checks.insert("smtp".to_string(), self.check_mailer().await);

        HealthCheckResponse {
            status: determine_overall_status(&checks),
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            checks,
        }
    }

    fn check_broker(&self) -> ServiceHealth {
        if self.broker.is_connected() {
            debug!("RabbitMQ health check passed");
            ServiceHealth::healthy(0)
        } else {
            warn!("RabbitMQ connection is not open");
            ServiceHealth::unhealthy("Connection or channel is closed".to_string())
        }
    }

    async fn check_ledger(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.ledger.ping().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(
                    ledger = self.ledger.name(),
                    response_time_ms = elapsed,
                    "Delivery ledger health check passed"
                );
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(ledger = self.ledger.name(), error = %e, "Delivery ledger health check failed");
                ServiceHealth::unhealthy(format!("Ping failed: {}", e))
            }
        }
    }

    async fn check_mailer(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.mailer.health_check().await {
            Ok(true) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(mailer = self.mailer.name(), response_time_ms = elapsed, "Mailer health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Ok(false) => ServiceHealth::degraded("Mailer reported not ready".to_string()),
            Err(e) => {
                warn!(mailer = self.mailer.name(), error = %e, "Mailer health check failed");
                ServiceHealth::degraded(e.to_string())
            }
        }
    }
}

/// Broker or ledger trouble stops the worker from doing its job; mailer
/// trouble only delays delivery, since failed sends are requeued.
pub fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    let critical_unhealthy = checks
        .iter()
        .filter(|(name, _)| CRITICAL_CHECKS.contains(&name.as_str()))
        .any(|(_, health)| health.status == HealthStatus::Unhealthy);

    let has_degraded = checks
        .values()
        .any(|health| health.status != HealthStatus::Healthy);

    if critical_unhealthy {
        HealthStatus::Unhealthy
    } else if has_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
