use std::sync::Arc;

use anyhow::{Error, Result};
use registration_notifier::{
    api::run_api_server,
    clients::{
        health::HealthChecker,
        ledger::{DeliveryLedger, MemoryLedger},
        rbmq::RabbitMqClient,
        redis::RedisClient,
        smtp::SmtpMailer,
    },
    config::Config,
    consumer::NotificationConsumer,
    mailer::Mailer,
    topology::ensure_topology,
    worker,
};
use tokio::{signal, sync::watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_current_span(false)
        .init();

    let config = Config::load()?;
    let retry_config = config.retry_config();

    info!(
        exchange = %config.broker.exchange_name,
        queue = %config.broker.queue_name,
        routing_key = %config.broker.routing_key,
        "Starting registration notifier"
    );

    let rabbitmq = Arc::new(RabbitMqClient::connect(&config.broker).await?);
    ensure_topology(rabbitmq.as_ref(), &config.broker.topology()).await?;

    let ledger: Arc<dyn DeliveryLedger> = match &config.worker.redis_url {
        Some(redis_url) => Arc::new(
            RedisClient::connect(
                redis_url,
                config.worker.idempotency_ttl_seconds,
                retry_config.clone(),
            )
            .await?,
        ),
        None => {
            warn!("REDIS_URL not set, duplicate suppression is limited to this process");
            Arc::new(MemoryLedger::new(config.worker.idempotency_ttl_seconds))
        }
    };

    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(&config.smtp, retry_config)?);

    let consumer = NotificationConsumer::new(
        Arc::clone(&mailer),
        Arc::clone(&ledger),
        config.broker.max_delivery_attempts,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let health_checker = HealthChecker::new(Arc::clone(&rabbitmq), ledger, mailer);
    let api_handle = tokio::spawn(run_api_server(
        config.worker.server_port,
        health_checker,
        shutdown_rx.clone(),
    ));

    let signal_tx = Arc::clone(&shutdown_tx);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        let _ = signal_tx.send(true);
    });

    let worker_result = worker::run(&rabbitmq, &consumer, shutdown_rx).await;
    if let Err(e) = &worker_result {
        error!(error = %e, "Notification worker exited with an error");
    }

    let _ = shutdown_tx.send(true);

    if let Err(e) = rabbitmq.close().await {
        warn!(error = %e, "Failed to close RabbitMQ connection cleanly");
    }

    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "Health check server failed"),
        Err(e) => error!(error = %e, "Health check server task panicked"),
        Ok(Ok(())) => {}
    }

    info!("Registration notifier stopped");

    worker_result
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
