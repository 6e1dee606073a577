use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use anyhow::{Result, anyhow};
use registration_notifier::{
    mailer::DeliveryError,
    models::retry::RetryConfig,
    utils::{retry_when, retry_with_backoff},
};
use tokio::time::Instant;

fn fast_config(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 20,
        max_delay_ms: 200,
        backoff_multiplier: 2,
    }
}

/// Test: Successful operations complete without retry
#[tokio::test]
async fn test_successful_operation_no_retry() -> Result<()> {
    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&fast_config(3), || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("sent")
        }
    })
    .await?;

    assert_eq!(result, "sent");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 1, "Should only attempt once");

    Ok(())
}

/// Test: Transient failures are retried until the operation succeeds
#[tokio::test]
async fn test_transient_failures_are_retried() -> Result<()> {
    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&fast_config(5), || {
        let counter = Arc::clone(&counter);
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow!("Transient error"))
            } else {
                Ok("sent")
            }
        }
    })
    .await?;

    assert_eq!(result, "sent");
    assert_eq!(
        attempt_count.load(Ordering::SeqCst),
        3,
        "Should retry 2 times then succeed"
    );

    Ok(())
}

/// Test: Persistent failures stop after max_attempts
#[tokio::test]
async fn test_failure_exhausts_retries() -> Result<()> {
    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&fast_config(4), || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(anyhow!("Still failing"))
        }
    })
    .await;

    assert!(result.is_err(), "Should fail after max attempts");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 4);

    Ok(())
}

/// Test: Errors the predicate rejects are returned immediately
#[tokio::test]
async fn test_non_retryable_error_stops_immediately() -> Result<()> {
    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_when(
        &fast_config(5),
        || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(DeliveryError::permanent("550 mailbox unavailable"))
            }
        },
        DeliveryError::is_transient,
    )
    .await;

    assert_eq!(
        result,
        Err(DeliveryError::permanent("550 mailbox unavailable"))
    );
    assert_eq!(attempt_count.load(Ordering::SeqCst), 1);

    Ok(())
}

/// Test: Transient delivery errors keep retrying under the same predicate
#[tokio::test]
async fn test_transient_delivery_errors_are_retried() -> Result<()> {
    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_when(
        &fast_config(3),
        || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(DeliveryError::transient("421 try again later"))
            }
        },
        DeliveryError::is_transient,
    )
    .await;

    assert!(matches!(result, Err(DeliveryError::Transient(_))));
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);

    Ok(())
}

/// Test: Backoff grows by the multiplier and is capped at max_delay_ms
#[test]
fn test_delay_for_attempt_schedule() {
    let config = RetryConfig {
        max_attempts: 6,
        initial_delay_ms: 100,
        max_delay_ms: 300,
        backoff_multiplier: 2,
    };

    let delays: Vec<u64> = (1..=5).map(|a| config.delay_for_attempt(a)).collect();
    assert_eq!(delays, vec![100, 200, 300, 300, 300]);

    let huge = RetryConfig {
        max_attempts: 100,
        initial_delay_ms: u64::MAX / 2,
        max_delay_ms: 5_000,
        backoff_multiplier: 10,
    };
    assert_eq!(huge.delay_for_attempt(64), 5_000);
}

/// Test: Retry delays follow exponential backoff within the jitter band
#[tokio::test]
async fn test_exponential_backoff_timing() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 100,
        max_delay_ms: 1000,
        backoff_multiplier: 2,
    };

    let start = Instant::now();
    let attempt_times = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let times = Arc::clone(&attempt_times);

    let _ = retry_with_backoff(&config, || {
        let times = Arc::clone(&times);
        async move {
            times.lock().await.push(start.elapsed().as_millis());
            Err::<String, _>(anyhow!("Fail"))
        }
    })
    .await;

    let times = attempt_times.lock().await;
    assert_eq!(times.len(), 3);

    for i in 1..times.len() {
        let delay = times[i] - times[i - 1];
        let expected = config.delay_for_attempt(i as u32) as u128;
        assert!(
            delay >= expected * 8 / 10,
            "Delay {} should be at least {}ms (actual: {}ms)",
            i,
            expected * 8 / 10,
            delay
        );
    }

    Ok(())
}
