//! Scenario tests for the failure handler.

use crate::core::{ProviderContext, ProviderFailure, ProviderResult};
use crate::failure::ErrorCategory;
use crate::resilience::{
    BreakerConfig, BreakerState, CircuitBreakerRegistry, FailureHandler, FailureHandlerConfig,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn ctx() -> ProviderContext {
    ProviderContext::new("Acme Corp", "directors").with_endpoint("SEARCH_API")
}

fn handler(registry: CircuitBreakerRegistry, config: FailureHandlerConfig) -> FailureHandler {
    FailureHandler::new(registry, config)
}

fn rate_limited() -> ProviderFailure {
    ProviderFailure::with_status("Too Many Requests", 429)
}

fn good_result() -> ProviderResult {
    ProviderResult::new("real content", "real summary")
        .with_confidence(0.9)
        .with_completeness(85.0)
}

#[tokio::test]
async fn test_success_passes_through() {
    let handler = handler(
        CircuitBreakerRegistry::default(),
        FailureHandlerConfig::default(),
    );

    let outcome = handler
        .execute("SEARCH_API", || async { Ok(good_result()) }, &ctx())
        .await;

    assert!(!outcome.fallback_used);
    assert!(!outcome.circuit_breaker_triggered);
    assert_eq!(outcome.retry_count, 0);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.result.content, "real content");
}

#[tokio::test(start_paused = true)]
async fn test_recoverable_failure_retried_until_success() {
    let handler = handler(
        CircuitBreakerRegistry::default(),
        FailureHandlerConfig::default(),
    );
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let outcome = handler
        .execute(
            "SEARCH_API",
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(rate_limited())
                    } else {
                        Ok(good_result())
                    }
                }
            },
            &ctx(),
        )
        .await;

    assert!(!outcome.fallback_used);
    assert_eq!(outcome.retry_count, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Success resets the breaker's failure accounting.
    assert_eq!(
        handler.registry().state("SEARCH_API"),
        BreakerState::Closed
    );
}

#[tokio::test]
async fn test_non_recoverable_failure_not_retried() {
    let handler = handler(
        CircuitBreakerRegistry::default(),
        FailureHandlerConfig::default(),
    );
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let outcome = handler
        .execute(
            "AUTH_API",
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<ProviderResult, _>(ProviderFailure::with_status("invalid API key", 401))
                }
            },
            &ctx(),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(outcome.fallback_used);
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(
        outcome.error.as_ref().map(|e| e.category),
        Some(ErrorCategory::Authentication)
    );
    // The fallback is structurally valid data, not an error.
    assert!(!outcome.result.content.is_empty());
    assert!(!outcome.result.limitations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_exhaustion_backs_off_then_opens_breaker() {
    // Three-failure threshold, retries at 30s, 60s, 120s.
    let registry = CircuitBreakerRegistry::new(
        BreakerConfig::default().with_failure_threshold(3),
    );
    let handler = handler(registry, FailureHandlerConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let started = tokio::time::Instant::now();
    let outcome = handler
        .execute(
            "SEARCH_API",
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<ProviderResult, _>(rate_limited())
                }
            },
            &ctx(),
        )
        .await;

    // Initial attempt plus three retries, waiting 30 + 60 + 120 seconds.
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(outcome.retry_count, 3);
    assert!(outcome.fallback_used);
    assert_eq!(started.elapsed(), Duration::from_secs(210));
    assert_eq!(
        outcome.error.as_ref().map(|e| e.category),
        Some(ErrorCategory::RateLimit)
    );
    assert_eq!(handler.registry().state("SEARCH_API"), BreakerState::Open);

    // A further call inside the cooldown window short-circuits instantly:
    // no provider invocation, no backoff wait.
    let before = tokio::time::Instant::now();
    let counter = Arc::clone(&calls);
    let outcome = handler
        .execute(
            "SEARCH_API",
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(good_result())
                }
            },
            &ctx(),
        )
        .await;

    assert!(outcome.circuit_breaker_triggered);
    assert!(outcome.fallback_used);
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 4, "provider was invoked despite open breaker");
    assert_eq!(before.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_threshold_boundary_short_circuits_next_call() {
    let registry = CircuitBreakerRegistry::new(
        BreakerConfig::default()
            .with_failure_threshold(3)
            .with_cooldown(Duration::from_secs(60)),
    );
    let handler = handler(
        registry,
        FailureHandlerConfig::default().with_max_retries(0),
    );
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let counter = Arc::clone(&calls);
        let outcome = handler
            .execute(
                "E",
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err::<ProviderResult, _>(ProviderFailure::with_status("boom", 500))
                    }
                },
                &ctx(),
            )
            .await;
        assert!(!outcome.circuit_breaker_triggered);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Exactly at the threshold the next call must not reach the provider.
    let counter = Arc::clone(&calls);
    let outcome = handler
        .execute(
            "E",
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(good_result())
                }
            },
            &ctx(),
        )
        .await;

    assert!(outcome.circuit_breaker_triggered);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_trial_success_closes_breaker() {
    // The breaker cooldown runs on the tokio clock, so a paused-clock
    // sleep is enough to reach half-open.
    let registry = CircuitBreakerRegistry::new(
        BreakerConfig::default()
            .with_failure_threshold(1)
            .with_cooldown(Duration::from_secs(60)),
    );
    let handler = handler(
        registry,
        FailureHandlerConfig::default().with_max_retries(0),
    );

    let outcome = handler
        .execute(
            "E",
            || async { Err::<ProviderResult, _>(ProviderFailure::with_status("boom", 503)) },
            &ctx(),
        )
        .await;
    assert!(outcome.fallback_used);
    assert_eq!(handler.registry().state("E"), BreakerState::Open);

    tokio::time::sleep(Duration::from_secs(61)).await;

    let outcome = handler
        .execute("E", || async { Ok(good_result()) }, &ctx())
        .await;
    assert!(!outcome.fallback_used);
    assert_eq!(handler.registry().state("E"), BreakerState::Closed);

    let status = handler.registry().snapshot().remove("E").unwrap();
    assert_eq!(status.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_halted_when_breaker_opens_mid_loop() {
    // Threshold 1: the first failure opens the breaker while the retry
    // loop is still backing off. The retry must be short-circuited, not
    // sent to the provider.
    let registry = CircuitBreakerRegistry::new(
        BreakerConfig::default()
            .with_failure_threshold(1)
            .with_cooldown(Duration::from_secs(300)),
    );
    let handler = handler(registry, FailureHandlerConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let outcome = handler
        .execute(
            "E",
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<ProviderResult, _>(rate_limited())
                }
            },
            &ctx(),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1, "provider reached past an open breaker");
    assert!(outcome.circuit_breaker_triggered);
    assert!(outcome.fallback_used);
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(handler.registry().state("E"), BreakerState::Open);
}

#[tokio::test]
async fn test_aborted_trial_call_does_not_wedge_breaker() {
    let registry = CircuitBreakerRegistry::new(
        BreakerConfig::default()
            .with_failure_threshold(1)
            .with_cooldown(Duration::from_millis(10)),
    );
    let handler = handler(
        registry,
        FailureHandlerConfig::default().with_max_retries(0),
    );

    handler
        .execute(
            "E",
            || async { Err::<ProviderResult, _>(ProviderFailure::with_status("boom", 503)) },
            &ctx(),
        )
        .await;
    assert_eq!(handler.registry().state("E"), BreakerState::Open);

    tokio::time::sleep(Duration::from_millis(20)).await;

    // Claim the half-open trial slot, then abort the task mid-call.
    let trial_handler = handler.clone();
    let task = tokio::spawn(async move {
        trial_handler
            .execute(
                "E",
                || async {
                    std::future::pending::<()>().await;
                    Ok(good_result())
                },
                &ProviderContext::default(),
            )
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    task.abort();
    assert!(task.await.is_err());

    // The abandoned slot is released; a healthy provider closes the breaker.
    let outcome = handler
        .execute("E", || async { Ok(good_result()) }, &ctx())
        .await;
    assert!(!outcome.fallback_used);
    assert_eq!(handler.registry().state("E"), BreakerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_provider_cut_off_by_call_timeout() {
    let handler = handler(
        CircuitBreakerRegistry::default(),
        FailureHandlerConfig::default()
            .with_max_retries(0)
            .with_call_timeout(Duration::from_secs(5)),
    );

    let outcome = handler
        .execute(
            "SLOW_API",
            || async {
                std::future::pending::<()>().await;
                Ok(good_result())
            },
            &ctx(),
        )
        .await;

    assert!(outcome.fallback_used);
    assert_eq!(
        outcome.error.as_ref().map(|e| e.category),
        Some(ErrorCategory::Timeout)
    );
}

#[tokio::test]
async fn test_health_check_reports_per_endpoint() {
    let handler = handler(
        CircuitBreakerRegistry::default(),
        FailureHandlerConfig::default().with_max_retries(0),
    );

    let report = handler
        .health_check(&["GOOD_API", "BAD_API"], |endpoint| async move {
            if endpoint == "GOOD_API" {
                Ok(good_result())
            } else {
                Err(ProviderFailure::with_status("boom", 500))
            }
        })
        .await;

    assert!(!report.all_healthy());
    assert!(report.endpoints["GOOD_API"].healthy);
    assert!(!report.endpoints["BAD_API"].healthy);
    assert_eq!(
        report.endpoints["BAD_API"].error_category,
        Some(ErrorCategory::ServerError)
    );
}

#[test]
fn test_backoff_delays_double_from_base() {
    let config = FailureHandlerConfig::default();
    assert_eq!(config.delay_for_attempt(0), Duration::from_secs(30));
    assert_eq!(config.delay_for_attempt(1), Duration::from_secs(60));
    assert_eq!(config.delay_for_attempt(2), Duration::from_secs(120));
    // Ceiling applies.
    assert_eq!(config.delay_for_attempt(10), Duration::from_secs(300));
}
