//! The failure handler: retry, backoff, and circuit breaking around one
//! outbound provider call.
//!
//! Provider failures never escape as errors. A call either yields real
//! data or a structurally valid fallback result annotated with how it was
//! produced, so job execution continues with degraded confidence instead
//! of aborting.

use crate::core::{ProviderContext, ProviderFailure, ProviderResult};
use crate::failure::{apply_intelligent_fallback, classify_error, EnhancedError, ErrorCategory};
use crate::resilience::{Admission, BreakerState, CircuitBreakerRegistry, TrialPermit};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry and timeout tuning for the failure handler.
#[derive(Debug, Clone)]
pub struct FailureHandlerConfig {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay before the first retry.
    pub base_delay: Duration,
    /// Exponential backoff multiplier.
    pub backoff_multiplier: f64,
    /// Ceiling on any single backoff wait.
    pub max_delay: Duration,
    /// Deadline applied to every individual provider attempt.
    pub call_timeout: Option<Duration>,
    /// Apply full jitter to backoff waits.
    pub jitter: bool,
}

impl Default for FailureHandlerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(300),
            call_timeout: Some(Duration::from_secs(120)),
            jitter: false,
        }
    }
}

impl FailureHandlerConfig {
    /// Sets the maximum retries.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base backoff delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the per-attempt call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Enables full jitter on backoff waits.
    #[must_use]
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// The backoff wait before retry number `attempt` (0-based), bounded
    /// by `max_delay`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.min(16) as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// What one guarded provider call produced.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// The data: real on success, a labeled fallback otherwise.
    pub result: ProviderResult,
    /// The final classified error when the call did not succeed.
    pub error: Option<EnhancedError>,
    /// Retries performed (not counting the initial attempt).
    pub retry_count: u32,
    /// True when `result` is a fallback rather than provider data.
    pub fallback_used: bool,
    /// True when the breaker short-circuited the call without any
    /// provider invocation.
    pub circuit_breaker_triggered: bool,
}

impl CallOutcome {
    fn success(result: ProviderResult, retry_count: u32) -> Self {
        Self {
            result,
            error: None,
            retry_count,
            fallback_used: false,
            circuit_breaker_triggered: false,
        }
    }
}

/// Health probe summary for one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHealth {
    /// The probe returned real data.
    pub healthy: bool,
    /// Breaker state after the probe.
    pub breaker_state: BreakerState,
    /// Classified failure category when unhealthy.
    pub error_category: Option<ErrorCategory>,
}

/// Result of probing all configured endpoints.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// When the probe ran.
    pub checked_at: DateTime<Utc>,
    /// Per-endpoint outcomes.
    pub endpoints: HashMap<String, EndpointHealth>,
}

impl HealthReport {
    /// True when every probed endpoint returned real data.
    #[must_use]
    pub fn all_healthy(&self) -> bool {
        self.endpoints.values().all(|e| e.healthy)
    }
}

/// Wraps outbound provider calls with retry, backoff, and circuit-breaker
/// policy. The breaker registry is injected so callers control its scope.
#[derive(Debug, Clone)]
pub struct FailureHandler {
    registry: CircuitBreakerRegistry,
    config: FailureHandlerConfig,
}

impl FailureHandler {
    /// Creates a handler over the given registry and tuning.
    #[must_use]
    pub fn new(registry: CircuitBreakerRegistry, config: FailureHandlerConfig) -> Self {
        Self { registry, config }
    }

    /// The injected breaker registry.
    #[must_use]
    pub fn registry(&self) -> &CircuitBreakerRegistry {
        &self.registry
    }

    /// Executes `call` against `endpoint_key` under full failure handling.
    ///
    /// An open breaker skips the provider entirely and returns a fallback
    /// with `circuit_breaker_triggered` set, with no backoff wait.
    /// Recoverable failures are retried with exponential backoff; every
    /// failed attempt feeds the breaker's failure counter, and admission
    /// is re-checked after each backoff wait so a breaker that opened
    /// mid-loop (by this call's own failures or another job's) halts the
    /// retries without reaching the provider again. On exhaustion or a
    /// non-recoverable failure the classified error is converted into an
    /// intelligent fallback.
    pub async fn execute<F, Fut>(
        &self,
        endpoint_key: &str,
        mut call: F,
        ctx: &ProviderContext,
    ) -> CallOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<ProviderResult, ProviderFailure>>,
    {
        let mut trial: Option<TrialPermit> = match self.registry.admit(endpoint_key) {
            Admission::ShortCircuit => return self.short_circuit_outcome(endpoint_key, ctx),
            Admission::AllowTrial(permit) => Some(permit),
            Admission::Allow => None,
        };

        let mut attempt: u32 = 0;
        let last_error = loop {
            match self.attempt_call(&mut call).await {
                Ok(result) => {
                    self.registry.record_success(endpoint_key);
                    debug!(endpoint = endpoint_key, retries = attempt, "Provider call succeeded");
                    return CallOutcome::success(result, attempt);
                }
                Err(failure) => {
                    self.registry.record_failure(endpoint_key);
                    let error = classify_error(&failure, ctx);

                    // A half-open trial gets exactly one attempt.
                    if trial.is_some() || !error.recoverable || attempt >= self.config.max_retries {
                        break error;
                    }

                    let delay = self.backoff_delay(attempt);
                    warn!(
                        endpoint = endpoint_key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        category = %error.category,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;

                    match self.registry.admit(endpoint_key) {
                        Admission::Allow => {}
                        Admission::AllowTrial(permit) => trial = Some(permit),
                        Admission::ShortCircuit => {
                            let mut outcome = self.short_circuit_outcome(endpoint_key, ctx);
                            outcome.retry_count = attempt.saturating_sub(1);
                            return outcome;
                        }
                    }
                }
            }
        };

        warn!(
            endpoint = endpoint_key,
            retries = attempt,
            category = %last_error.category,
            "Provider call exhausted, returning fallback"
        );
        CallOutcome {
            result: apply_intelligent_fallback(&last_error, ctx),
            error: Some(last_error),
            retry_count: attempt,
            fallback_used: true,
            circuit_breaker_triggered: false,
        }
    }

    /// Probes each endpoint through normal call semantics and reports
    /// per-endpoint health.
    pub async fn health_check<F, Fut>(&self, endpoints: &[&str], probe: F) -> HealthReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = std::result::Result<ProviderResult, ProviderFailure>>,
    {
        let mut report = HashMap::new();
        for &endpoint in endpoints {
            let ctx = ProviderContext::default().with_endpoint(endpoint);
            let outcome = self.execute(endpoint, || probe(endpoint.to_string()), &ctx).await;
            report.insert(
                endpoint.to_string(),
                EndpointHealth {
                    healthy: !outcome.fallback_used && !outcome.circuit_breaker_triggered,
                    breaker_state: self.registry.state(endpoint),
                    error_category: outcome.error.map(|e| e.category),
                },
            );
        }
        HealthReport {
            checked_at: Utc::now(),
            endpoints: report,
        }
    }

    async fn attempt_call<F, Fut>(
        &self,
        call: &mut F,
    ) -> std::result::Result<ProviderResult, ProviderFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<ProviderResult, ProviderFailure>>,
    {
        match self.config.call_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderFailure::timed_out(timeout.as_secs_f64())),
            },
            None => call().await,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.config.delay_for_attempt(attempt);
        if self.config.jitter && !delay.is_zero() {
            let millis = rand::thread_rng().gen_range(0..=delay.as_millis());
            #[allow(clippy::cast_possible_truncation)]
            Duration::from_millis(millis as u64)
        } else {
            delay
        }
    }

    fn short_circuit_outcome(&self, endpoint_key: &str, ctx: &ProviderContext) -> CallOutcome {
        let failure = ProviderFailure::new(format!(
            "service unavailable: circuit breaker open for {endpoint_key}"
        ));
        let error = classify_error(&failure, ctx);
        debug!(endpoint = endpoint_key, "Circuit breaker open, short-circuiting call");

        CallOutcome {
            result: apply_intelligent_fallback(&error, ctx),
            error: Some(error),
            retry_count: 0,
            fallback_used: true,
            circuit_breaker_triggered: true,
        }
    }
}
