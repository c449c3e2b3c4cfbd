//! Per-endpoint circuit breaker registry.
//!
//! Each endpoint key owns an independent state machine:
//! closed → open after `failure_threshold` consecutive failures; open
//! short-circuits every call until the cooldown elapses, then exactly one
//! trial call is admitted (half-open). A successful trial closes the
//! breaker and resets the counter; a failed trial reopens it, with the
//! cooldown doubling up to a bound. The trial slot is held through an
//! RAII permit: a trial dropped without a recorded outcome returns the
//! breaker to open, so a cancelled caller cannot wedge the endpoint in
//! half-open.
//!
//! The registry is injected and explicitly owned, never a hidden singleton,
//! so tests construct isolated registries per case.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker state for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation; calls pass through.
    Closed,
    /// Endpoint assumed down; calls fail fast.
    Open,
    /// Cooldown elapsed; a single trial call is in flight.
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Breaker tuning for all endpoints in a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker short-circuits calls.
    pub cooldown: Duration,
    /// Upper bound on the grown cooldown after repeated failed trials.
    pub max_cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
            max_cooldown: Duration::from_secs(480),
        }
    }
}

impl BreakerConfig {
    /// Sets the failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the cooldown duration.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Whether a call may proceed against an endpoint.
#[derive(Debug)]
pub enum Admission {
    /// Breaker closed; proceed normally.
    Allow,
    /// Breaker half-open; the carried permit holds the single trial slot.
    AllowTrial(TrialPermit),
    /// Breaker open; skip the call and fall back immediately.
    ShortCircuit,
}

/// Claim on a breaker's single half-open trial slot.
///
/// The slot is released by recording the trial's outcome on the registry.
/// Dropping the permit with no outcome recorded returns the breaker to
/// open with its cooldown already elapsed, so the next caller can claim a
/// fresh trial instead of the endpoint staying dark until an operator
/// reset.
#[derive(Debug)]
pub struct TrialPermit {
    entry: Arc<Mutex<BreakerEntry>>,
}

impl Drop for TrialPermit {
    fn drop(&mut self) {
        let mut breaker = self.entry.lock();
        if breaker.state == BreakerState::HalfOpen && breaker.trial_in_flight {
            breaker.state = BreakerState::Open;
            breaker.trial_in_flight = false;
        }
    }
}

#[derive(Debug)]
struct BreakerEntry {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    current_cooldown: Duration,
    trial_in_flight: bool,
}

impl BreakerEntry {
    fn new(config: &BreakerConfig) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            opened_at_wall: None,
            current_cooldown: config.cooldown,
            trial_in_flight: false,
        }
    }
}

/// Read-only snapshot of one breaker for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failures recorded.
    pub consecutive_failures: u32,
    /// When the breaker last opened, if ever.
    pub opened_at: Option<DateTime<Utc>>,
    /// The configured failure threshold.
    pub failure_threshold: u32,
    /// The cooldown currently in effect.
    pub cooldown: Duration,
}

/// Process-wide registry of per-endpoint circuit breakers.
///
/// Safe for concurrent use: entries live in a concurrent map and each
/// entry's transitions happen under its own lock.
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    entries: Arc<DashMap<String, Arc<Mutex<BreakerEntry>>>>,
    config: BreakerConfig,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    /// Creates a registry with the given breaker tuning.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            config,
        }
    }

    fn entry(&self, key: &str) -> Arc<Mutex<BreakerEntry>> {
        Arc::clone(
            &self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(BreakerEntry::new(&self.config)))),
        )
    }

    /// Decides whether a call against `key` may proceed.
    ///
    /// In the open state this performs the cooldown check; when the
    /// cooldown has elapsed the caller atomically claims the single
    /// half-open trial slot.
    pub fn admit(&self, key: &str) -> Admission {
        let entry = self.entry(key);
        let mut breaker = entry.lock();

        match breaker.state {
            BreakerState::Closed => Admission::Allow,
            BreakerState::HalfOpen => Admission::ShortCircuit,
            BreakerState::Open => {
                let elapsed = breaker
                    .opened_at
                    .map(|t| t.elapsed() >= breaker.current_cooldown)
                    .unwrap_or(true);
                if elapsed && !breaker.trial_in_flight {
                    breaker.state = BreakerState::HalfOpen;
                    breaker.trial_in_flight = true;
                    info!(endpoint = key, "Circuit breaker half-open, admitting trial call");
                    Admission::AllowTrial(TrialPermit {
                        entry: Arc::clone(&entry),
                    })
                } else {
                    Admission::ShortCircuit
                }
            }
        }
    }

    /// Records a successful call. A successful half-open trial closes the
    /// breaker and resets the failure counter.
    pub fn record_success(&self, key: &str) {
        let entry = self.entry(key);
        let mut breaker = entry.lock();

        if breaker.state == BreakerState::HalfOpen {
            info!(endpoint = key, "Circuit breaker closed after successful trial");
        }
        breaker.state = BreakerState::Closed;
        breaker.consecutive_failures = 0;
        breaker.opened_at = None;
        breaker.opened_at_wall = None;
        breaker.current_cooldown = self.config.cooldown;
        breaker.trial_in_flight = false;
    }

    /// Records a failed call, opening the breaker once the threshold is
    /// reached. A failed half-open trial reopens immediately with a grown
    /// cooldown.
    pub fn record_failure(&self, key: &str) {
        let entry = self.entry(key);
        let mut breaker = entry.lock();

        breaker.consecutive_failures = breaker.consecutive_failures.saturating_add(1);

        match breaker.state {
            BreakerState::HalfOpen => {
                breaker.current_cooldown =
                    (breaker.current_cooldown * 2).min(self.config.max_cooldown);
                open(&mut breaker, key);
            }
            BreakerState::Closed if breaker.consecutive_failures >= self.config.failure_threshold => {
                open(&mut breaker, key);
            }
            _ => {}
        }
    }

    /// Forces a breaker closed unconditionally. Operator escape hatch.
    pub fn reset(&self, key: &str) {
        let entry = self.entry(key);
        let mut breaker = entry.lock();
        *breaker = BreakerEntry::new(&self.config);
        info!(endpoint = key, "Circuit breaker reset by operator");
    }

    /// Read-only snapshot of every tracked breaker.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, CircuitBreakerStatus> {
        self.entries
            .iter()
            .map(|item| {
                let breaker = item.value().lock();
                (
                    item.key().clone(),
                    CircuitBreakerStatus {
                        state: breaker.state,
                        consecutive_failures: breaker.consecutive_failures,
                        opened_at: breaker.opened_at_wall,
                        failure_threshold: self.config.failure_threshold,
                        cooldown: breaker.current_cooldown,
                    },
                )
            })
            .collect()
    }

    /// The state of one breaker, `Closed` if the endpoint is untracked.
    #[must_use]
    pub fn state(&self, key: &str) -> BreakerState {
        self.entries
            .get(key)
            .map_or(BreakerState::Closed, |e| e.lock().state)
    }
}

fn open(breaker: &mut BreakerEntry, key: &str) {
    breaker.state = BreakerState::Open;
    breaker.opened_at = Some(Instant::now());
    breaker.opened_at_wall = Some(Utc::now());
    breaker.trial_in_flight = false;
    warn!(
        endpoint = key,
        failures = breaker.consecutive_failures,
        cooldown_secs = breaker.current_cooldown.as_secs(),
        "Circuit breaker opened"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(threshold: u32, cooldown_ms: u64) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(
            BreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_cooldown(Duration::from_millis(cooldown_ms)),
        )
    }

    #[test]
    fn test_closed_until_threshold() {
        let registry = registry(3, 50);

        registry.record_failure("E");
        registry.record_failure("E");
        assert_eq!(registry.state("E"), BreakerState::Closed);
        assert!(matches!(registry.admit("E"), Admission::Allow));

        registry.record_failure("E");
        assert_eq!(registry.state("E"), BreakerState::Open);
        assert!(matches!(registry.admit("E"), Admission::ShortCircuit));
    }

    #[test]
    fn test_success_resets_counter() {
        let registry = registry(3, 50);

        registry.record_failure("E");
        registry.record_failure("E");
        registry.record_success("E");
        registry.record_failure("E");
        registry.record_failure("E");
        assert_eq!(registry.state("E"), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_single_trial_then_close() {
        let registry = registry(1, 10);
        registry.record_failure("E");
        assert_eq!(registry.state("E"), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(20));
        let trial = registry.admit("E");
        assert!(matches!(trial, Admission::AllowTrial(_)));
        // The slot is exclusive: everyone else short-circuits.
        assert!(matches!(registry.admit("E"), Admission::ShortCircuit));

        registry.record_success("E");
        drop(trial);
        assert_eq!(registry.state("E"), BreakerState::Closed);
        let status = registry.snapshot().remove("E").unwrap();
        assert_eq!(status.consecutive_failures, 0);
    }

    #[test]
    fn test_failed_trial_reopens_with_grown_cooldown() {
        let registry = registry(1, 10);
        registry.record_failure("E");
        std::thread::sleep(Duration::from_millis(20));
        let trial = registry.admit("E");
        assert!(matches!(trial, Admission::AllowTrial(_)));

        registry.record_failure("E");
        drop(trial);
        assert_eq!(registry.state("E"), BreakerState::Open);
        let status = registry.snapshot().remove("E").unwrap();
        assert_eq!(status.cooldown, Duration::from_millis(20));
        // Grown cooldown means an immediate re-admit is refused.
        assert!(matches!(registry.admit("E"), Admission::ShortCircuit));
    }

    #[test]
    fn test_dropped_trial_releases_slot() {
        let registry = registry(1, 10);
        registry.record_failure("E");
        std::thread::sleep(Duration::from_millis(20));

        {
            let trial = registry.admit("E");
            assert!(matches!(trial, Admission::AllowTrial(_)));
            assert!(matches!(registry.admit("E"), Admission::ShortCircuit));
            // Trial abandoned without an outcome: caller cancelled.
        }

        // The slot is released, not wedged in half-open.
        assert_eq!(registry.state("E"), BreakerState::Open);
        assert!(matches!(registry.admit("E"), Admission::AllowTrial(_)));
    }

    #[test]
    fn test_reset_forces_closed() {
        let registry = registry(1, 60_000);
        registry.record_failure("E");
        assert_eq!(registry.state("E"), BreakerState::Open);

        registry.reset("E");
        assert_eq!(registry.state("E"), BreakerState::Closed);
        assert!(matches!(registry.admit("E"), Admission::Allow));
    }

    #[test]
    fn test_keys_are_independent() {
        let registry = registry(1, 50);
        registry.record_failure("A");
        assert_eq!(registry.state("A"), BreakerState::Open);
        assert_eq!(registry.state("B"), BreakerState::Closed);
        assert!(matches!(registry.admit("B"), Admission::Allow));
    }

    #[test]
    fn test_snapshot_reports_all_keys() {
        let registry = registry(2, 50);
        registry.record_failure("A");
        registry.record_failure("B");
        registry.record_failure("B");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["A"].state, BreakerState::Closed);
        assert_eq!(snapshot["B"].state, BreakerState::Open);
        assert!(snapshot["B"].opened_at.is_some());
    }

    #[test]
    fn test_concurrent_failures_open_exactly_once() {
        let registry = registry(50, 1000);
        let registry = Arc::new(registry);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for _ in 0..10 {
                    registry.record_failure("E");
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let status = registry.snapshot().remove("E").unwrap();
        assert_eq!(status.consecutive_failures, 100);
        assert_eq!(status.state, BreakerState::Open);
    }
}
