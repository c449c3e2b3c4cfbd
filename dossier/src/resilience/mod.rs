//! Circuit breaking and retry control for provider calls.
//!
//! This module provides:
//! - A per-endpoint circuit breaker registry
//! - The failure handler wrapping a single outbound call with
//!   retry/backoff/circuit-breaker policy
//! - Health probing over configured endpoints

mod breaker;
mod controller;
#[cfg(test)]
mod controller_tests;

pub use breaker::{
    Admission, BreakerConfig, BreakerState, CircuitBreakerRegistry, CircuitBreakerStatus,
    TrialPermit,
};
pub use controller::{
    CallOutcome, EndpointHealth, FailureHandler, FailureHandlerConfig, HealthReport,
};
