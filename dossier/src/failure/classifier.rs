//! Provider failure classification.
//!
//! Classification is keyword and status-code driven over the raw error text.
//! Every category maps to a fixed severity / recoverability / fallback
//! strategy so the retry controller can decide without inspecting provider
//! payloads.

use crate::core::{ProviderContext, ProviderFailure, Severity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Category of a classified provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Provider throttled the call (HTTP 429 and friends).
    RateLimit,
    /// The call exceeded a deadline.
    Timeout,
    /// Credentials rejected or missing.
    Authentication,
    /// Provider-side 5xx failure.
    ServerError,
    /// Transport-level failure (DNS, connection reset).
    NetworkError,
    /// Provider answered but the payload is unusable.
    DataQuality,
    /// Nothing matched.
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Timeout => write!(f, "timeout"),
            Self::Authentication => write!(f, "authentication"),
            Self::ServerError => write!(f, "server_error"),
            Self::NetworkError => write!(f, "network_error"),
            Self::DataQuality => write!(f, "data_quality"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// What the resilience layer should do about a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Retry transparently with exponential backoff.
    RetryWithBackoff,
    /// Retry a bounded number of times, then trip the circuit breaker.
    RetryThenCircuitBreak,
    /// No automated recovery; an operator must act.
    ManualIntervention,
    /// Produce a professional limited-data response immediately.
    ProfessionalFallback,
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryWithBackoff => write!(f, "retry-with-backoff"),
            Self::RetryThenCircuitBreak => write!(f, "retry-then-circuit-break"),
            Self::ManualIntervention => write!(f, "manual-intervention"),
            Self::ProfessionalFallback => write!(f, "professional-fallback"),
        }
    }
}

/// A classified, user-safe provider error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedError {
    /// The failure category.
    pub category: ErrorCategory,
    /// How bad it is.
    pub severity: Severity,
    /// Whether automated retry can plausibly fix it.
    pub recoverable: bool,
    /// What the resilience layer should do next.
    pub fallback_strategy: FallbackStrategy,
    /// A message safe to surface to end users.
    pub user_message: String,
    /// Concrete next steps for the analyst or operator.
    pub suggested_actions: Vec<String>,
}

/// Extracts a leading HTTP-like status code from raw error text, e.g.
/// "429 Too Many Requests" or "HTTP 503".
fn extract_status(text: &str) -> Option<u16> {
    static STATUS_RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    let re = STATUS_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:http\s+)?([1-5]\d{2})\b").expect("static status regex compiles")
    });
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn category_for(failure: &ProviderFailure) -> ErrorCategory {
    let text = failure.message.to_lowercase();
    let status = failure.status.or_else(|| extract_status(&failure.message));

    match status {
        Some(429) => return ErrorCategory::RateLimit,
        Some(408 | 504) => return ErrorCategory::Timeout,
        Some(401 | 403) => return ErrorCategory::Authentication,
        Some(code) if (500..600).contains(&code) => return ErrorCategory::ServerError,
        _ => {}
    }

    if text.contains("rate limit") || text.contains("too many requests") || text.contains("quota") {
        ErrorCategory::RateLimit
    } else if text.contains("timeout") || text.contains("timed out") || text.contains("deadline") {
        ErrorCategory::Timeout
    } else if text.contains("unauthorized")
        || text.contains("forbidden")
        || text.contains("api key")
        || text.contains("invalid credentials")
        || text.contains("authentication")
    {
        ErrorCategory::Authentication
    } else if text.contains("internal server") || text.contains("bad gateway") || text.contains("unavailable") {
        ErrorCategory::ServerError
    } else if text.contains("connection")
        || text.contains("dns")
        || text.contains("network")
        || text.contains("reset by peer")
        || text.contains("refused")
    {
        ErrorCategory::NetworkError
    } else if text.contains("parse")
        || text.contains("malformed")
        || text.contains("empty response")
        || text.contains("invalid json")
        || text.contains("no data")
    {
        ErrorCategory::DataQuality
    } else {
        ErrorCategory::Unknown
    }
}

/// Classifies a raw provider failure into a categorized, user-safe error.
#[must_use]
pub fn classify_error(failure: &ProviderFailure, ctx: &ProviderContext) -> EnhancedError {
    let category = category_for(failure);
    let (severity, recoverable, fallback_strategy) = match category {
        ErrorCategory::RateLimit | ErrorCategory::Timeout | ErrorCategory::NetworkError => {
            (Severity::Medium, true, FallbackStrategy::RetryWithBackoff)
        }
        ErrorCategory::ServerError => {
            (Severity::High, true, FallbackStrategy::RetryThenCircuitBreak)
        }
        ErrorCategory::Authentication => {
            (Severity::High, false, FallbackStrategy::ManualIntervention)
        }
        ErrorCategory::DataQuality => {
            (Severity::Low, false, FallbackStrategy::ProfessionalFallback)
        }
        ErrorCategory::Unknown => {
            (Severity::Medium, false, FallbackStrategy::ProfessionalFallback)
        }
    };

    let enhanced = EnhancedError {
        category,
        severity,
        recoverable,
        fallback_strategy,
        user_message: user_message_for(category, ctx),
        suggested_actions: suggested_actions_for(category),
    };

    tracing::debug!(
        endpoint = %ctx.endpoint,
        category = %category,
        recoverable,
        raw = %failure,
        "Classified provider failure"
    );

    enhanced
}

fn user_message_for(category: ErrorCategory, ctx: &ProviderContext) -> String {
    let subject = if ctx.company.is_empty() {
        "the requested company".to_string()
    } else {
        ctx.company.clone()
    };
    match category {
        ErrorCategory::RateLimit => format!(
            "Research on {subject} is temporarily throttled by a data provider; the system is retrying automatically."
        ),
        ErrorCategory::Timeout => format!(
            "A data provider took too long to respond while researching {subject}; the request is being retried."
        ),
        ErrorCategory::Authentication => format!(
            "A data provider rejected the service credentials while researching {subject}; an administrator needs to review the provider configuration."
        ),
        ErrorCategory::ServerError => format!(
            "A data provider is experiencing an outage; research on {subject} continues with the remaining sources."
        ),
        ErrorCategory::NetworkError => format!(
            "A network problem interrupted research on {subject}; the request is being retried."
        ),
        ErrorCategory::DataQuality => format!(
            "A data provider returned unusable data for {subject}; results will be marked as limited."
        ),
        ErrorCategory::Unknown => format!(
            "An unexpected problem occurred while researching {subject}; results will be marked as limited."
        ),
    }
}

fn suggested_actions_for(category: ErrorCategory) -> Vec<String> {
    let actions: &[&str] = match category {
        ErrorCategory::RateLimit => &[
            "Wait for the automatic retry to complete",
            "Reduce concurrent research jobs against this provider",
        ],
        ErrorCategory::Timeout => &[
            "Wait for the automatic retry to complete",
            "Narrow the research scope if timeouts persist",
        ],
        ErrorCategory::Authentication => &[
            "Verify the provider API credentials",
            "Rotate the API key if it has expired",
        ],
        ErrorCategory::ServerError => &[
            "Monitor the provider status page",
            "Re-run the job once the provider recovers",
        ],
        ErrorCategory::NetworkError => &[
            "Check outbound network connectivity",
            "Wait for the automatic retry to complete",
        ],
        ErrorCategory::DataQuality => &[
            "Treat the affected findings as indicative only",
            "Corroborate manually against primary sources",
        ],
        ErrorCategory::Unknown => &[
            "Review the raw provider error in the logs",
            "Re-run the iteration if results look incomplete",
        ],
    };
    actions.iter().map(|s| (*s).to_string()).collect()
}

/// Static base success rate for a retried call per failure category.
///
/// These constants are heuristic defaults used for retry planning and
/// operator dashboards, not a contract.
fn base_success_rate(category: ErrorCategory) -> f64 {
    match category {
        ErrorCategory::RateLimit => 0.85,
        ErrorCategory::Timeout => 0.70,
        ErrorCategory::NetworkError => 0.65,
        ErrorCategory::ServerError => 0.45,
        ErrorCategory::DataQuality => 0.20,
        ErrorCategory::Authentication => 0.05,
        ErrorCategory::Unknown => 0.30,
    }
}

/// Estimates the probability that retrying a call which failed with
/// `category` will succeed, blending a static base rate with observed
/// history (`true` = a past retry succeeded).
///
/// With no history the base rate is returned; otherwise the observed rate
/// dominates at 70% weight.
#[must_use]
pub fn estimate_success_rate(category: ErrorCategory, history: &[bool]) -> f64 {
    let base = base_success_rate(category);
    if history.is_empty() {
        return base;
    }
    #[allow(clippy::cast_precision_loss)]
    let observed = history.iter().filter(|&&ok| ok).count() as f64 / history.len() as f64;
    (0.3 * base + 0.7 * observed).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ProviderContext {
        ProviderContext::new("Acme Corp", "directors").with_endpoint("SEARCH_API")
    }

    #[test]
    fn test_classify_rate_limit_by_status() {
        let failure = ProviderFailure::with_status("Too Many Requests", 429);
        let err = classify_error(&failure, &ctx());

        assert_eq!(err.category, ErrorCategory::RateLimit);
        assert_eq!(err.severity, Severity::Medium);
        assert!(err.recoverable);
        assert_eq!(err.fallback_strategy, FallbackStrategy::RetryWithBackoff);
    }

    #[test]
    fn test_classify_rate_limit_from_embedded_status() {
        let failure = ProviderFailure::new("429 Too Many Requests");
        let err = classify_error(&failure, &ctx());
        assert_eq!(err.category, ErrorCategory::RateLimit);
    }

    #[test]
    fn test_classify_timeout_keyword() {
        let failure = ProviderFailure::new("request timed out after 30s");
        let err = classify_error(&failure, &ctx());
        assert_eq!(err.category, ErrorCategory::Timeout);
        assert!(err.recoverable);
    }

    #[test]
    fn test_classify_authentication_not_recoverable() {
        let failure = ProviderFailure::with_status("invalid API key", 401);
        let err = classify_error(&failure, &ctx());

        assert_eq!(err.category, ErrorCategory::Authentication);
        assert_eq!(err.severity, Severity::High);
        assert!(!err.recoverable);
        assert_eq!(err.fallback_strategy, FallbackStrategy::ManualIntervention);
    }

    #[test]
    fn test_classify_server_error_range() {
        for code in [500, 502, 503] {
            let failure = ProviderFailure::with_status("boom", code);
            let err = classify_error(&failure, &ctx());
            assert_eq!(err.category, ErrorCategory::ServerError, "code {code}");
            assert_eq!(err.fallback_strategy, FallbackStrategy::RetryThenCircuitBreak);
        }
    }

    #[test]
    fn test_classify_network_error() {
        let failure = ProviderFailure::new("connection reset by peer");
        let err = classify_error(&failure, &ctx());
        assert_eq!(err.category, ErrorCategory::NetworkError);
    }

    #[test]
    fn test_classify_data_quality() {
        let failure = ProviderFailure::new("empty response from provider");
        let err = classify_error(&failure, &ctx());

        assert_eq!(err.category, ErrorCategory::DataQuality);
        assert_eq!(err.severity, Severity::Low);
        assert_eq!(err.fallback_strategy, FallbackStrategy::ProfessionalFallback);
    }

    #[test]
    fn test_classify_unknown_fallback() {
        let failure = ProviderFailure::new("something inexplicable");
        let err = classify_error(&failure, &ctx());

        assert_eq!(err.category, ErrorCategory::Unknown);
        assert!(!err.recoverable);
    }

    #[test]
    fn test_user_message_mentions_company() {
        let failure = ProviderFailure::with_status("Too Many Requests", 429);
        let err = classify_error(&failure, &ctx());
        assert!(err.user_message.contains("Acme Corp"));
    }

    #[test]
    fn test_suggested_actions_nonempty_for_all_categories() {
        for failure in [
            ProviderFailure::with_status("x", 429),
            ProviderFailure::new("timeout"),
            ProviderFailure::with_status("x", 401),
            ProviderFailure::with_status("x", 500),
            ProviderFailure::new("dns failure"),
            ProviderFailure::new("malformed payload"),
            ProviderFailure::new("???"),
        ] {
            let err = classify_error(&failure, &ctx());
            assert!(!err.suggested_actions.is_empty(), "{:?}", err.category);
        }
    }

    #[test]
    fn test_estimate_success_rate_no_history() {
        let rate = estimate_success_rate(ErrorCategory::RateLimit, &[]);
        assert!((rate - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_estimate_success_rate_blends_history() {
        let rate = estimate_success_rate(ErrorCategory::RateLimit, &[true, true, false, false]);
        // 0.3 * 0.85 + 0.7 * 0.5
        assert!((rate - 0.605).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&rate));
    }
}
