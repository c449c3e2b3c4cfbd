//! Provider call inputs and outputs.
//!
//! Providers are injected callables; the core never performs HTTP itself.
//! A provider either returns a [`ProviderResult`] or fails with a
//! [`ProviderFailure`], which the resilience layer classifies and absorbs.

use crate::core::{Finding, VerificationLevel};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Context passed along every provider call for classification and fallback
/// generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderContext {
    /// The company under research.
    pub company: String,
    /// The research job type as a display string.
    pub job_type: String,
    /// The logical endpoint being called, e.g. "SEARCH_API".
    pub endpoint: String,
    /// Iteration number driving the call, if any.
    pub iteration: Option<u32>,
}

impl ProviderContext {
    /// Creates a new provider context.
    #[must_use]
    pub fn new(company: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            job_type: job_type.into(),
            endpoint: String::new(),
            iteration: None,
        }
    }

    /// Sets the endpoint key.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the iteration number.
    #[must_use]
    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }
}

/// The shape every provider response resolves to, real or fallback.
///
/// Fallback results use this exact shape with low scores and populated
/// `limitations`/`recommendations`, so downstream consolidation and
/// reporting never special-case a failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    /// Narrative content.
    pub content: String,
    /// Short summary.
    pub summary: String,
    /// Structured findings.
    #[serde(default)]
    pub findings: Vec<Finding>,
    /// Confidence in the result, 0.0..=1.0.
    pub confidence_score: f64,
    /// How complete the data is, 0.0..=100.0.
    pub data_completeness: f64,
    /// Coarse verification tier for the result as a whole.
    pub verification_level: VerificationLevel,
    /// Known gaps in the result. Fallbacks always carry at least one.
    #[serde(default)]
    pub limitations: Vec<String>,
    /// Suggested next steps for the analyst.
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl ProviderResult {
    /// Creates a result with the given content and summary.
    #[must_use]
    pub fn new(content: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            summary: summary.into(),
            ..Self::default()
        }
    }

    /// Sets the confidence score, clamped to 0.0..=1.0.
    #[must_use]
    pub fn with_confidence(mut self, score: f64) -> Self {
        self.confidence_score = score.clamp(0.0, 1.0);
        self
    }

    /// Sets the data completeness, clamped to 0.0..=100.0.
    #[must_use]
    pub fn with_completeness(mut self, score: f64) -> Self {
        self.data_completeness = score.clamp(0.0, 100.0);
        self
    }

    /// Sets the verification level.
    #[must_use]
    pub fn with_verification(mut self, level: VerificationLevel) -> Self {
        self.verification_level = level;
        self
    }

    /// Adds a finding.
    #[must_use]
    pub fn with_finding(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }
}

/// A raw provider failure before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    /// Raw error text from the provider or transport.
    pub message: String,
    /// HTTP-like status code, when the transport exposes one.
    pub status: Option<u16>,
}

impl ProviderFailure {
    /// Creates a failure from raw error text.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Creates a failure with a status code.
    #[must_use]
    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Creates a synthetic timeout failure for calls cut off by the
    /// caller-supplied deadline.
    #[must_use]
    pub fn timed_out(after_secs: f64) -> Self {
        Self::new(format!("provider call timed out after {after_secs:.1}s"))
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "{} {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ProviderFailure {}
