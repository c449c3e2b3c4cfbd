//! Finding types and the closed entity-category set.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Severity of an individual finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational or minor.
    Low,
    /// Worth noting but not alarming.
    Medium,
    /// Significant risk indicator.
    High,
    /// Requires immediate attention.
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Low
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl Severity {
    /// Returns true for severities that demand escalation.
    #[must_use]
    pub fn is_alarming(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

/// Coarse confidence tier attached to findings and consolidated analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    /// Unverified or single-source.
    Low,
    /// Partially corroborated.
    Medium,
    /// Corroborated across independent sources.
    High,
}

impl Default for VerificationLevel {
    fn default() -> Self {
        Self::Low
    }
}

impl fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// The closed set of entity categories a research pass reports on.
///
/// Keeping this closed lets the consolidation engine handle every category
/// exhaustively instead of inspecting ad-hoc maps at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    /// The company under research itself.
    PrimaryEntity,
    /// Directors and officers.
    Directors,
    /// Subsidiaries and affiliates.
    Subsidiaries,
    /// Regulatory filings, sanctions, licences.
    Regulatory,
    /// Litigation and disputes.
    Litigation,
}

impl EntityCategory {
    /// All categories in canonical order.
    pub const ALL: [Self; 5] = [
        Self::PrimaryEntity,
        Self::Directors,
        Self::Subsidiaries,
        Self::Regulatory,
        Self::Litigation,
    ];
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryEntity => write!(f, "primary_entity"),
            Self::Directors => write!(f, "directors"),
            Self::Subsidiaries => write!(f, "subsidiaries"),
            Self::Regulatory => write!(f, "regulatory"),
            Self::Litigation => write!(f, "litigation"),
        }
    }
}

/// A single research finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Short title, e.g. "Director X has 3 active litigations".
    pub title: String,
    /// Longer description with context.
    pub description: String,
    /// Severity of the finding.
    pub severity: Severity,
    /// How well corroborated the finding is.
    pub verification_level: VerificationLevel,
    /// Citations / source references backing the finding.
    pub sources: Vec<String>,
}

impl Finding {
    /// Creates a new finding with default low severity and verification.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::default(),
            verification_level: VerificationLevel::default(),
            sources: Vec::new(),
        }
    }

    /// Sets the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the verification level.
    #[must_use]
    pub fn with_verification(mut self, level: VerificationLevel) -> Self {
        self.verification_level = level;
        self
    }

    /// Adds a source citation.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Returns a stable fingerprint over the normalized title and description.
    ///
    /// Two findings with the same fingerprint are considered duplicates by
    /// the consolidation engine regardless of which iteration reported them.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(normalize(&self.title).as_bytes());
        hasher.update(b"\x1f");
        hasher.update(normalize(&self.description).as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Normalizes text for duplicate detection: lowercase, collapsed whitespace.
#[must_use]
pub(crate) fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The structured findings a single iteration produces, bucketed by the
/// closed entity-category set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingsPayload {
    /// Narrative content for the pass.
    pub content: String,
    /// Short summary of the pass.
    pub summary: String,
    /// Findings about the company itself.
    #[serde(default)]
    pub primary_entity: Vec<Finding>,
    /// Findings about directors and officers.
    #[serde(default)]
    pub directors: Vec<Finding>,
    /// Findings about subsidiaries and affiliates.
    #[serde(default)]
    pub subsidiaries: Vec<Finding>,
    /// Regulatory findings.
    #[serde(default)]
    pub regulatory: Vec<Finding>,
    /// Litigation findings.
    #[serde(default)]
    pub litigation: Vec<Finding>,
}

impl FindingsPayload {
    /// Creates an empty payload with the given narrative content and summary.
    #[must_use]
    pub fn new(content: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            summary: summary.into(),
            ..Self::default()
        }
    }

    /// Returns the findings for a category.
    #[must_use]
    pub fn category(&self, category: EntityCategory) -> &[Finding] {
        match category {
            EntityCategory::PrimaryEntity => &self.primary_entity,
            EntityCategory::Directors => &self.directors,
            EntityCategory::Subsidiaries => &self.subsidiaries,
            EntityCategory::Regulatory => &self.regulatory,
            EntityCategory::Litigation => &self.litigation,
        }
    }

    /// Returns a mutable reference to the findings for a category.
    pub fn category_mut(&mut self, category: EntityCategory) -> &mut Vec<Finding> {
        match category {
            EntityCategory::PrimaryEntity => &mut self.primary_entity,
            EntityCategory::Directors => &mut self.directors,
            EntityCategory::Subsidiaries => &mut self.subsidiaries,
            EntityCategory::Regulatory => &mut self.regulatory,
            EntityCategory::Litigation => &mut self.litigation,
        }
    }

    /// Adds a finding to a category.
    #[must_use]
    pub fn with_finding(mut self, category: EntityCategory, finding: Finding) -> Self {
        self.category_mut(category).push(finding);
        self
    }

    /// Total finding count across all categories.
    #[must_use]
    pub fn finding_count(&self) -> usize {
        EntityCategory::ALL
            .iter()
            .map(|c| self.category(*c).len())
            .sum()
    }

    /// Returns true if no category has any findings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.finding_count() == 0
    }
}
