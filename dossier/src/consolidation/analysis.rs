//! Consolidated-analysis data model.

use crate::core::{EntityCategory, Finding, VerificationLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How completed iterations are merged into one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationStrategy {
    /// Union findings across iterations, de-duplicated.
    Merge,
    /// Per category, take the most recent iteration with non-empty data.
    Latest,
    /// Merge, prefer better-verified items on conflict, and drop items only
    /// seen in low-quality iterations when a better source exists.
    Comprehensive,
}

impl Default for ConsolidationStrategy {
    fn default() -> Self {
        Self::Comprehensive
    }
}

impl fmt::Display for ConsolidationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Latest => write!(f, "latest"),
            Self::Comprehensive => write!(f, "comprehensive"),
        }
    }
}

/// The merged view of one entity category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAnalysis {
    /// Which category this covers.
    pub category: EntityCategory,
    /// Merged, de-duplicated findings.
    pub findings: Vec<Finding>,
    /// One-line summary of the category.
    pub summary: String,
}

impl CategoryAnalysis {
    /// Creates an analysis for a category.
    #[must_use]
    pub fn new(category: EntityCategory, findings: Vec<Finding>) -> Self {
        let summary = if findings.is_empty() {
            format!("No verifiable {category} findings across the included iterations.")
        } else {
            let alarming = findings.iter().filter(|f| f.severity.is_alarming()).count();
            format!(
                "{} {category} finding(s), {alarming} of high or critical severity.",
                findings.len()
            )
        };
        Self {
            category,
            findings,
            summary,
        }
    }

    /// Returns true if any finding demands escalation.
    #[must_use]
    pub fn has_alarming_findings(&self) -> bool {
        self.findings.iter().any(|f| f.severity.is_alarming())
    }
}

/// One consolidation run's output. Replaced wholesale on re-consolidation,
/// never partially mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedAnalysis {
    /// The strategy that produced this analysis.
    pub strategy: ConsolidationStrategy,
    /// Iteration numbers included, ascending.
    pub iterations_included: Vec<u32>,
    /// Per-category merged analyses, in canonical category order.
    pub categories: Vec<CategoryAnalysis>,
    /// Weighted confidence across iterations, 0.0..=1.0.
    pub overall_confidence_score: f64,
    /// Mean completeness across iterations, 0.0..=100.0.
    pub data_completeness_score: f64,
    /// Coarse tier derived from the confidence score.
    pub verification_level: VerificationLevel,
    /// True when any merged category holds a high/critical finding.
    pub requires_immediate_attention: bool,
    /// Follow-up items for the analyst.
    pub follow_up_required: Vec<String>,
    /// When this analysis was produced.
    pub consolidated_at: DateTime<Utc>,
}

impl ConsolidatedAnalysis {
    /// Returns the analysis for a category.
    #[must_use]
    pub fn category(&self, category: EntityCategory) -> Option<&CategoryAnalysis> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// Total merged finding count across all categories.
    #[must_use]
    pub fn finding_count(&self) -> usize {
        self.categories.iter().map(|c| c.findings.len()).sum()
    }
}

/// Read-only consolidation status for a job, for host dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationStatus {
    /// The job in question.
    pub job_id: Uuid,
    /// Number of completed iterations available.
    pub completed_iterations: usize,
    /// Whether an analysis exists.
    pub has_analysis: bool,
    /// Strategy of the existing analysis, if any.
    pub strategy: Option<ConsolidationStrategy>,
    /// When the existing analysis was produced, if any.
    pub consolidated_at: Option<DateTime<Utc>>,
    /// Whether a consolidation call would currently be accepted.
    pub can_consolidate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;

    #[test]
    fn test_strategy_default_is_comprehensive() {
        assert_eq!(
            ConsolidationStrategy::default(),
            ConsolidationStrategy::Comprehensive
        );
    }

    #[test]
    fn test_strategy_serialize() {
        let json = serde_json::to_string(&ConsolidationStrategy::Latest).unwrap();
        assert_eq!(json, r#""latest""#);
    }

    #[test]
    fn test_category_analysis_summary_counts_alarming() {
        let findings = vec![
            Finding::new("a", "b").with_severity(Severity::Critical),
            Finding::new("c", "d"),
        ];
        let analysis = CategoryAnalysis::new(EntityCategory::Litigation, findings);

        assert!(analysis.summary.contains("2 litigation finding(s)"));
        assert!(analysis.summary.contains("1 of high or critical"));
        assert!(analysis.has_alarming_findings());
    }

    #[test]
    fn test_empty_category_summary() {
        let analysis = CategoryAnalysis::new(EntityCategory::Regulatory, Vec::new());
        assert!(analysis.summary.contains("No verifiable regulatory findings"));
        assert!(!analysis.has_alarming_findings());
    }
}
