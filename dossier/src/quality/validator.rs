//! Result scoring across completeness, specificity, and verifiability.

use crate::core::{ProviderContext, ProviderResult, VerificationLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// A result scoring at or above this overall score passes validation.
pub const QUALITY_PASS_MARK: f64 = 40.0;

/// Quality assessment for one result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    /// Mean of the dimension scores, 0.0..=100.0.
    pub overall_score: f64,
    /// Non-empty content, summary, and findings.
    pub completeness: f64,
    /// Findings carry sources and meaningful verification metadata.
    pub specificity: f64,
    /// Distinct, citable sources back the result.
    pub verifiability: f64,
    /// True when `overall_score` meets [`QUALITY_PASS_MARK`].
    pub validation_passed: bool,
    /// What would raise the score.
    pub recommendations: Vec<String>,
}

/// Scores a result before it is accepted into consolidation.
///
/// Advisory: the report never blocks anything. An empty result (no
/// content, no findings) scores near zero.
#[must_use]
pub fn validate_data_quality(result: &ProviderResult, ctx: &ProviderContext) -> DataQualityReport {
    let completeness = completeness_score(result);
    let specificity = specificity_score(result);
    let verifiability = verifiability_score(result);
    let overall_score = (completeness + specificity + verifiability) / 3.0;
    let validation_passed = overall_score >= QUALITY_PASS_MARK;

    let report = DataQualityReport {
        overall_score,
        completeness,
        specificity,
        verifiability,
        validation_passed,
        recommendations: recommendations_for(result, completeness, specificity, verifiability),
    };

    debug!(
        endpoint = %ctx.endpoint,
        overall = report.overall_score,
        passed = report.validation_passed,
        "Scored result quality"
    );
    report
}

fn completeness_score(result: &ProviderResult) -> f64 {
    let mut score = 0.0;
    if !result.content.trim().is_empty() {
        score += 40.0;
    }
    if !result.summary.trim().is_empty() {
        score += 20.0;
    }
    if !result.findings.is_empty() {
        score += 40.0;
    }
    score
}

fn specificity_score(result: &ProviderResult) -> f64 {
    if result.findings.is_empty() {
        // Prose-only results retain a floor when there is real content.
        return if result.content.trim().is_empty() { 0.0 } else { 20.0 };
    }

    let sourced = result
        .findings
        .iter()
        .filter(|f| !f.sources.is_empty())
        .count();
    let verified = result
        .findings
        .iter()
        .filter(|f| f.verification_level > VerificationLevel::Low)
        .count();

    #[allow(clippy::cast_precision_loss)]
    let total = result.findings.len() as f64;
    #[allow(clippy::cast_precision_loss)]
    let score = (sourced as f64 / total) * 60.0 + (verified as f64 / total) * 40.0;
    score.clamp(0.0, 100.0)
}

fn verifiability_score(result: &ProviderResult) -> f64 {
    let distinct: BTreeSet<&str> = result
        .findings
        .iter()
        .flat_map(|f| f.sources.iter().map(String::as_str))
        .collect();

    // 25 points per distinct source, saturating at four sources.
    #[allow(clippy::cast_precision_loss)]
    let score = distinct.len() as f64 * 25.0;
    score.min(100.0)
}

fn recommendations_for(
    result: &ProviderResult,
    completeness: f64,
    specificity: f64,
    verifiability: f64,
) -> Vec<String> {
    let mut items = Vec::new();

    if result.content.trim().is_empty() && result.findings.is_empty() {
        items.push(
            "Result contains no content or findings; re-run the iteration before relying on it."
                .to_string(),
        );
    } else {
        if completeness < 60.0 {
            items.push("Findings are sparse; additional research passes are advisable.".to_string());
        }
        if specificity < 50.0 {
            items.push(
                "Findings lack source or verification metadata; treat as indicative only."
                    .to_string(),
            );
        }
        if verifiability < 50.0 {
            items.push(
                "Insufficient citations; corroborate against independent sources.".to_string(),
            );
        }
    }

    items
}

/// Renders a short human-readable verdict plus the recommendations.
#[must_use]
pub fn generate_quality_summary(report: &DataQualityReport) -> String {
    let verdict = if report.validation_passed {
        "acceptable"
    } else {
        "below the acceptance threshold"
    };

    let mut summary = format!(
        "Data quality is {verdict} (overall {:.0}/100; completeness {:.0}, specificity {:.0}, verifiability {:.0}).",
        report.overall_score, report.completeness, report.specificity, report.verifiability
    );
    for recommendation in &report.recommendations {
        summary.push_str("\n- ");
        summary.push_str(recommendation);
    }
    summary
}
