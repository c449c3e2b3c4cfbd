//! The findings consolidation engine.
//!
//! Merges a job's completed iterations into one authoritative analysis.
//! The scoring helpers are public pure functions so administrative surfaces
//! can reuse them without reaching into engine internals.

use crate::consolidation::{
    CategoryAnalysis, ConsolidatedAnalysis, ConsolidationStatus, ConsolidationStrategy,
};
use crate::core::{EntityCategory, Finding, VerificationLevel};
use crate::errors::{DossierError, Result};
use crate::job::{Iteration, JobStore};
use chrono::Utc;
use std::collections::BTreeSet;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Minimum completed iterations a consolidation needs.
const MIN_ITERATIONS: usize = 2;

/// Iterations below this completeness are treated as low-quality sources by
/// the comprehensive strategy. Deliberately equal to the data-quality
/// validator's pass mark so the two layers agree on "low quality".
const LOW_QUALITY_THRESHOLD: f64 = 40.0;

/// Maximum cross-corroboration bonus applied to the confidence score.
const MAX_AGREEMENT_BONUS: f64 = 0.1;
/// Bonus per independently corroborated high-severity finding.
const AGREEMENT_BONUS_STEP: f64 = 0.05;

/// Merges completed iterations into consolidated analyses.
#[derive(Debug, Clone)]
pub struct ConsolidationEngine {
    low_quality_threshold: f64,
}

impl Default for ConsolidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsolidationEngine {
    /// Creates an engine with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            low_quality_threshold: LOW_QUALITY_THRESHOLD,
        }
    }

    /// Overrides the low-quality completeness threshold used by the
    /// comprehensive strategy.
    #[must_use]
    pub fn with_low_quality_threshold(mut self, threshold: f64) -> Self {
        self.low_quality_threshold = threshold;
        self
    }

    /// Consolidates the job's completed iterations into one analysis and
    /// writes it onto the job atomically.
    ///
    /// Fails with `InsufficientData` below two completed iterations, with
    /// `AlreadyExists` when an analysis exists and `force` is false, and
    /// with `Conflict` when another consolidation is in flight for the job.
    /// `force=true` replaces the prior analysis wholesale.
    pub fn consolidate(
        &self,
        store: &JobStore,
        job_id: Uuid,
        strategy: ConsolidationStrategy,
        force: bool,
    ) -> Result<ConsolidatedAnalysis> {
        let permit = store.claim_consolidation(job_id, force)?;

        let iterations = permit.completed_iterations();
        if iterations.len() < MIN_ITERATIONS {
            return Err(DossierError::InsufficientData {
                found: iterations.len(),
                required: MIN_ITERATIONS,
            });
        }

        let analysis = self.build_analysis(iterations, strategy);
        info!(
            %job_id,
            strategy = %strategy,
            iterations = iterations.len(),
            confidence = analysis.overall_confidence_score,
            "Consolidation complete"
        );
        permit.commit(analysis.clone());
        Ok(analysis)
    }

    /// Read-only consolidation status for a job.
    pub fn status(&self, store: &JobStore, job_id: Uuid) -> Result<ConsolidationStatus> {
        let job = store.get_job(job_id)?;
        let completed = job.completed_iterations().len();
        let existing = job.consolidated_analysis.as_ref();

        Ok(ConsolidationStatus {
            job_id,
            completed_iterations: completed,
            has_analysis: existing.is_some(),
            strategy: existing.map(|a| a.strategy),
            consolidated_at: existing.map(|a| a.consolidated_at),
            can_consolidate: completed >= MIN_ITERATIONS
                && existing.is_none()
                && job.status != crate::job::JobStatus::Failed
                && job.status != crate::job::JobStatus::Cancelled,
        })
    }

    /// Builds an analysis from a snapshot of completed iterations. Pure:
    /// the same iteration set and strategy always produce the same merged
    /// content and scores.
    #[must_use]
    pub fn build_analysis(
        &self,
        iterations: &[Iteration],
        strategy: ConsolidationStrategy,
    ) -> ConsolidatedAnalysis {
        let mut ordered: Vec<&Iteration> = iterations.iter().collect();
        ordered.sort_by_key(|i| i.number);

        let categories: Vec<CategoryAnalysis> = EntityCategory::ALL
            .iter()
            .map(|&category| {
                let findings = match strategy {
                    ConsolidationStrategy::Merge => merge_category(&ordered, category),
                    ConsolidationStrategy::Latest => latest_category(&ordered, category),
                    ConsolidationStrategy::Comprehensive => {
                        comprehensive_category(&ordered, category, self.low_quality_threshold)
                    }
                };
                CategoryAnalysis::new(category, findings)
            })
            .collect();

        let base_confidence = weighted_confidence(&ordered);
        let bonus = agreement_bonus(&ordered);
        let overall_confidence_score = (base_confidence + bonus).clamp(0.0, 1.0);
        let data_completeness_score = completeness_mean(&ordered);
        let requires_immediate_attention =
            categories.iter().any(CategoryAnalysis::has_alarming_findings);

        ConsolidatedAnalysis {
            strategy,
            iterations_included: ordered.iter().map(|i| i.number).collect(),
            follow_up_required: follow_ups(&categories, overall_confidence_score),
            categories,
            overall_confidence_score,
            data_completeness_score,
            verification_level: verification_level_for(overall_confidence_score),
            requires_immediate_attention,
            consolidated_at: Utc::now(),
        }
    }
}

/// De-duplicates findings by normalized title/description fingerprint.
///
/// Duplicates are folded into one finding keeping the higher verification
/// level and severity and the union of source citations, in first-seen
/// order.
#[must_use]
pub fn dedup_findings(findings: &[Finding]) -> Vec<Finding> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, Finding> = HashMap::new();

    for finding in findings {
        let key = finding.fingerprint();
        match merged.get_mut(&key) {
            Some(existing) => fold_duplicate(existing, finding),
            None => {
                order.push(key.clone());
                merged.insert(key, finding.clone());
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| merged.remove(&key))
        .collect()
}

fn fold_duplicate(existing: &mut Finding, duplicate: &Finding) {
    existing.severity = existing.severity.max(duplicate.severity);
    existing.verification_level = existing.verification_level.max(duplicate.verification_level);
    for source in &duplicate.sources {
        if !existing.sources.contains(source) {
            existing.sources.push(source.clone());
        }
    }
}

/// Union of a category's findings across iterations, de-duplicated.
#[must_use]
pub fn merge_category(iterations: &[&Iteration], category: EntityCategory) -> Vec<Finding> {
    let all: Vec<Finding> = iterations
        .iter()
        .filter_map(|i| i.findings.as_ref())
        .flat_map(|p| p.category(category).iter().cloned())
        .collect();
    dedup_findings(&all)
}

/// The most recent iteration's non-empty findings for a category.
fn latest_category(iterations: &[&Iteration], category: EntityCategory) -> Vec<Finding> {
    iterations
        .iter()
        .rev()
        .filter_map(|i| i.findings.as_ref())
        .map(|p| p.category(category))
        .find(|findings| !findings.is_empty())
        .map(dedup_findings)
        .unwrap_or_default()
}

/// Merge with quality filtering: items reported only by iterations whose
/// completeness is below `threshold` are dropped, unless no included
/// iteration meets the threshold at all.
fn comprehensive_category(
    iterations: &[&Iteration],
    category: EntityCategory,
    threshold: f64,
) -> Vec<Finding> {
    let any_good_source = iterations
        .iter()
        .any(|i| i.data_completeness_score >= threshold);

    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, (Finding, f64)> = HashMap::new();

    for iteration in iterations {
        let Some(payload) = iteration.findings.as_ref() else {
            continue;
        };
        for finding in payload.category(category) {
            let key = finding.fingerprint();
            match merged.get_mut(&key) {
                Some((existing, best_completeness)) => {
                    fold_duplicate(existing, finding);
                    *best_completeness = best_completeness.max(iteration.data_completeness_score);
                }
                None => {
                    order.push(key.clone());
                    merged.insert(key, (finding.clone(), iteration.data_completeness_score));
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| merged.remove(&key))
        .filter(|(_, best)| !any_good_source || *best >= threshold)
        .map(|(finding, _)| finding)
        .collect()
}

/// Weighted mean of iteration confidence scores.
///
/// Weights grow with recency (chronological rank) and with the iteration's
/// data completeness, so a recent, complete pass counts for more than an
/// early, thin one. Always within `[0, 1]`.
#[must_use]
pub fn weighted_confidence(iterations: &[&Iteration]) -> f64 {
    if iterations.is_empty() {
        return 0.0;
    }

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (rank, iteration) in iterations.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let recency = (rank + 1) as f64;
        let completeness = 0.5 + iteration.data_completeness_score.clamp(0.0, 100.0) / 200.0;
        let weight = recency * completeness;
        weighted_sum += iteration.confidence_score.clamp(0.0, 1.0) * weight;
        weight_total += weight;
    }

    (weighted_sum / weight_total).clamp(0.0, 1.0)
}

/// Cross-corroboration bonus: high/critical findings reported by two or
/// more distinct iterations earn [`AGREEMENT_BONUS_STEP`] each, capped at
/// [`MAX_AGREEMENT_BONUS`].
#[must_use]
pub fn agreement_bonus(iterations: &[&Iteration]) -> f64 {
    let mut reporters: HashMap<String, BTreeSet<u32>> = HashMap::new();

    for iteration in iterations {
        let Some(payload) = iteration.findings.as_ref() else {
            continue;
        };
        for category in EntityCategory::ALL {
            for finding in payload.category(category) {
                if finding.severity.is_alarming() {
                    reporters
                        .entry(finding.fingerprint())
                        .or_default()
                        .insert(iteration.number);
                }
            }
        }
    }

    let corroborated = reporters.values().filter(|set| set.len() >= 2).count();
    #[allow(clippy::cast_precision_loss)]
    (corroborated as f64 * AGREEMENT_BONUS_STEP).min(MAX_AGREEMENT_BONUS)
}

/// Mean of per-iteration completeness, within `[0, 100]`.
#[must_use]
pub fn completeness_mean(iterations: &[&Iteration]) -> f64 {
    if iterations.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = iterations
        .iter()
        .map(|i| i.data_completeness_score.clamp(0.0, 100.0))
        .sum::<f64>()
        / iterations.len() as f64;
    mean.clamp(0.0, 100.0)
}

/// Maps a confidence score to a verification tier: above 0.8 is high,
/// 0.6 and above is medium, anything lower is low.
#[must_use]
pub fn verification_level_for(confidence: f64) -> VerificationLevel {
    if confidence > 0.8 {
        VerificationLevel::High
    } else if confidence >= 0.6 {
        VerificationLevel::Medium
    } else {
        VerificationLevel::Low
    }
}

fn follow_ups(categories: &[CategoryAnalysis], confidence: f64) -> Vec<String> {
    let mut items = Vec::new();

    for analysis in categories {
        if analysis.findings.is_empty() {
            items.push(format!(
                "No verifiable {} data; source it manually or re-run the job.",
                analysis.category
            ));
        }
    }
    if categories.iter().any(CategoryAnalysis::has_alarming_findings) {
        items.push(
            "Review high-severity findings with legal or compliance before proceeding.".to_string(),
        );
    }
    if verification_level_for(confidence) == VerificationLevel::Low {
        items.push(
            "Overall confidence is low; corroborate against primary sources before relying on this analysis.".to_string(),
        );
    }

    items
}
