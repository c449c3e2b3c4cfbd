//! Findings consolidation.
//!
//! This module provides:
//! - The consolidated-analysis data model
//! - Merge strategies over completed iterations
//! - Public, pure scoring helpers (confidence weighting, agreement bonus,
//!   verification tiers)

mod analysis;
mod engine;

pub use analysis::{
    CategoryAnalysis, ConsolidatedAnalysis, ConsolidationStatus, ConsolidationStrategy,
};
pub use engine::{
    agreement_bonus, completeness_mean, dedup_findings, merge_category, verification_level_for,
    weighted_confidence, ConsolidationEngine,
};
