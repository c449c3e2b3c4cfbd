//! Failure classification and intelligent fallbacks.
//!
//! This module provides:
//! - Keyword/status-code driven classification of raw provider failures
//! - Structurally complete, clearly-labeled low-confidence fallback results
//! - A heuristic success-rate estimator for retry planning

mod classifier;
mod fallback;

pub use classifier::{
    classify_error, estimate_success_rate, EnhancedError, ErrorCategory, FallbackStrategy,
};
pub use fallback::{
    apply_intelligent_fallback, professional_limited_data_response,
};
