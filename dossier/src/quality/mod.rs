//! Data quality validation.
//!
//! Scores any provider result, real or fallback, before it is trusted
//! downstream. Advisory only: a failing score never blocks the pipeline,
//! it attaches recommendations and leaves the decision to the caller.

mod validator;

pub use validator::{
    generate_quality_summary, validate_data_quality, DataQualityReport, QUALITY_PASS_MARK,
};
