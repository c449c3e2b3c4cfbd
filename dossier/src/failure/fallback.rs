//! Intelligent fallback generation.
//!
//! When real data cannot be obtained, the system degrades into structurally
//! valid, clearly-labeled low-confidence results instead of nulls or errors.
//! Downstream consolidation and reporting never special-case a failure.

use crate::core::{ProviderContext, ProviderResult, VerificationLevel};
use crate::failure::{EnhancedError, ErrorCategory};

/// Confidence attached to fallback results.
const FALLBACK_CONFIDENCE: f64 = 0.1;
/// Completeness attached to fallback results.
const FALLBACK_COMPLETENESS: f64 = 10.0;

/// Builds a fallback result for a classified failure.
///
/// The result has the same shape as a real provider response: non-empty
/// content with a stated methodology note, an empty findings list, low
/// confidence and completeness, and at least one limitation and one
/// recommendation.
#[must_use]
pub fn apply_intelligent_fallback(error: &EnhancedError, ctx: &ProviderContext) -> ProviderResult {
    let mut result = professional_limited_data_response(&ctx.company, &ctx.job_type, ctx);

    result.limitations.insert(
        0,
        format!(
            "Automated research was interrupted by a {} failure ({} severity); the affected pass contributed no findings.",
            error.category, error.severity
        ),
    );
    result
        .recommendations
        .extend(error.suggested_actions.iter().cloned());
    result.summary = format!(
        "Limited-data response for {}: {}",
        display_company(&ctx.company),
        error.user_message
    );

    if error.category == ErrorCategory::Authentication {
        result.recommendations.insert(
            0,
            "Escalate to an administrator before re-running this research job".to_string(),
        );
    }

    tracing::info!(
        endpoint = %ctx.endpoint,
        category = %error.category,
        "Generated intelligent fallback result"
    );

    result
}

/// Builds a professional limited-data response directly, for situations
/// where no usable data is available and no specific error is on hand.
#[must_use]
pub fn professional_limited_data_response(
    company: &str,
    job_type: &str,
    ctx: &ProviderContext,
) -> ProviderResult {
    let company = display_company(company);
    let job_type = if job_type.is_empty() {
        "due diligence"
    } else {
        job_type
    };

    let content = format!(
        "## {job_type} research: {company}\n\n\
         Automated research could not obtain sufficient verifiable data for this \
         request. This response is a professional limited-data placeholder and must \
         be treated as indicative only.\n\n\
         Methodology: findings in this system are gathered from third-party data \
         providers across multiple research passes, de-duplicated, and scored for \
         confidence and completeness before consolidation. This pass contributed no \
         verifiable findings; any conclusions should await a successful re-run or \
         manual review."
    );

    let mut result = ProviderResult::new(
        content,
        format!("No verifiable {job_type} data is currently available for {company}."),
    )
    .with_confidence(FALLBACK_CONFIDENCE)
    .with_completeness(FALLBACK_COMPLETENESS)
    .with_verification(VerificationLevel::Low);

    match ctx.iteration {
        Some(n) => result.limitations.push(format!(
            "No provider data was available for {company} during research pass {n}."
        )),
        None => result.limitations.push(format!(
            "No provider data was available for {company} during this pass."
        )),
    }
    result.recommendations.push(
        "Re-run this research job once provider availability is restored, or corroborate manually against primary sources.".to_string(),
    );
    result
}

fn display_company(company: &str) -> &str {
    if company.is_empty() {
        "the requested company"
    } else {
        company
    }
}
