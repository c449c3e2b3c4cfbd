//! Core data types shared across the research pipeline.
//!
//! This module provides:
//! - Findings, severities, and verification levels
//! - The closed set of entity categories a research pass reports on
//! - Provider call inputs and outputs

mod finding;
mod provider;

pub use finding::{
    EntityCategory, Finding, FindingsPayload, Severity, VerificationLevel,
};
pub use provider::{ProviderContext, ProviderFailure, ProviderResult};
