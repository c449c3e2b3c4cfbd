//! # Dossier
//!
//! The resilience-and-consolidation core for long-running company research
//! jobs. Dossier runs multi-iteration research against unreliable
//! third-party data providers, merges their partial and sometimes
//! contradictory outputs into a single trustworthy analysis, and shields
//! the host application from provider failures:
//!
//! - **Job lifecycle**: a state machine over jobs and their iterations
//! - **Consolidation**: merge strategies with confidence and completeness
//!   scoring
//! - **Failure handling**: error classification and intelligent fallbacks
//!   so provider outages degrade confidence instead of aborting jobs
//! - **Circuit breaking**: per-endpoint breakers with bounded retry and
//!   backoff
//! - **Quality validation**: advisory scoring of any result before it is
//!   trusted downstream
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dossier::prelude::*;
//!
//! let store = JobStore::new();
//! let job_id = store.start_job(JobType::FullDueDiligence, "Acme Corp", "user-1");
//!
//! let handler = FailureHandler::new(
//!     CircuitBreakerRegistry::default(),
//!     FailureHandlerConfig::default(),
//! );
//! let outcome = handler.execute("SEARCH_API", fetch_findings, &ctx).await;
//!
//! let n = store.start_iteration(job_id)?;
//! store.complete_iteration(job_id, n, findings, 0.8, 75.0)?;
//!
//! let engine = ConsolidationEngine::new();
//! let analysis = engine.consolidate(&store, job_id, ConsolidationStrategy::Comprehensive, false)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod consolidation;
pub mod core;
pub mod errors;
pub mod failure;
pub mod job;
pub mod quality;
pub mod resilience;


/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::consolidation::{
        ConsolidatedAnalysis, ConsolidationEngine, ConsolidationStatus, ConsolidationStrategy,
    };
    pub use crate::core::{
        EntityCategory, Finding, FindingsPayload, ProviderContext, ProviderFailure,
        ProviderResult, Severity, VerificationLevel,
    };
    pub use crate::errors::{DossierError, Result};
    pub use crate::failure::{
        apply_intelligent_fallback, classify_error, professional_limited_data_response,
        EnhancedError, ErrorCategory, FallbackStrategy,
    };
    pub use crate::job::{
        Iteration, IterationStatus, JobStatus, JobStore, JobType, ResearchJob,
    };
    pub use crate::quality::{
        generate_quality_summary, validate_data_quality, DataQualityReport,
    };
    pub use crate::resilience::{
        BreakerConfig, BreakerState, CallOutcome, CircuitBreakerRegistry, FailureHandler,
        FailureHandlerConfig, HealthReport,
    };
}
