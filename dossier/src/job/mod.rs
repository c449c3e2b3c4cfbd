//! Research job and iteration lifecycle.
//!
//! This module provides:
//! - Job and iteration types with status enums
//! - The in-memory job store and its state machine
//! - Atomic iteration numbering and progress tracking

mod store;
mod types;

pub use store::{JobStore, DEFAULT_EXPECTED_ITERATIONS};
pub use types::{Iteration, IterationStatus, JobStatus, JobType, ResearchJob};
