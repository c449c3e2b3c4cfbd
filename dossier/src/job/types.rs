//! Job and iteration types.

use crate::consolidation::ConsolidatedAnalysis;
use crate::core::FindingsPayload;
use crate::failure::EnhancedError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of research a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Directors and officers screening.
    Directors,
    /// Legal history and disputes.
    Legal,
    /// Adverse media screening.
    NegativeNews,
    /// Regulatory filings and sanctions.
    Regulatory,
    /// Related entities and ownership structure.
    RelatedEntities,
    /// Everything at once.
    FullDueDiligence,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directors => write!(f, "directors"),
            Self::Legal => write!(f, "legal"),
            Self::NegativeNews => write!(f, "negative_news"),
            Self::Regulatory => write!(f, "regulatory"),
            Self::RelatedEntities => write!(f, "related_entities"),
            Self::FullDueDiligence => write!(f, "full_due_diligence"),
        }
    }
}

/// The lifecycle status of a research job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted but not yet started.
    Pending,
    /// Iterations are executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Exhausted without a successful iteration.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl JobStatus {
    /// Returns true if the status is terminal; terminal jobs are immutable.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if new iterations may start in this status.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// The status of a single iteration within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    /// Currently executing.
    Running,
    /// Finished with findings.
    Completed,
    /// Finished with a classified error.
    Failed,
}

impl fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl IterationStatus {
    /// Returns true once the iteration has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One research pass within a job. Immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Iteration {
    /// 1-based, monotonic per job; never reused.
    pub number: u32,
    /// Current status.
    pub status: IterationStatus,
    /// Structured findings, present once completed.
    pub findings: Option<FindingsPayload>,
    /// Confidence in this pass, 0.0..=1.0.
    pub confidence_score: f64,
    /// Data completeness for this pass, 0.0..=100.0.
    pub data_completeness_score: f64,
    /// The classified error, present once failed.
    pub error: Option<EnhancedError>,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// When the pass reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Iteration {
    /// Creates a new running iteration.
    #[must_use]
    pub fn new(number: u32) -> Self {
        Self {
            number,
            status: IterationStatus::Running,
            findings: None,
            confidence_score: 0.0,
            data_completeness_score: 0.0,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Returns true if the iteration completed with findings.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == IterationStatus::Completed
    }
}

/// A long-lived research job against a target company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchJob {
    /// Unique job ID.
    pub id: Uuid,
    /// Owning user.
    pub user_id: String,
    /// Target company.
    pub company: String,
    /// What kind of research this job performs.
    pub job_type: JobType,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Progress percentage, 0..=100. `Completed` implies 100.
    pub progress: u8,
    /// Ordered research passes.
    pub iterations: Vec<Iteration>,
    /// The consolidated analysis, once produced.
    pub consolidated_analysis: Option<ConsolidatedAnalysis>,
    /// True when consolidation flagged high-severity findings.
    pub requires_attention: bool,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// When execution began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Bumped on every transition.
    pub updated_at: DateTime<Utc>,
}

impl ResearchJob {
    /// Creates a new pending job.
    #[must_use]
    pub fn new(job_type: JobType, company: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            company: company.into(),
            job_type,
            status: JobStatus::Pending,
            progress: 0,
            iterations: Vec::new(),
            consolidated_analysis: None,
            requires_attention: false,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Returns the completed iterations in order.
    #[must_use]
    pub fn completed_iterations(&self) -> Vec<&Iteration> {
        self.iterations.iter().filter(|i| i.is_completed()).collect()
    }

    /// Looks up an iteration by number.
    #[must_use]
    pub fn iteration(&self, number: u32) -> Option<&Iteration> {
        self.iterations.iter().find(|i| i.number == number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_job_status_active() {
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(!JobStatus::Cancelled.is_active());
    }

    #[test]
    fn test_job_status_serialize() {
        let json = serde_json::to_string(&JobStatus::Running).unwrap();
        assert_eq!(json, r#""running""#);
    }

    #[test]
    fn test_new_job_defaults() {
        let job = ResearchJob::new(JobType::Directors, "Acme Corp", "user-1");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.iterations.is_empty());
        assert!(job.consolidated_analysis.is_none());
        assert!(!job.requires_attention);
    }

    #[test]
    fn test_completed_iterations_filter() {
        let mut job = ResearchJob::new(JobType::Legal, "Acme", "u");
        let mut a = Iteration::new(1);
        a.status = IterationStatus::Completed;
        let b = Iteration::new(2);
        job.iterations = vec![a, b];

        let completed = job.completed_iterations();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].number, 1);
    }
}
