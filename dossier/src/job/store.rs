//! In-memory job store and lifecycle state machine.
//!
//! Each job is a single-writer record guarded by its own mutex; iteration
//! numbers come from a per-job atomic counter so concurrent starts never
//! produce duplicates. Terminal jobs are immutable: cancel and complete
//! serialize on the job lock and the first terminal write wins.

use crate::consolidation::ConsolidatedAnalysis;
use crate::core::FindingsPayload;
use crate::errors::{DossierError, Result};
use crate::failure::EnhancedError;
use crate::job::{Iteration, IterationStatus, JobStatus, JobType, ResearchJob};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of iterations a job is expected to run.
pub const DEFAULT_EXPECTED_ITERATIONS: u32 = 3;

/// Progress is capped here until the job itself completes.
const RUNNING_PROGRESS_CAP: u8 = 95;

#[derive(Debug)]
struct JobEntry {
    job: Mutex<ResearchJob>,
    /// Monotonic iteration counter; numbers are 1-based and never reused.
    next_iteration: AtomicU32,
    /// Set while a consolidation run is in flight for this job.
    consolidating: AtomicBool,
}

/// Thread-safe store owning all research jobs in this process.
///
/// The store is the only writer of job state; callers receive snapshot
/// clones. Persistence is a host concern layered on top.
pub struct JobStore {
    jobs: DashMap<Uuid, Arc<JobEntry>>,
    expected_iterations: u32,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    /// Creates an empty store with the default expected iteration count.
    #[must_use]
    pub fn new() -> Self {
        Self::with_expected_iterations(DEFAULT_EXPECTED_ITERATIONS)
    }

    /// Creates an empty store expecting `expected` iterations per job.
    #[must_use]
    pub fn with_expected_iterations(expected: u32) -> Self {
        Self {
            jobs: DashMap::new(),
            expected_iterations: expected.max(1),
        }
    }

    /// Submits a new pending job and returns its ID.
    pub fn start_job(
        &self,
        job_type: JobType,
        company: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Uuid {
        let job = ResearchJob::new(job_type, company, user_id);
        let id = job.id;
        info!(job_id = %id, job_type = %job_type, company = %job.company, "Job submitted");
        self.jobs.insert(
            id,
            Arc::new(JobEntry {
                job: Mutex::new(job),
                next_iteration: AtomicU32::new(0),
                consolidating: AtomicBool::new(false),
            }),
        );
        id
    }

    fn entry(&self, id: Uuid) -> Result<Arc<JobEntry>> {
        self.jobs
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(DossierError::JobNotFound(id))
    }

    /// Returns a snapshot of the job.
    pub fn get_job(&self, id: Uuid) -> Result<ResearchJob> {
        let entry = self.entry(id)?;
        let job = entry.job.lock();
        Ok(job.clone())
    }

    /// Starts a new iteration and returns its number.
    ///
    /// Fails with `InvalidState` unless the job is pending or running.
    /// Starting the first iteration of a pending job moves it to running.
    pub fn start_iteration(&self, id: Uuid) -> Result<u32> {
        let entry = self.entry(id)?;
        let mut job = entry.job.lock();

        if !job.status.is_active() {
            return Err(DossierError::invalid_state(format!(
                "cannot start iteration: job is {}",
                job.status
            )));
        }
        if job.status == JobStatus::Pending {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
        }

        let number = entry.next_iteration.fetch_add(1, Ordering::SeqCst) + 1;
        job.iterations.push(Iteration::new(number));
        job.updated_at = Utc::now();

        debug!(job_id = %id, iteration = number, "Iteration started");
        Ok(number)
    }

    /// Completes an iteration with its findings and quality scores, and
    /// advances job progress.
    pub fn complete_iteration(
        &self,
        id: Uuid,
        number: u32,
        findings: FindingsPayload,
        confidence_score: f64,
        data_completeness_score: f64,
    ) -> Result<()> {
        let entry = self.entry(id)?;
        let mut job = entry.job.lock();

        // Cancel wins if it landed first: the job is terminal and the
        // iteration result is discarded.
        if job.status.is_terminal() {
            return Err(DossierError::invalid_state(format!(
                "cannot complete iteration: job is {}",
                job.status
            )));
        }

        let iteration = find_running(&mut job, id, number)?;
        iteration.status = IterationStatus::Completed;
        iteration.findings = Some(findings);
        iteration.confidence_score = confidence_score.clamp(0.0, 1.0);
        iteration.data_completeness_score = data_completeness_score.clamp(0.0, 100.0);
        iteration.finished_at = Some(Utc::now());

        self.advance_progress(&mut job);
        job.updated_at = Utc::now();

        debug!(job_id = %id, iteration = number, progress = job.progress, "Iteration completed");
        Ok(())
    }

    /// Records a classified error and marks the iteration failed.
    ///
    /// A failed iteration does not fail the job; jobs fail only through
    /// [`JobStore::fail_job_if_exhausted`].
    pub fn fail_iteration(&self, id: Uuid, number: u32, error: EnhancedError) -> Result<()> {
        let entry = self.entry(id)?;
        let mut job = entry.job.lock();

        if job.status.is_terminal() {
            return Err(DossierError::invalid_state(format!(
                "cannot fail iteration: job is {}",
                job.status
            )));
        }

        let iteration = find_running(&mut job, id, number)?;
        iteration.status = IterationStatus::Failed;
        iteration.error = Some(error);
        iteration.finished_at = Some(Utc::now());
        job.updated_at = Utc::now();

        warn!(job_id = %id, iteration = number, "Iteration failed");
        Ok(())
    }

    /// Fails the job if its exhaustion policy is met: at least
    /// `max_attempts` terminal iterations and none of them successful.
    /// Returns true if the job transitioned to failed.
    pub fn fail_job_if_exhausted(&self, id: Uuid, max_attempts: u32) -> Result<bool> {
        let entry = self.entry(id)?;
        let mut job = entry.job.lock();

        if job.status.is_terminal() {
            return Ok(false);
        }

        let terminal = job
            .iterations
            .iter()
            .filter(|i| i.status.is_terminal())
            .count();
        let any_success = job.iterations.iter().any(Iteration::is_completed);

        if any_success || (terminal as u32) < max_attempts {
            return Ok(false);
        }

        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.updated_at = Utc::now();
        warn!(job_id = %id, attempts = terminal, "Job failed: iteration attempts exhausted");
        Ok(true)
    }

    /// Completes a running job, forcing progress to 100.
    pub fn complete_job(&self, id: Uuid) -> Result<()> {
        let entry = self.entry(id)?;
        let mut job = entry.job.lock();

        if job.status != JobStatus::Running {
            return Err(DossierError::invalid_state(format!(
                "cannot complete job: job is {}",
                job.status
            )));
        }

        job.status = JobStatus::Completed;
        job.progress = 100;
        job.completed_at = Some(Utc::now());
        job.updated_at = Utc::now();
        info!(job_id = %id, "Job completed");
        Ok(())
    }

    /// Cancels a pending or running job. Terminal, and rejected with
    /// `InvalidState` when the job already reached a terminal state.
    pub fn cancel_job(&self, id: Uuid) -> Result<()> {
        let entry = self.entry(id)?;
        let mut job = entry.job.lock();

        if job.status.is_terminal() {
            return Err(DossierError::invalid_state(format!(
                "cannot cancel: job is already {}",
                job.status
            )));
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        job.updated_at = Utc::now();
        info!(job_id = %id, "Job cancelled");
        Ok(())
    }

    /// Recomputes progress from completed iterations. Monotone
    /// non-decreasing, capped below 100 until the job completes.
    fn advance_progress(&self, job: &mut ResearchJob) {
        let completed = job.iterations.iter().filter(|i| i.is_completed()).count();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let fraction =
            ((completed as f64 / f64::from(self.expected_iterations)) * 100.0).round() as u8;
        job.progress = job.progress.max(fraction.min(RUNNING_PROGRESS_CAP));
    }

    /// Claims the per-job consolidation slot and returns a snapshot of the
    /// completed iterations. At most one permit exists per job at a time;
    /// a second concurrent claim fails with `Conflict`.
    ///
    /// With `force=false` an existing analysis fails the claim with
    /// `AlreadyExists`, leaving the prior result untouched.
    pub(crate) fn claim_consolidation(&self, id: Uuid, force: bool) -> Result<ConsolidationPermit> {
        let entry = self.entry(id)?;

        if entry
            .consolidating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DossierError::conflict(format!(
                "consolidation already in flight for job {id}"
            )));
        }

        let snapshot = {
            let job = entry.job.lock();
            if matches!(job.status, JobStatus::Failed | JobStatus::Cancelled) {
                entry.consolidating.store(false, Ordering::SeqCst);
                return Err(DossierError::invalid_state(format!(
                    "cannot consolidate: job is {}",
                    job.status
                )));
            }
            if job.consolidated_analysis.is_some() && !force {
                entry.consolidating.store(false, Ordering::SeqCst);
                return Err(DossierError::AlreadyExists(id));
            }
            job.iterations
                .iter()
                .filter(|i| i.is_completed())
                .cloned()
                .collect()
        };

        Ok(ConsolidationPermit {
            entry,
            job_id: id,
            snapshot,
        })
    }
}

fn find_running<'a>(
    job: &'a mut ResearchJob,
    id: Uuid,
    number: u32,
) -> Result<&'a mut Iteration> {
    let iteration = job
        .iterations
        .iter_mut()
        .find(|i| i.number == number)
        .ok_or(DossierError::IterationNotFound { job_id: id, number })?;

    if iteration.status != IterationStatus::Running {
        return Err(DossierError::invalid_state(format!(
            "iteration {number} is already {}",
            iteration.status
        )));
    }
    Ok(iteration)
}

/// Exclusive permission to run one consolidation for one job.
///
/// Dropping the permit releases the slot, so an engine error cannot leave
/// the job permanently locked against consolidation.
#[derive(Debug)]
pub(crate) struct ConsolidationPermit {
    entry: Arc<JobEntry>,
    job_id: Uuid,
    snapshot: Vec<Iteration>,
}

impl ConsolidationPermit {
    /// The completed iterations captured when the permit was claimed.
    pub(crate) fn completed_iterations(&self) -> &[Iteration] {
        &self.snapshot
    }

    /// Writes the analysis onto the job in one atomic step and releases
    /// the permit.
    pub(crate) fn commit(self, analysis: ConsolidatedAnalysis) {
        let mut job = self.entry.job.lock();
        job.requires_attention = analysis.requires_immediate_attention;
        job.consolidated_analysis = Some(analysis);
        job.updated_at = Utc::now();
        debug!(job_id = %self.job_id, "Consolidated analysis committed");
        // Drop impl releases the consolidating flag.
    }
}

impl Drop for ConsolidationPermit {
    fn drop(&mut self) {
        self.entry.consolidating.store(false, Ordering::SeqCst);
    }
}
