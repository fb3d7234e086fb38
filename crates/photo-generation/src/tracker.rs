//! Generation tracking
//!
//! Polls `GET /generation-jobs/{id}` and folds each response into the job's
//! asset list. The list only grows: each response contributes the tail past
//! what has already been seen, so repeated or out-of-date responses add
//! nothing and never replace assets a caller has already rendered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use photo_core::{
    Asset, Clock, GenerationJob, GenerationStatus, JobId, JobProgress, JobStatus, PollOptions,
    PollingController, ProbeOutcome, StudioApi, StudioConfig,
};
use tokio::sync::watch;

use crate::error::{GenerationError, Result};

/// Polling key of a job
pub fn poll_key(job_id: &JobId) -> String {
    format!("generation:{job_id}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackerTimings {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for TrackerTimings {
    fn default() -> Self {
        Self::from(&StudioConfig::default())
    }
}

impl From<&StudioConfig> for TrackerTimings {
    fn from(config: &StudioConfig) -> Self {
        Self {
            interval: config.generation_poll_interval,
            deadline: config.generation_poll_deadline,
        }
    }
}

/// What a progress view renders
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationSnapshot {
    pub job_id: JobId,
    pub status: GenerationStatus,
    pub progress: JobProgress,
    pub assets: Vec<Asset>,
}

/// How tracking ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed(GenerationJob),
    Failed(GenerationJob),
    /// No terminal status within the deadline; the job may still finish server-side
    TimedOut {
        job: GenerationJob,
        deadline: Duration,
    },
    /// Tracking was stopped by the caller
    Stopped(GenerationJob),
}

impl GenerationOutcome {
    pub const fn job(&self) -> &GenerationJob {
        match self {
            Self::Completed(job) | Self::Failed(job) | Self::Stopped(job) => job,
            Self::TimedOut { job, .. } => job,
        }
    }

    /// Failures and timeouts map to errors
    pub fn into_result(self) -> Result<GenerationJob> {
        match self {
            Self::Completed(job) | Self::Stopped(job) => Ok(job),
            Self::Failed(job) => Err(GenerationError::JobFailed(job.job_id)),
            Self::TimedOut { job, deadline } => Err(GenerationError::DeadlineExceeded {
                job_id: job.job_id,
                deadline,
            }),
        }
    }
}

struct TrackerInner {
    api: Arc<dyn StudioApi>,
    polls: PollingController,
    clock: Arc<dyn Clock>,
    key: String,
    job: Mutex<GenerationJob>,
    progress: Mutex<JobProgress>,
    live: AtomicBool,
    snapshot: watch::Sender<GenerationSnapshot>,
    outcome: watch::Sender<Option<GenerationOutcome>>,
}

impl TrackerInner {
    fn job(&self) -> MutexGuard<'_, GenerationJob> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn apply(&self, status: &JobStatus) -> ProbeOutcome {
        if !self.is_live() {
            return ProbeOutcome::Done;
        }

        let mut job = self.job();
        let appended = job.append_delta(&status.assets, self.clock.now());
        job.status = status.status;
        let progress = {
            let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
            *progress = status.progress;
            *progress
        };

        tracing::debug!(
            job_id = %job.job_id,
            appended,
            received = job.completed.len(),
            completed = progress.completed,
            total = progress.total,
            "Generation progress"
        );
        self.snapshot.send_replace(GenerationSnapshot {
            job_id: job.job_id.clone(),
            status: job.status,
            progress,
            assets: job.completed.clone(),
        });

        let outcome = match status.status {
            GenerationStatus::Processing => return ProbeOutcome::Continue,
            GenerationStatus::Completed => GenerationOutcome::Completed(job.clone()),
            GenerationStatus::Failed => GenerationOutcome::Failed(job.clone()),
        };
        drop(job);
        self.finish(outcome);
        ProbeOutcome::Done
    }

    fn finish(&self, outcome: GenerationOutcome) {
        if self.live.swap(false, Ordering::AcqRel) {
            let job = outcome.job();
            tracing::info!(
                job_id = %job.job_id,
                assets = job.completed.len(),
                outcome = outcome_label(&outcome),
                "Generation tracking finished"
            );
            self.outcome.send_replace(Some(outcome));
        }
    }
}

const fn outcome_label(outcome: &GenerationOutcome) -> &'static str {
    match outcome {
        GenerationOutcome::Completed(_) => "completed",
        GenerationOutcome::Failed(_) => "failed",
        GenerationOutcome::TimedOut { .. } => "timed_out",
        GenerationOutcome::Stopped(_) => "stopped",
    }
}

/// Live view of one generation job
#[derive(Clone)]
pub struct GenerationTracker {
    inner: Arc<TrackerInner>,
}

impl GenerationTracker {
    /// Start polling `job`; the first probe runs immediately.
    pub fn start(
        api: Arc<dyn StudioApi>,
        polls: PollingController,
        clock: Arc<dyn Clock>,
        job: GenerationJob,
        timings: TrackerTimings,
    ) -> Result<Self> {
        let key = poll_key(&job.job_id);
        let (snapshot, _) = watch::channel(GenerationSnapshot {
            job_id: job.job_id.clone(),
            status: job.status,
            progress: JobProgress::default(),
            assets: job.completed.clone(),
        });
        let (outcome, _) = watch::channel(None);

        let inner = Arc::new(TrackerInner {
            api,
            polls: polls.clone(),
            clock,
            key: key.clone(),
            job: Mutex::new(job),
            progress: Mutex::new(JobProgress::default()),
            live: AtomicBool::new(true),
            snapshot,
            outcome,
        });

        let probe_inner = inner.clone();
        let timeout_inner = inner.clone();
        let error_key = key.clone();
        let options = PollOptions::every(timings.interval)
            .deadline(timings.deadline)
            .on_timeout(move |timeout| {
                tracing::warn!(key = %timeout.key, attempts = timeout.attempts, "Generation wait timed out");
                let job = timeout_inner.job().clone();
                timeout_inner.finish(GenerationOutcome::TimedOut {
                    job,
                    deadline: timings.deadline,
                });
            })
            .on_error(move |e| {
                tracing::warn!(key = %error_key, error = %e, "Generation status check failed");
            });

        polls.start(key, move || probe(probe_inner.clone()), options)?;
        tracing::info!(job_id = %inner.job().job_id, "Tracking generation job");
        Ok(Self { inner })
    }

    pub fn job_id(&self) -> JobId {
        self.inner.job().job_id.clone()
    }

    /// Current job, including every asset received so far
    pub fn job(&self) -> GenerationJob {
        self.inner.job().clone()
    }

    pub fn snapshot(&self) -> GenerationSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn outcome(&self) -> Option<GenerationOutcome> {
        self.inner.outcome.borrow().clone()
    }

    pub fn is_live(&self) -> bool {
        self.inner.is_live()
    }

    /// Wait for tracking to end
    pub async fn wait(&self) -> GenerationOutcome {
        let mut outcomes = self.inner.outcome.subscribe();
        loop {
            let current = outcomes.borrow_and_update().clone();
            if let Some(outcome) = current {
                return outcome;
            }
            // The sender lives in `inner`, which `self` keeps alive.
            if outcomes.changed().await.is_err() {
                return GenerationOutcome::Stopped(self.job());
            }
        }
    }

    /// Stop tracking; a response already in flight is dropped
    pub fn stop(&self) {
        self.inner.polls.stop(&self.inner.key);
        let job = self.inner.job().clone();
        self.inner.finish(GenerationOutcome::Stopped(job));
    }
}

impl std::fmt::Debug for GenerationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationTracker")
            .field("key", &self.inner.key)
            .field("live", &self.inner.is_live())
            .finish_non_exhaustive()
    }
}

async fn probe(inner: Arc<TrackerInner>) -> photo_core::Result<ProbeOutcome> {
    if !inner.is_live() {
        return Ok(ProbeOutcome::Done);
    }
    let job_id = inner.job().job_id.clone();
    let status = inner.api.generation_job(&job_id).await?;
    Ok(inner.apply(&status))
}
