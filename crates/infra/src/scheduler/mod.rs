//! Rental lifecycle scheduler.
//!
//! Two jobs (`reserved-to-active`, `overdue`) can be started by the periodic
//! worker or by an operator. Both paths go through the same job function,
//! serialized per job by an async mutex:
//!
//! | Trigger | Job already running |
//! |---------|---------------------|
//! | timer tick | skipped, counted in `skipped_ticks` |
//! | manual | waits, then re-scans |
//!
//! The jobs have separate mutexes and never block each other.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use rentdesk_rentals::LifecycleJob;

use crate::rentals::{RentalStore, RentalStoreError};

pub mod worker;

pub use worker::{SchedulerHandle, spawn};

/// Source of "now" for lifecycle comparisons.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] RentalStoreError),

    #[error("unknown job: {0}")]
    UnknownJob(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Timer,
    Manual,
}

/// Outcome of one completed job execution.
#[derive(Debug, Clone, Serialize)]
pub struct JobRunReport {
    pub job: LifecycleJob,
    pub run_id: Uuid,
    pub trigger: TriggerSource,
    pub updated: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Per-job bookkeeping exposed through [`LifecycleScheduler::status`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStatus {
    pub in_flight: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_trigger: Option<TriggerSource>,
    pub last_updated: Option<u64>,
    pub last_error: Option<String>,
    pub runs: u64,
    pub failures: u64,
    pub skipped_ticks: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub interval_secs: u64,
    pub next_scheduled_run: Option<DateTime<Utc>>,
    pub last_run: BTreeMap<String, Option<DateTime<Utc>>>,
    pub jobs: BTreeMap<String, JobStatus>,
}

/// What a timer tick did with one job.
#[derive(Debug)]
pub enum TickOutcome {
    Ran(JobRunReport),
    Skipped,
    Failed(SchedulerError),
}

#[derive(Debug, Default)]
struct SchedulerState {
    is_running: bool,
    next_scheduled_run: Option<DateTime<Utc>>,
    jobs: BTreeMap<LifecycleJob, JobStatus>,
}

pub struct LifecycleScheduler {
    store: Arc<dyn RentalStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    locks: BTreeMap<LifecycleJob, Mutex<()>>,
    state: RwLock<SchedulerState>,
}

impl Debug for LifecycleScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleScheduler")
            .field("clock", &self.clock)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl LifecycleScheduler {
    pub fn new(store: Arc<dyn RentalStore>, interval: Duration) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), interval)
    }

    pub fn with_clock(
        store: Arc<dyn RentalStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        let locks = LifecycleJob::ALL
            .iter()
            .map(|job| (*job, Mutex::new(())))
            .collect();
        let state = SchedulerState {
            jobs: LifecycleJob::ALL
                .iter()
                .map(|job| (*job, JobStatus::default()))
                .collect(),
            ..SchedulerState::default()
        };

        Self {
            store,
            clock,
            interval,
            locks,
            state: RwLock::new(state),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Flip every qualifying reservation to active; returns the count.
    ///
    /// Same path as [`trigger`](Self::trigger): waits for an in-flight run
    /// and is recorded as a [`TriggerSource::Manual`] run.
    pub async fn run_reserved_to_active(&self) -> Result<u64, SchedulerError> {
        Ok(self.trigger(LifecycleJob::ReservedToActive).await?.updated)
    }

    /// Flip every past-due active rental to overdue; returns the count.
    ///
    /// Recorded as a [`TriggerSource::Manual`] run, like `run_reserved_to_active`.
    pub async fn run_overdue_sweep(&self) -> Result<u64, SchedulerError> {
        Ok(self.trigger(LifecycleJob::Overdue).await?.updated)
    }

    pub async fn trigger_reserved_to_active(&self) -> Result<JobRunReport, SchedulerError> {
        self.trigger(LifecycleJob::ReservedToActive).await
    }

    pub async fn trigger_overdue(&self) -> Result<JobRunReport, SchedulerError> {
        self.trigger(LifecycleJob::Overdue).await
    }

    /// Manual trigger by job name.
    pub async fn trigger_by_name(&self, name: &str) -> Result<JobRunReport, SchedulerError> {
        let job: LifecycleJob = name
            .parse()
            .map_err(|_| SchedulerError::UnknownJob(name.to_string()))?;
        self.trigger(job).await
    }

    /// Manual trigger: waits for any in-flight run of `job`, then scans.
    pub async fn trigger(&self, job: LifecycleJob) -> Result<JobRunReport, SchedulerError> {
        let _exclusive = self.lock_for(job).lock().await;
        self.execute(job, TriggerSource::Manual).await
    }

    /// Timer path: runs `job` only if nobody else is running it.
    pub async fn try_run_job(&self, job: LifecycleJob) -> TickOutcome {
        let Ok(_exclusive) = self.lock_for(job).try_lock() else {
            debug!(job = %job, "job busy, skipping tick");
            self.write_state().jobs.entry(job).or_default().skipped_ticks += 1;
            return TickOutcome::Skipped;
        };

        match self.execute(job, TriggerSource::Timer).await {
            Ok(report) => TickOutcome::Ran(report),
            Err(err) => {
                warn!(job = %job, error = %err, "scheduled job failed, will retry next tick");
                TickOutcome::Failed(err)
            }
        }
    }

    /// One timer tick: both jobs, concurrently.
    pub async fn run_tick(&self) -> Vec<(LifecycleJob, TickOutcome)> {
        let (activate, overdue) = tokio::join!(
            self.try_run_job(LifecycleJob::ReservedToActive),
            self.try_run_job(LifecycleJob::Overdue),
        );
        vec![
            (LifecycleJob::ReservedToActive, activate),
            (LifecycleJob::Overdue, overdue),
        ]
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.read_state();
        SchedulerStatus {
            is_running: state.is_running,
            interval_secs: self.interval.as_secs(),
            next_scheduled_run: state.next_scheduled_run,
            last_run: state
                .jobs
                .iter()
                .map(|(job, status)| (job.name().to_string(), status.last_run_at))
                .collect(),
            jobs: state
                .jobs
                .iter()
                .map(|(job, status)| (job.name().to_string(), status.clone()))
                .collect(),
        }
    }

    pub(crate) fn set_running(&self, running: bool) {
        let mut state = self.write_state();
        state.is_running = running;
        if !running {
            state.next_scheduled_run = None;
        }
    }

    pub(crate) fn set_next_run(&self, at: Option<DateTime<Utc>>) {
        self.write_state().next_scheduled_run = at;
    }

    /// Caller must hold the job's mutex.
    #[instrument(skip(self), fields(job = %job, run_id = tracing::field::Empty), err)]
    async fn execute(
        &self,
        job: LifecycleJob,
        trigger: TriggerSource,
    ) -> Result<JobRunReport, SchedulerError> {
        let run_id = Uuid::now_v7();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let _in_flight = InFlight::enter(self, job);
        let started_at = self.clock.now();
        let result = self.store.apply_transition(job, started_at).await;
        let finished_at = self.clock.now();

        let mut state = self.write_state();
        let status = state.jobs.entry(job).or_default();
        status.runs += 1;
        status.last_run_at = Some(finished_at);
        status.last_trigger = Some(trigger);

        match result {
            Ok(updated) => {
                status.last_updated = Some(updated);
                status.last_error = None;
                drop(state);
                if updated > 0 {
                    info!(updated, ?trigger, "lifecycle job moved rentals");
                } else {
                    debug!(?trigger, "lifecycle job found nothing to move");
                }
                Ok(JobRunReport {
                    job,
                    run_id,
                    trigger,
                    updated,
                    started_at,
                    finished_at,
                })
            }
            Err(err) => {
                status.failures += 1;
                status.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    fn lock_for(&self, job: LifecycleJob) -> &Mutex<()> {
        // Every job in `LifecycleJob::ALL` gets a mutex in `with_clock`.
        &self.locks[&job]
    }

    // Bookkeeping stays usable after a panic elsewhere; the data is plain counters.
    fn read_state(&self) -> RwLockReadGuard<'_, SchedulerState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SchedulerState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Marks a job in flight until dropped, including when the run is abandoned.
struct InFlight<'a> {
    scheduler: &'a LifecycleScheduler,
    job: LifecycleJob,
}

impl<'a> InFlight<'a> {
    fn enter(scheduler: &'a LifecycleScheduler, job: LifecycleJob) -> Self {
        scheduler.write_state().jobs.entry(job).or_default().in_flight = true;
        Self { scheduler, job }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.scheduler
            .write_state()
            .jobs
            .entry(self.job)
            .or_default()
            .in_flight = false;
    }
}
