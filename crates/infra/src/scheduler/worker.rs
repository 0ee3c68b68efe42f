//! Background worker driving the lifecycle scheduler on a fixed interval.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{info, warn};

use super::{LifecycleScheduler, TickOutcome};

/// Handle for the running worker.
pub struct SchedulerHandle {
    scheduler: Arc<LifecycleScheduler>,
    shutdown: Arc<Notify>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop the worker and wait for it to exit.
    ///
    /// A tick that is still scanning is abandoned; its store call either
    /// committed or did not.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                warn!(error = %err, "scheduler worker ended abnormally");
            }
        }
        self.scheduler.set_running(false);
    }
}

/// Start the worker. With `run_on_startup` the first tick fires immediately.
pub fn spawn(scheduler: Arc<LifecycleScheduler>, run_on_startup: bool) -> SchedulerHandle {
    let shutdown = Arc::new(Notify::new());
    let period = scheduler.interval();

    let first_tick = if run_on_startup {
        Instant::now()
    } else {
        Instant::now() + period
    };
    scheduler.set_running(true);
    scheduler.set_next_run(Some(if run_on_startup {
        scheduler.now()
    } else {
        next_run_after(&scheduler)
    }));

    let join = tokio::spawn({
        let scheduler = scheduler.clone();
        let shutdown = shutdown.clone();
        async move {
            info!(interval_secs = period.as_secs(), "lifecycle scheduler started");

            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        info!("lifecycle scheduler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = shutdown.notified() => {
                                info!("lifecycle scheduler abandoning in-flight tick");
                                break;
                            }
                            outcomes = scheduler.run_tick() => log_tick(&outcomes),
                        }
                        scheduler.set_next_run(Some(next_run_after(&scheduler)));
                    }
                }
            }

            scheduler.set_running(false);
            info!("lifecycle scheduler stopped");
        }
    });

    SchedulerHandle {
        scheduler,
        shutdown,
        join: Some(join),
    }
}

fn next_run_after(scheduler: &LifecycleScheduler) -> chrono::DateTime<chrono::Utc> {
    let period = chrono::Duration::from_std(scheduler.interval()).unwrap_or(chrono::Duration::MAX);
    scheduler
        .now()
        .checked_add_signed(period)
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}

fn log_tick(outcomes: &[(rentdesk_rentals::LifecycleJob, TickOutcome)]) {
    let (ran, skipped, failed) = outcomes.iter().fold((0, 0, 0), |(r, s, f), (_, o)| match o {
        TickOutcome::Ran(_) => (r + 1, s, f),
        TickOutcome::Skipped => (r, s + 1, f),
        TickOutcome::Failed(_) => (r, s, f + 1),
    });
    let updated: u64 = outcomes
        .iter()
        .filter_map(|(_, o)| match o {
            TickOutcome::Ran(report) => Some(report.updated),
            _ => None,
        })
        .sum();
    info!(ran, skipped, failed, updated, "lifecycle tick finished");
}
