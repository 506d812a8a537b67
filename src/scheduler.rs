//! Recurring and time-of-day triggers for the scrape pipeline.
//!
//! ```text
//! interval job ─┐
//! daily jobs  ──┼─► RunTrigger::fire ─► RunGate (busy? drop) ─► Orchestrator::run
//! run_now()   ──┘
//! ```
//!
//! At most one run is in flight. A trigger that arrives while a run is active
//! is dropped, not queued: the clear-then-repopulate run would race itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{NaiveTime, Timelike};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::pipeline::{Orchestrator, RunReport};

/// How long shutdown waits for an in-flight run before abandoning it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(90);
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Busy flag with compare-and-set acquisition.
#[derive(Clone, Default)]
pub struct RunGate {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of a run; clears the busy flag on drop.
pub struct RunPermit {
    busy: Arc<AtomicBool>,
}

impl RunGate {
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct RunTrigger {
    orchestrator: Arc<Orchestrator>,
    gate: RunGate,
}

impl RunTrigger {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        RunTrigger {
            orchestrator,
            gate: RunGate::default(),
        }
    }

    /// Run the pipeline unless a run is already active. `None` means the
    /// trigger was dropped (or the run task died).
    pub async fn fire(&self, source: &str) -> Option<RunReport> {
        let Some(permit) = self.gate.try_acquire() else {
            info!("Run already in progress, dropping {} trigger", source);
            return None;
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let label = source.to_string();
        // Own task so a panic inside the run can't take the caller down. The
        // permit moves in and is released however the task ends.
        let handle = tokio::spawn(async move {
            let _permit = permit;
            orchestrator.run(&label).await
        });

        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Run task for {} trigger aborted: {}", source, e);
                None
            }
        }
    }

    /// Fire-and-forget run on a detached task.
    pub fn run_now(&self) -> JoinHandle<Option<RunReport>> {
        let this = self.clone();
        tokio::spawn(async move { this.fire("manual").await })
    }

    pub fn is_running(&self) -> bool {
        self.gate.is_busy()
    }

    /// Wait until no run is active. `false` if `grace` ran out first.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let idle = async {
            while self.gate.is_busy() {
                tokio::time::sleep(IDLE_POLL).await;
            }
        };
        tokio::time::timeout(grace, idle).await.is_ok()
    }
}

pub struct Scheduler {
    inner: JobScheduler,
    trigger: RunTrigger,
}

impl Scheduler {
    /// Register the interval job and one job per daily time (UTC), then start.
    pub async fn start(trigger: RunTrigger, interval: Duration, daily_at: &[NaiveTime]) -> Result<Self> {
        let inner = JobScheduler::new().await?;

        let interval_trigger = trigger.clone();
        let interval_job = Job::new_repeated_async(interval, move |_uuid, _lock| {
            let trigger = interval_trigger.clone();
            Box::pin(async move {
                trigger.fire("interval").await;
            })
        })?;
        inner.add(interval_job).await?;

        for time in daily_at {
            let expr = daily_cron(*time);
            let daily_trigger = trigger.clone();
            let daily_job = Job::new_async(expr.as_str(), move |_uuid, _lock| {
                let trigger = daily_trigger.clone();
                Box::pin(async move {
                    trigger.fire("daily").await;
                })
            })?;
            inner.add(daily_job).await?;
        }

        inner.start().await?;
        info!(
            "Scheduler started (every {}s, daily at {:?} UTC)",
            interval.as_secs(),
            daily_at.iter().map(|t| t.format("%H:%M").to_string()).collect::<Vec<_>>()
        );

        Ok(Scheduler { inner, trigger })
    }

    pub fn run_now(&self) -> JoinHandle<Option<RunReport>> {
        self.trigger.run_now()
    }

    /// Stop firing triggers, then give an active run up to `grace` to finish.
    /// A run still going after that is abandoned with the runtime and may
    /// leave storage cleared but unfilled.
    pub async fn shutdown(mut self, grace: Duration) -> Result<()> {
        self.inner.shutdown().await?;
        if self.trigger.is_running() {
            info!("Waiting up to {}s for the active run to finish", grace.as_secs());
            if !self.trigger.wait_idle(grace).await {
                warn!("Abandoning the active run; stored jobs may be incomplete until the next run");
            }
        }
        info!("Scheduler stopped");
        Ok(())
    }
}

/// Six-field cron (with seconds) firing once a day at `time`.
fn daily_cron(time: NaiveTime) -> String {
    format!("0 {} {} * * *", time.minute(), time.hour())
}
