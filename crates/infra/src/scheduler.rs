//! Recurring job scheduling.
//!
//! The engine never parses cron strings; callers hand a cadence to a
//! [`JobScheduler`]. [`TokioJobScheduler`] runs each job on its own tokio task:
//!
//! - Schedule: runs every `every` (and once on start unless disabled)
//! - Manual trigger: `handle.trigger()`, coalesced while a run is pending
//! - Failures: logged and retried with bounded exponential backoff; never propagate

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[async_trait]
pub trait RecurringJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run(&self) -> anyhow::Result<()>;
}

/// "Run this every N" capability consumed by the worker.
pub trait JobScheduler {
    type Handle;

    fn schedule(
        &self,
        name: &'static str,
        every: Duration,
        job: Arc<dyn RecurringJob>,
    ) -> Self::Handle;
}

#[derive(Debug, Clone)]
pub struct TokioJobScheduler {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub run_on_start: bool,
}

impl Default for TokioJobScheduler {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
            run_on_start: true,
        }
    }
}

/// Handle for a scheduled job (shutdown + trigger hook).
///
/// Dropping the handle stops the job at its next wake-up.
#[derive(Debug)]
pub struct JobHandle {
    name: &'static str,
    shutdown: oneshot::Sender<()>,
    trigger: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl JobHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request an immediate run. A no-op if one is already pending.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Stop the job and wait for a run in progress to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.join.await {
            warn!(job = self.name, error = %err, "job task ended abnormally");
        }
    }
}

impl JobScheduler for TokioJobScheduler {
    type Handle = JobHandle;

    fn schedule(
        &self,
        name: &'static str,
        every: Duration,
        job: Arc<dyn RecurringJob>,
    ) -> JobHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let join = tokio::spawn(job_loop(
            name,
            every,
            job,
            self.clone(),
            shutdown_rx,
            trigger_rx,
        ));

        JobHandle {
            name,
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join,
        }
    }
}

async fn job_loop(
    name: &'static str,
    every: Duration,
    job: Arc<dyn RecurringJob>,
    cfg: TokioJobScheduler,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut trigger_rx: mpsc::Receiver<()>,
) {
    info!(job = name, every_secs = every.as_secs(), "recurring job started");

    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending = cfg.run_on_start;
    let mut failures: u32 = 0;

    loop {
        if !pending {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {}
                Some(()) = trigger_rx.recv() => {}
            }
        }
        pending = false;

        match job.run().await {
            Ok(()) => {
                failures = 0;
                debug!(job = name, "recurring job run finished");
            }
            Err(err) => {
                failures += 1;
                warn!(job = name, attempt = failures, error = %err, "recurring job failed");
                if failures > cfg.max_retries {
                    // Give up until the next tick.
                    failures = 0;
                    continue;
                }
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = tokio::time::sleep(backoff(cfg.base_backoff, failures)) => pending = true,
                }
            }
        }
    }

    info!(job = name, "recurring job stopped");
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // base * 2^(attempt-1), capped at 10s.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(10_000) as u64)
}
