//! Cron scheduling of jobs.
//!
//! Each autostarted job gets its own loop that sleeps until the next cron
//! fire time in the job's timezone and then spawns a tick. Ticks of one job
//! never overlap: a trigger that fires while the previous tick is still
//! running is skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule;
use harvester_destinations::Dispatcher;
use harvester_shared::{AppConfig, HarvesterError, Result};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::fetch::HttpFetcher;
use crate::runner::Job;

/// All configured jobs, ready to be scheduled or run once.
pub struct Scheduler {
    jobs: Vec<Arc<Job>>,
}

impl Scheduler {
    /// Validate the config and build every job with shared fetcher and dispatcher.
    #[instrument(skip_all)]
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate_jobs()?;

        let fetcher = HttpFetcher::new(&config.http)?;
        let dispatcher = Arc::new(Dispatcher::from_config(&config.destinations, &config.http)?);
        let dispatch_timeout = Duration::from_secs(config.http.dispatch_timeout_secs);

        let jobs = config
            .jobs
            .iter()
            .map(|(name, job)| {
                for output in &job.outputs {
                    if !dispatcher.contains(&output.to) {
                        warn!(job = %name, destination = %output.to, "output refers to an unknown destination");
                    }
                }
                Arc::new(Job::new(
                    name.clone(),
                    job.clone(),
                    fetcher.clone(),
                    dispatcher.clone(),
                    dispatch_timeout,
                ))
            })
            .collect::<Vec<_>>();

        info!(jobs = jobs.len(), "jobs loaded");
        Ok(Self { jobs })
    }

    pub fn new(jobs: Vec<Arc<Job>>) -> Self {
        Self { jobs }
    }

    pub fn jobs(&self) -> &[Arc<Job>] {
        &self.jobs
    }

    pub fn job(&self, name: &str) -> Option<Arc<Job>> {
        self.jobs.iter().find(|j| j.name() == name).cloned()
    }

    /// Schedule every autostarted job until `shutdown` flips to `true`.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut loops = Vec::new();

        for job in &self.jobs {
            if !job.config().autostart {
                info!(job = %job.name(), "autostart disabled, not scheduled");
                continue;
            }
            let schedule = job.config().schedule.cron_schedule()?;
            let tz = job.config().schedule.tz()?;
            loops.push(tokio::spawn(job_loop(
                job.clone(),
                schedule,
                tz,
                shutdown.clone(),
            )));
        }

        if loops.is_empty() {
            warn!("no job to schedule");
            return Ok(());
        }

        info!(scheduled = loops.len(), "scheduler started");
        for handle in loops {
            handle
                .await
                .map_err(|e| HarvesterError::config(format!("job loop failed: {e}")))?;
        }
        info!("scheduler stopped");
        Ok(())
    }
}

async fn job_loop(job: Arc<Job>, schedule: Schedule, tz: Tz, mut shutdown: watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }
    if job.config().schedule.run_on_init {
        trigger(&job);
    }

    loop {
        let Some(next) = schedule.upcoming(tz).next() else {
            warn!(job = %job.name(), "cron expression has no upcoming fire time");
            return;
        };
        let wait = (next.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        debug!(job = %job.name(), next = %next, wait_ms = wait.as_millis() as u64, "next tick");

        tokio::select! {
            _ = tokio::time::sleep(wait) => trigger(&job),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(job = %job.name(), "job loop stopping");
                    return;
                }
            }
        }
    }
}

/// Spawn a tick; skipped with a warning while the previous one still runs.
fn trigger(job: &Arc<Job>) {
    let job = job.clone();
    tokio::spawn(async move {
        if job.try_run().await.is_none() {
            warn!(job = %job.name(), "previous tick still running, trigger skipped");
        }
    });
}
