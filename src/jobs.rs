use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

/// Wrapper around tokio-cron-scheduler for background jobs.
///
/// The relay itself schedules nothing urgent; the scheduler exists so deferred
/// work (digests, cleanups) has a home, and it is started as the first
/// bootstrap step. One built-in heartbeat job is registered.
pub struct Scheduler {
    inner: JobScheduler,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self { inner })
    }

    /// Hourly liveness log line.
    pub async fn register_heartbeat(&self) -> Result<()> {
        let job = Job::new_async("0 0 * * * *", |_uuid, _lock| {
            Box::pin(async {
                info!("Heartbeat: webhook relay is alive");
            })
        })
        .context("Failed to create heartbeat job")?;

        self.inner
            .add(job)
            .await
            .context("Failed to add heartbeat job")?;
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shutdown scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}
