use anyhow::{anyhow, Result};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::services::StatsService;

/// Every hour, on the hour
pub const STATS_REFRESH_SCHEDULE: &str = "0 0 * * * *";

/// Periodic maintenance jobs
pub struct BackgroundJobService {
    scheduler: Arc<RwLock<JobScheduler>>,
    db: PgPool,
}

impl BackgroundJobService {
    pub async fn new(db: PgPool) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create job scheduler: {}", e))?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            db,
        })
    }

    /// Register the jobs and start the scheduler
    pub async fn start(&self) -> Result<()> {
        self.add_stats_refresh_job().await?;

        let scheduler = self.scheduler.read().await;
        scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start job scheduler: {}", e))?;

        info!("Background job scheduler started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let mut scheduler = self.scheduler.write().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| anyhow!("Failed to stop job scheduler: {}", e))?;

        info!("Background job scheduler stopped");
        Ok(())
    }

    async fn add_stats_refresh_job(&self) -> Result<()> {
        let stats_service = StatsService::new(self.db.clone());

        let job = Job::new_async(STATS_REFRESH_SCHEDULE, move |_uuid, _l| {
            let stats_service = stats_service.clone();
            Box::pin(async move {
                if let Err(e) = stats_service.refresh().await {
                    error!("Public stats refresh failed: {}", e);
                }
            })
        })
        .map_err(|e| anyhow!("Failed to create stats refresh job: {}", e))?;

        let scheduler = self.scheduler.read().await;
        scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add job to scheduler: {}", e))?;

        info!("Scheduled public stats refresh ({})", STATS_REFRESH_SCHEDULE);
        Ok(())
    }
}
