/// Sync Scheduler
/// Runs a full sync cycle on a cron schedule
use super::orchestrator::SyncOrchestrator;
use super::transport::SyncTransport;
use crate::error::{AppError, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Periodic sync frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFrequency {
    Minutes(u32),
    Hours(u32),
    Days(u32),
}

impl SyncFrequency {
    /// Six-field cron expression (seconds first)
    pub fn to_cron(self) -> String {
        match self {
            SyncFrequency::Minutes(1) => "0 * * * * *".to_string(),
            SyncFrequency::Minutes(m) => format!("0 */{} * * * *", m),
            SyncFrequency::Hours(1) => "0 0 * * * *".to_string(),
            SyncFrequency::Hours(h) => format!("0 0 */{} * * *", h),
            SyncFrequency::Days(1) => "0 0 2 * * *".to_string(),
            SyncFrequency::Days(d) => format!("0 0 2 */{} * *", d),
        }
    }
}

impl fmt::Display for SyncFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncFrequency::Minutes(m) => write!(f, "{}m", m),
            SyncFrequency::Hours(h) => write!(f, "{}h", h),
            SyncFrequency::Days(d) => write!(f, "{}d", d),
        }
    }
}

impl FromStr for SyncFrequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        // "15m", "2h", "1d", or "hourly" / "daily"
        let s = s.trim().to_lowercase();

        match s.as_str() {
            "hourly" => return Ok(SyncFrequency::Hours(1)),
            "daily" => return Ok(SyncFrequency::Days(1)),
            _ => {}
        }

        let Some(unit) = s.chars().last() else {
            return Err(AppError::validation("Empty sync frequency"));
        };
        let number_part = &s[..s.len() - unit.len_utf8()];

        let value: u32 = number_part
            .parse()
            .map_err(|_| AppError::validation(format!("Invalid number in sync frequency: {}", s)))?;

        if value == 0 {
            return Err(AppError::validation(
                "Sync frequency must be greater than 0",
            ));
        }

        match unit {
            'm' => Ok(SyncFrequency::Minutes(value)),
            'h' => Ok(SyncFrequency::Hours(value)),
            'd' => Ok(SyncFrequency::Days(value)),
            _ => Err(AppError::validation(format!(
                "Invalid sync frequency unit '{}'. Use 'm' (minutes), 'h' (hours), or 'd' (days)",
                unit
            ))),
        }
    }
}

/// Cron-driven trigger for `SyncOrchestrator::sync_all`
pub struct SyncScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    current_job_id: Arc<RwLock<Option<Uuid>>>,
}

impl SyncScheduler {
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            current_job_id: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn start(&self) -> Result<()> {
        let scheduler = self.scheduler.read().await;
        scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;
        tracing::info!("Sync scheduler started");
        Ok(())
    }

    /// Replace any existing schedule with one running at `frequency`
    pub async fn schedule<R: SyncTransport>(
        &self,
        orchestrator: Arc<SyncOrchestrator<R>>,
        frequency: SyncFrequency,
    ) -> Result<()> {
        self.cancel().await?;

        let cron_expr = frequency.to_cron();

        let job = Job::new_async(cron_expr.clone(), move |_uuid, _l| {
            let orchestrator = Arc::clone(&orchestrator);
            Box::pin(async move {
                tracing::debug!("Running scheduled sync");
                match orchestrator.sync_all().await {
                    Ok(report) => tracing::info!("Scheduled sync finished: {}", report.summary()),
                    Err(e) => tracing::info!("Scheduled sync skipped: {}", e),
                }
            })
        })
        .map_err(|e| AppError::Scheduler(format!("Failed to create sync job: {}", e)))?;

        let job_id = job.guid();

        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to schedule job: {}", e)))?;

        *self.current_job_id.write().await = Some(job_id);

        tracing::info!("Periodic sync scheduled: every {} ({})", frequency, cron_expr);
        Ok(())
    }

    pub async fn cancel(&self) -> Result<()> {
        let mut current_job = self.current_job_id.write().await;

        if let Some(job_id) = *current_job {
            let scheduler = self.scheduler.write().await;
            scheduler
                .remove(&job_id)
                .await
                .map_err(|e| AppError::Scheduler(format!("Failed to remove job: {}", e)))?;

            *current_job = None;
            tracing::info!("Periodic sync cancelled");
        }

        Ok(())
    }

    pub async fn is_scheduled(&self) -> bool {
        self.current_job_id.read().await.is_some()
    }

    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.write().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to shutdown scheduler: {}", e)))?;
        tracing::info!("Sync scheduler shutdown");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{create_memory_pool, RecordStore};
    use crate::domain::{CalendarPolicy, SystemClock};
    use crate::server::Reconciler;
    use crate::sync::ConnectivityMonitor;
    use std::time::Duration;

    #[test]
    fn test_parse_frequency() {
        assert_eq!("15m".parse::<SyncFrequency>().unwrap(), SyncFrequency::Minutes(15));
        assert_eq!(" 2H ".parse::<SyncFrequency>().unwrap(), SyncFrequency::Hours(2));
        assert_eq!("daily".parse::<SyncFrequency>().unwrap(), SyncFrequency::Days(1));
        assert_eq!("hourly".parse::<SyncFrequency>().unwrap(), SyncFrequency::Hours(1));

        assert!("".parse::<SyncFrequency>().is_err());
        assert!("0m".parse::<SyncFrequency>().is_err());
        assert!("5w".parse::<SyncFrequency>().is_err());
        assert!("xm".parse::<SyncFrequency>().is_err());
    }

    #[test]
    fn test_cron_expressions() {
        assert_eq!(SyncFrequency::Minutes(1).to_cron(), "0 * * * * *");
        assert_eq!(SyncFrequency::Minutes(15).to_cron(), "0 */15 * * * *");
        assert_eq!(SyncFrequency::Hours(6).to_cron(), "0 0 */6 * * *");
        assert_eq!(SyncFrequency::Days(1).to_cron(), "0 0 2 * * *");
    }

    #[test]
    fn test_display_round_trips() {
        let freq = SyncFrequency::Hours(3);
        assert_eq!(freq.to_string().parse::<SyncFrequency>().unwrap(), freq);
    }

    #[tokio::test]
    async fn test_schedule_and_cancel() {
        let store = RecordStore::new(create_memory_pool().await.unwrap());
        let server = Arc::new(Reconciler::new(
            RecordStore::new(create_memory_pool().await.unwrap()),
            Arc::new(SystemClock),
            CalendarPolicy::default(),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store,
            server,
            ConnectivityMonitor::new(true),
            Arc::new(SystemClock),
            Duration::from_secs(5),
        ));

        let scheduler = SyncScheduler::new().await.unwrap();
        scheduler
            .schedule(orchestrator.clone(), SyncFrequency::Minutes(30))
            .await
            .unwrap();
        assert!(scheduler.is_scheduled().await);

        // Rescheduling replaces the job
        scheduler
            .schedule(orchestrator, SyncFrequency::Hours(1))
            .await
            .unwrap();
        assert!(scheduler.is_scheduled().await);

        scheduler.cancel().await.unwrap();
        assert!(!scheduler.is_scheduled().await);
    }
}
