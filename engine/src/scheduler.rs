use crate::reconciler::Reconciler;
use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::Job;
use tokio_cron_scheduler::JobScheduler;

/// Periodic ledger reconciliation, distinct from request-scoped work.
pub struct ReconcileScheduler {
    scheduler: JobScheduler,
    reconciler: Arc<Reconciler>,
}

impl ReconcileScheduler {
    pub async fn new(reconciler: Arc<Reconciler>) -> Self {
        let scheduler = JobScheduler::new()
            .await
            .expect("To be able to start the scheduler");

        Self {
            scheduler,
            reconciler,
        }
    }

    pub async fn add_organization_sync_job(&self, schedule: &str) -> Result<()> {
        let reconciler = self.reconciler.clone();

        let uuid = self
            .scheduler
            .add(
                Job::new_async(schedule, move |_, _| {
                    let reconciler = reconciler.clone();
                    Box::pin(async move {
                        reconciler.sync_all_organizations().await;
                    })
                })
                .expect("To be able to add the job"),
            )
            .await?;
        tracing::debug!(
            job_id = uuid.to_string(),
            "Started new job to reconcile all organizations against the ledger"
        );
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await?;
        Ok(())
    }
}
