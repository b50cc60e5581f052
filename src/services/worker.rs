use {
    crate::{
        domain::{
            error::PipelineError,
            job::{JobOutcome, RetryPolicy, WebhookJob},
            store::JobQueue,
        },
        services::reconciliation::Reconciler,
    },
    std::{sync::Arc, time::Duration},
    tokio::sync::watch,
};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub batch_size: i64,
    pub job_timeout: Duration,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            job_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

impl WorkerConfig {
    /// Age after which a `processing` job counts as abandoned. A claimed batch
    /// runs one job at a time, so the last job of a full batch may legitimately
    /// wait `batch_size` timeouts before it starts.
    pub fn stale_after(&self, floor: Duration) -> Duration {
        let batch = u32::try_from(self.batch_size.max(1)).unwrap_or(u32::MAX);
        floor.max(self.job_timeout.saturating_mul(batch.saturating_add(1)))
    }
}

/// Poll for due jobs and reconcile them until shutdown.
pub async fn run_worker(
    jobs: Arc<dyn JobQueue>,
    reconciler: Arc<Reconciler>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("job worker started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("job worker shutting down");
                return;
            }
            _ = tokio::time::sleep(config.poll_interval) => {}
        }

        if let Err(e) = poll_once(&*jobs, &reconciler, &config).await {
            tracing::error!(error = %e, "worker poll error");
        }
    }
}

/// Claims one batch and runs it. Returns how many jobs were claimed.
pub async fn poll_once(
    jobs: &dyn JobQueue,
    reconciler: &Reconciler,
    config: &WorkerConfig,
) -> Result<usize, PipelineError> {
    let batch = jobs.claim(config.batch_size).await?;
    let claimed = batch.len();

    for job in batch {
        let result = match tokio::time::timeout(config.job_timeout, reconciler.process(&job)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout),
        };
        settle(jobs, config, &job, result.map(|r| r.label())).await?;
    }

    Ok(claimed)
}

async fn settle(
    jobs: &dyn JobQueue,
    config: &WorkerConfig,
    job: &WebhookJob,
    result: Result<&'static str, PipelineError>,
) -> Result<(), PipelineError> {
    match result {
        Ok(label) => {
            tracing::info!(job_id = %job.id, gateway = %job.gateway, result = label, "job processed");
            jobs.finish(job.id, JobOutcome::Completed).await
        }
        Err(e) if e.is_transient() => {
            let failures = job.attempts + 1;
            match config.retry.delay_after(failures) {
                Some(delay) => {
                    tracing::warn!(
                        job_id = %job.id,
                        attempt = failures,
                        retry_in_secs = delay.as_secs(),
                        error = %e,
                        "transient failure, scheduling retry"
                    );
                    jobs.reschedule(job.id, e.to_string(), delay).await
                }
                None => {
                    tracing::error!(
                        alert = "reconciliation_gap",
                        job_id = %job.id,
                        gateway = %job.gateway,
                        event_type = %job.event_type,
                        attempts = failures,
                        error = %e,
                        "retries exhausted, donation may be out of sync with the gateway"
                    );
                    jobs.finish(job.id, JobOutcome::Failed(e.to_string())).await
                }
            }
        }
        Err(e) => {
            match &e {
                PipelineError::NotFound(_) => {
                    tracing::warn!(job_id = %job.id, error = %e, "donation not found, dropping job")
                }
                _ => tracing::warn!(job_id = %job.id, error = %e, "permanent failure, dropping job"),
            }
            jobs.finish(job.id, JobOutcome::Dropped(e.to_string())).await
        }
    }
}

/// Periodically reset jobs stuck in 'processing' back to 'pending'.
pub async fn run_reaper(
    jobs: Arc<dyn JobQueue>,
    stale_after: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("stale job reaper started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("stale job reaper shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(60)) => {}
        }

        match jobs.reap_stale(stale_after).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "reaped stale jobs"),
            Err(e) => tracing::error!(error = %e, "reaper error"),
        }
    }
}
