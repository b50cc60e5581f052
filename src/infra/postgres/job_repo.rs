use {
    super::{JOB_COLUMNS, JobRow, PgStore, convert_all},
    crate::domain::{
        job::{EnqueueResult, JobOutcome, NewWebhookJob, WebhookJob},
        store::{JobQueue, StoreResult},
    },
    std::time::Duration,
    uuid::Uuid,
};

impl JobQueue for PgStore {
    /// Keyed deliveries dedup on `(gateway, dedup_key)`; a `failed` job with
    /// the same key is revived. Unkeyed deliveries always insert.
    fn enqueue(&self, job: NewWebhookJob) -> StoreResult<'_, EnqueueResult> {
        Box::pin(async move {
            let row: Option<(Uuid, bool)> = sqlx::query_as(
                r#"
                INSERT INTO webhook_jobs (id, gateway, dedup_key, event_type, payload, signature, donation_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (gateway, dedup_key) DO UPDATE
                SET status = 'pending',
                    attempts = 0,
                    last_error = NULL,
                    payload = EXCLUDED.payload,
                    signature = EXCLUDED.signature,
                    scheduled_at = now(),
                    updated_at = now()
                WHERE webhook_jobs.status = 'failed'
                RETURNING id, (xmax = 0) AS inserted
                "#,
            )
            .bind(job.id)
            .bind(job.gateway.as_str())
            .bind(job.dedup_key.as_deref())
            .bind(&job.event_type)
            .bind(&job.payload)
            .bind(&job.signature)
            .bind(job.donation_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(match row {
                Some((id, true)) => EnqueueResult::Enqueued(id),
                Some((id, false)) => EnqueueResult::Revived(id),
                None => EnqueueResult::Duplicate,
            })
        })
    }

    /// SKIP LOCKED keeps concurrent workers off each other's rows.
    fn claim(&self, limit: i64) -> StoreResult<'_, Vec<WebhookJob>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let rows: Vec<JobRow> = sqlx::query_as(&format!(
                r#"
                UPDATE webhook_jobs
                SET status = 'processing', updated_at = now()
                WHERE id IN (
                    SELECT id FROM webhook_jobs
                    WHERE status = 'pending' AND scheduled_at <= now()
                    ORDER BY scheduled_at
                    LIMIT $1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING {JOB_COLUMNS}
                "#
            ))
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;
            tx.commit().await?;

            convert_all(rows)
        })
    }

    fn reschedule(&self, id: Uuid, error: String, delay: Duration) -> StoreResult<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r#"
                UPDATE webhook_jobs
                SET attempts = attempts + 1,
                    last_error = $2,
                    status = 'pending',
                    scheduled_at = now() + make_interval(secs => $3),
                    updated_at = now()
                WHERE id = $1 AND status = 'processing'
                "#,
            )
            .bind(id)
            .bind(error)
            .bind(delay.as_secs_f64())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn finish(&self, id: Uuid, outcome: JobOutcome) -> StoreResult<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r#"
                UPDATE webhook_jobs
                SET status = $2,
                    last_error = $3,
                    attempts = attempts + CASE WHEN $2 = 'failed' THEN 1 ELSE 0 END,
                    updated_at = now()
                WHERE id = $1 AND status = 'processing'
                "#,
            )
            .bind(id)
            .bind(outcome.status().as_str())
            .bind(outcome.error())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn reap_stale(&self, older_than: Duration) -> StoreResult<'_, u64> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                UPDATE webhook_jobs
                SET status = 'pending', updated_at = now()
                WHERE status = 'processing' AND updated_at < now() - make_interval(secs => $1)
                "#,
            )
            .bind(older_than.as_secs_f64())
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected())
        })
    }

    fn failed_jobs(&self, limit: i64) -> StoreResult<'_, Vec<WebhookJob>> {
        Box::pin(async move {
            let rows: Vec<JobRow> = sqlx::query_as(&format!(
                "SELECT {JOB_COLUMNS} FROM webhook_jobs WHERE status = 'failed' \
                 ORDER BY updated_at DESC LIMIT $1"
            ))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            convert_all(rows)
        })
    }
}
