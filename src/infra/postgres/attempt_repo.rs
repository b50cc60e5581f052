use {
    super::{ATTEMPT_COLUMNS, AttemptRow, PgStore, convert_all},
    crate::domain::{
        attempt::{NewPaymentAttempt, PaymentAttempt},
        error::PipelineError,
        gateway::GatewayName,
        store::{AttemptLog, StoreResult},
    },
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
    uuid::Uuid,
};

/// Appends one attempt row. Also used inside the reconciliation transaction.
pub(super) async fn insert_attempt(
    conn: &mut PgConnection,
    a: &NewPaymentAttempt,
) -> Result<PaymentAttempt, PipelineError> {
    let row: AttemptRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO payment_attempts
            (id, payment_id, gateway, request_id, response, outcome, latency_ms, failure_reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {ATTEMPT_COLUMNS}
        "#
    ))
    .bind(a.id)
    .bind(a.payment_id)
    .bind(a.gateway.as_str())
    .bind(&a.request_id)
    .bind(&a.response)
    .bind(a.outcome.as_str())
    .bind(a.latency_ms)
    .bind(a.failure_reason.as_deref())
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

impl AttemptLog for PgStore {
    fn record(&self, attempt: NewPaymentAttempt) -> StoreResult<'_, PaymentAttempt> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            insert_attempt(&mut conn, &attempt).await
        })
    }

    fn attempts_since(
        &self,
        since: DateTime<Utc>,
        gateway: Option<GatewayName>,
    ) -> StoreResult<'_, Vec<PaymentAttempt>> {
        Box::pin(async move {
            let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
                "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts \
                 WHERE created_at >= $1 AND ($2::text IS NULL OR gateway = $2) \
                 ORDER BY created_at"
            ))
            .bind(since)
            .bind(gateway.map(|g| g.as_str()))
            .fetch_all(&self.pool)
            .await?;
            convert_all(rows)
        })
    }

    fn attempts_for_payment(&self, payment_id: Uuid) -> StoreResult<'_, Vec<PaymentAttempt>> {
        Box::pin(async move {
            let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
                "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE payment_id = $1 ORDER BY created_at"
            ))
            .bind(payment_id)
            .fetch_all(&self.pool)
            .await?;
            convert_all(rows)
        })
    }
}
