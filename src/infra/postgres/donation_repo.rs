use {
    super::{
        DONATION_COLUMNS, DonationRow, PAYMENT_COLUMNS, PaymentRow, PgStore, attempt_repo::insert_attempt,
        convert_all,
    },
    crate::domain::{
        attempt::NewPaymentAttempt,
        donation::{Campaign, Donation, DonationStatus, UserAction},
        error::PipelineError,
        event::CanonicalEvent,
        payment::Payment,
        store::{DonationStore, StoreResult},
        transition::{Decision, ProcessResult, deferred, plan},
    },
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
    uuid::Uuid,
};

async fn lock_donation(conn: &mut PgConnection, id: Uuid) -> Result<Donation, PipelineError> {
    let row: Option<DonationRow> = sqlx::query_as(&format!(
        "SELECT {DONATION_COLUMNS} FROM donations WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or_else(|| PipelineError::NotFound(format!("donation {id}")))?
        .try_into()
}

async fn find_one(
    conn: &mut PgConnection,
    predicate: &str,
    value: &str,
) -> Result<Option<Donation>, PipelineError> {
    let row: Option<DonationRow> = sqlx::query_as(&format!(
        "SELECT {DONATION_COLUMNS} FROM donations WHERE {predicate} = $1 AND deleted_at IS NULL \
         ORDER BY donated_at DESC LIMIT 1"
    ))
    .bind(value)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Donation::try_from).transpose()
}

/// Writes every mutable column, guarded by the status read under the lock.
/// Returns `false` when the guard did not match.
async fn update_donation(
    conn: &mut PgConnection,
    next: &Donation,
    observed: DonationStatus,
) -> Result<bool, PipelineError> {
    let result = sqlx::query(
        r#"
        UPDATE donations
        SET status = $3,
            payment_intent_id = $4,
            transaction_id = $5,
            refunded_amount = $6,
            compliance_review = $7,
            completed_at = $8,
            cancelled_at = $9,
            refund_requested_at = $10,
            updated_at = $11
        WHERE id = $1 AND status = $2
        "#,
    )
    .bind(next.id)
    .bind(observed.as_str())
    .bind(next.status.as_str())
    .bind(next.payment_intent_id.as_deref())
    .bind(next.transaction_id.as_deref())
    .bind(next.refunded_amount.minor())
    .bind(next.compliance_review)
    .bind(next.completed_at)
    .bind(next.cancelled_at)
    .bind(next.refund_requested_at)
    .bind(next.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn insert_payment(conn: &mut PgConnection, p: &Payment) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
        INSERT INTO payments
            (id, donation_id, gateway, payment_intent_id, transaction_id, status, metadata, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(p.id)
    .bind(p.donation_id)
    .bind(p.gateway.as_str())
    .bind(p.payment_intent_id.as_deref())
    .bind(p.transaction_id.as_deref())
    .bind(p.status.as_str())
    .bind(&p.metadata)
    .bind(p.created_at)
    .bind(p.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_payment(conn: &mut PgConnection, p: &Payment) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
        UPDATE payments
        SET payment_intent_id = $2, transaction_id = $3, status = $4, metadata = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(p.id)
    .bind(p.payment_intent_id.as_deref())
    .bind(p.transaction_id.as_deref())
    .bind(p.status.as_str())
    .bind(&p.metadata)
    .bind(p.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn payments_of(conn: &mut PgConnection, donation_id: Uuid) -> Result<Vec<Payment>, PipelineError> {
    let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE donation_id = $1 ORDER BY created_at, id"
    ))
    .bind(donation_id)
    .fetch_all(&mut *conn)
    .await?;
    convert_all(rows)
}

impl DonationStore for PgStore {
    fn find_campaign(&self, id: Uuid) -> StoreResult<'_, Option<Campaign>> {
        Box::pin(async move {
            let row: Option<(Uuid, String, bool)> =
                sqlx::query_as("SELECT id, title, accepting_donations FROM campaigns WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(|(id, title, accepting_donations)| Campaign {
                id,
                title,
                accepting_donations,
            }))
        })
    }

    fn insert(&self, d: Donation, payment: Payment) -> StoreResult<'_, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO donations
                    (id, campaign_id, donor_id, amount, currency, status, payment_method, gateway,
                     payment_intent_id, transaction_id, anonymous, recurring, frequency, notes,
                     refunded_amount, compliance_review, donated_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                "#,
            )
            .bind(d.id)
            .bind(d.campaign_id)
            .bind(d.donor_id)
            .bind(d.money.amount().minor())
            .bind(d.money.currency().as_str())
            .bind(d.status.as_str())
            .bind(&d.payment_method)
            .bind(d.gateway.as_str())
            .bind(d.payment_intent_id.as_deref())
            .bind(d.transaction_id.as_deref())
            .bind(d.anonymous)
            .bind(d.recurring)
            .bind(d.frequency.map(|f| f.as_str()))
            .bind(d.notes.as_deref())
            .bind(d.refunded_amount.minor())
            .bind(d.compliance_review)
            .bind(d.donated_at)
            .bind(d.updated_at)
            .execute(&mut *tx)
            .await?;

            insert_payment(&mut tx, &payment).await?;
            tx.commit().await?;
            Ok(())
        })
    }

    fn attach_intent(
        &self,
        donation_id: Uuid,
        payment_id: Uuid,
        intent_id: String,
    ) -> StoreResult<'_, Donation> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("UPDATE payments SET payment_intent_id = $2, updated_at = now() WHERE id = $1")
                .bind(payment_id)
                .bind(&intent_id)
                .execute(&mut *tx)
                .await?;

            let row: Option<DonationRow> = sqlx::query_as(&format!(
                "UPDATE donations SET payment_intent_id = $2, updated_at = now() \
                 WHERE id = $1 RETURNING {DONATION_COLUMNS}"
            ))
            .bind(donation_id)
            .bind(&intent_id)
            .fetch_optional(&mut *tx)
            .await?;
            let donation = row
                .ok_or_else(|| PipelineError::NotFound(format!("donation {donation_id}")))?
                .try_into()?;

            tx.commit().await?;
            Ok(donation)
        })
    }

    fn mark_creation_failed(
        &self,
        donation_id: Uuid,
        payment_id: Uuid,
        reason: String,
    ) -> StoreResult<'_, Donation> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "UPDATE payments SET status = 'failed', metadata = $2, updated_at = now() WHERE id = $1",
            )
            .bind(payment_id)
            .bind(serde_json::json!({ "error": reason }))
            .execute(&mut *tx)
            .await?;

            let mut donation = lock_donation(&mut tx, donation_id).await?;
            if donation.status.can_transition_to(&DonationStatus::Failed) {
                let observed = donation.status;
                donation.status = DonationStatus::Failed;
                donation.updated_at = Utc::now();
                if !update_donation(&mut tx, &donation, observed).await? {
                    return Err(PipelineError::Conflict(format!(
                        "donation {donation_id} changed concurrently"
                    )));
                }
            }

            tx.commit().await?;
            Ok(donation)
        })
    }

    fn find_by_id(&self, id: Uuid) -> StoreResult<'_, Option<Donation>> {
        Box::pin(async move {
            let row: Option<DonationRow> = sqlx::query_as(&format!(
                "SELECT {DONATION_COLUMNS} FROM donations WHERE id = $1 AND deleted_at IS NULL"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            row.map(Donation::try_from).transpose()
        })
    }

    fn find_by_payment_intent_id<'a>(
        &'a self,
        intent_id: &'a str,
    ) -> StoreResult<'a, Option<Donation>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            find_one(&mut conn, "payment_intent_id", intent_id).await
        })
    }

    fn find_by_transaction_id<'a>(
        &'a self,
        transaction_id: &'a str,
    ) -> StoreResult<'a, Option<Donation>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            find_one(&mut conn, "transaction_id", transaction_id).await
        })
    }

    fn apply_user_action(
        &self,
        id: Uuid,
        action: UserAction,
        now: DateTime<Utc>,
    ) -> StoreResult<'_, Donation> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET LOCAL lock_timeout = '5s'")
                .execute(&mut *tx)
                .await?;

            let current = lock_donation(&mut tx, id).await?;
            let mut next = current.clone();
            action.apply(&mut next, now)?;

            if !update_donation(&mut tx, &next, current.status).await? {
                return Err(PipelineError::Conflict(format!("donation {id} changed concurrently")));
            }
            tx.commit().await?;
            Ok(next)
        })
    }

    fn apply_reconciliation(
        &self,
        donation_id: Uuid,
        event: CanonicalEvent,
        latency_ms: i64,
    ) -> StoreResult<'_, ProcessResult> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET LOCAL lock_timeout = '5s'")
                .execute(&mut *tx)
                .await?;

            // 1. Serialize all processing for this donation.
            let donation = lock_donation(&mut tx, donation_id).await?;

            // 2. Dedup on the event key; a redelivery leaves no trace.
            let inserted: Option<bool> = sqlx::query_scalar(
                r#"
                INSERT INTO processed_events (event_key, donation_id, event_type)
                VALUES ($1, $2, $3)
                ON CONFLICT (event_key) DO NOTHING
                RETURNING true
                "#,
            )
            .bind(event.idempotency_key())
            .bind(donation_id)
            .bind(&event.event_type)
            .fetch_optional(&mut *tx)
            .await?;

            if inserted.is_none() {
                tx.rollback().await?;
                return Ok(ProcessResult::Duplicate);
            }

            // 3. Decide and persist.
            let payments = payments_of(&mut tx, donation_id).await?;
            let existing = Payment::find_for_event(&payments, event.intent_id.as_deref());
            let now = Utc::now();
            let plan = plan(&donation, existing, &event, now);

            // Rolling back frees the event key so the retry can apply it.
            if plan.decision == Decision::Deferred {
                tx.rollback().await?;
                return Err(deferred(&donation, &event));
            }

            if plan.payment_is_new {
                insert_payment(&mut tx, &plan.payment).await?;
            } else if plan.payment_changed {
                update_payment(&mut tx, &plan.payment).await?;
            }

            if plan.donation_changed && !update_donation(&mut tx, &plan.donation, donation.status).await? {
                tx.rollback().await?;
                return Ok(ProcessResult::Conflict { donation_id });
            }

            // 4. Audit row commits with the transition or not at all.
            let attempt = insert_attempt(
                &mut tx,
                &NewPaymentAttempt::from_event(plan.payment.id, &event, latency_ms),
            )
            .await?;

            tx.commit().await?;
            Ok(ProcessResult::from_plan(&plan, donation.status, attempt.id))
        })
    }

    fn payments_for(&self, donation_id: Uuid) -> StoreResult<'_, Vec<Payment>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            payments_of(&mut conn, donation_id).await
        })
    }
}
