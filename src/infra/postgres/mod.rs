mod attempt_repo;
mod donation_repo;
mod job_repo;

use {
    crate::domain::{
        attempt::{AttemptOutcome, PaymentAttempt},
        donation::{Donation, DonationStatus, RecurringFrequency},
        error::PipelineError,
        gateway::GatewayName,
        job::{JobStatus, WebhookJob},
        money::{Currency, Money, MoneyAmount},
        payment::{Payment, PaymentStatus},
    },
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

/// Postgres implementation of every store port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const DONATION_COLUMNS: &str = "id, campaign_id, donor_id, amount, currency, status, payment_method, \
    gateway, payment_intent_id, transaction_id, anonymous, recurring, frequency, notes, \
    refunded_amount, compliance_review, donated_at, completed_at, cancelled_at, \
    refund_requested_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, donation_id, gateway, payment_intent_id, transaction_id, status, \
    metadata, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, payment_id, gateway, request_id, response, outcome, latency_ms, \
    failure_reason, created_at";

const JOB_COLUMNS: &str = "id, gateway, dedup_key, event_type, payload, signature, donation_id, \
    attempts, status, last_error, scheduled_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct DonationRow {
    id: Uuid,
    campaign_id: Uuid,
    donor_id: Option<Uuid>,
    amount: i64,
    currency: String,
    status: String,
    payment_method: String,
    gateway: String,
    payment_intent_id: Option<String>,
    transaction_id: Option<String>,
    anonymous: bool,
    recurring: bool,
    frequency: Option<String>,
    notes: Option<String>,
    refunded_amount: i64,
    compliance_review: bool,
    donated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    refund_requested_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DonationRow> for Donation {
    type Error = PipelineError;

    fn try_from(r: DonationRow) -> Result<Self, Self::Error> {
        Ok(Donation {
            id: r.id,
            campaign_id: r.campaign_id,
            donor_id: r.donor_id,
            money: Money::new(
                MoneyAmount::new(r.amount)?,
                Currency::try_from(r.currency.as_str())?,
            ),
            status: DonationStatus::try_from(r.status.as_str())?,
            payment_method: r.payment_method,
            gateway: GatewayName::try_from(r.gateway.as_str())?,
            payment_intent_id: r.payment_intent_id,
            transaction_id: r.transaction_id,
            anonymous: r.anonymous,
            recurring: r.recurring,
            frequency: r
                .frequency
                .as_deref()
                .map(RecurringFrequency::try_from)
                .transpose()?,
            notes: r.notes,
            refunded_amount: MoneyAmount::new(r.refunded_amount)?,
            compliance_review: r.compliance_review,
            donated_at: r.donated_at,
            completed_at: r.completed_at,
            cancelled_at: r.cancelled_at,
            refund_requested_at: r.refund_requested_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    donation_id: Uuid,
    gateway: String,
    payment_intent_id: Option<String>,
    transaction_id: Option<String>,
    status: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = PipelineError;

    fn try_from(r: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: r.id,
            donation_id: r.donation_id,
            gateway: GatewayName::try_from(r.gateway.as_str())?,
            payment_intent_id: r.payment_intent_id,
            transaction_id: r.transaction_id,
            status: PaymentStatus::try_from(r.status.as_str())?,
            metadata: r.metadata,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    payment_id: Uuid,
    gateway: String,
    request_id: String,
    response: serde_json::Value,
    outcome: String,
    latency_ms: i64,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for PaymentAttempt {
    type Error = PipelineError;

    fn try_from(r: AttemptRow) -> Result<Self, Self::Error> {
        Ok(PaymentAttempt {
            id: r.id,
            payment_id: r.payment_id,
            gateway: GatewayName::try_from(r.gateway.as_str())?,
            request_id: r.request_id,
            response: r.response,
            outcome: AttemptOutcome::try_from(r.outcome.as_str())?,
            latency_ms: r.latency_ms,
            failure_reason: r.failure_reason,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    gateway: String,
    dedup_key: Option<String>,
    event_type: String,
    payload: String,
    signature: String,
    donation_id: Option<Uuid>,
    attempts: i32,
    status: String,
    last_error: Option<String>,
    scheduled_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for WebhookJob {
    type Error = PipelineError;

    fn try_from(r: JobRow) -> Result<Self, Self::Error> {
        Ok(WebhookJob {
            id: r.id,
            gateway: GatewayName::try_from(r.gateway.as_str())?,
            dedup_key: r.dedup_key,
            event_type: r.event_type,
            payload: r.payload,
            signature: r.signature,
            donation_id: r.donation_id,
            attempts: r.attempts,
            status: JobStatus::try_from(r.status.as_str())?,
            last_error: r.last_error,
            scheduled_at: r.scheduled_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, PipelineError>
where
    T: TryFrom<R, Error = PipelineError>,
{
    rows.into_iter().map(T::try_from).collect()
}
