//! Persistence ports. `infra::postgres` is the production implementation,
//! `infra::memory` backs tests and local runs.

use {
    super::{
        attempt::{NewPaymentAttempt, PaymentAttempt},
        donation::{Campaign, Donation, UserAction},
        error::PipelineError,
        event::CanonicalEvent,
        gateway::{BoxFuture, GatewayName},
        job::{EnqueueResult, JobOutcome, NewWebhookJob, WebhookJob},
        payment::Payment,
        transition::ProcessResult,
    },
    chrono::{DateTime, Utc},
    std::time::Duration,
    uuid::Uuid,
};

pub type StoreResult<'a, T> = BoxFuture<'a, Result<T, PipelineError>>;

pub trait DonationStore: Send + Sync {
    fn find_campaign(&self, id: Uuid) -> StoreResult<'_, Option<Campaign>>;

    /// Persists a new `pending` donation together with its first payment row.
    fn insert(&self, donation: Donation, payment: Payment) -> StoreResult<'_, ()>;

    /// Records the intent id returned by the gateway on both rows.
    fn attach_intent(
        &self,
        donation_id: Uuid,
        payment_id: Uuid,
        intent_id: String,
    ) -> StoreResult<'_, Donation>;

    /// Intent creation failed: donation and payment both end `failed`.
    fn mark_creation_failed(
        &self,
        donation_id: Uuid,
        payment_id: Uuid,
        reason: String,
    ) -> StoreResult<'_, Donation>;

    fn find_by_id(&self, id: Uuid) -> StoreResult<'_, Option<Donation>>;

    fn find_by_payment_intent_id<'a>(&'a self, intent_id: &'a str)
    -> StoreResult<'a, Option<Donation>>;

    fn find_by_transaction_id<'a>(
        &'a self,
        transaction_id: &'a str,
    ) -> StoreResult<'a, Option<Donation>>;

    /// Locks the donation, checks the action against its current status and
    /// writes the result with a conditional update.
    fn apply_user_action(
        &self,
        id: Uuid,
        action: UserAction,
        now: DateTime<Utc>,
    ) -> StoreResult<'_, Donation>;

    /// One atomic unit: dedup the event id, lock the donation, decide the
    /// transition, update payment and donation, append the attempt row.
    fn apply_reconciliation(
        &self,
        donation_id: Uuid,
        event: CanonicalEvent,
        latency_ms: i64,
    ) -> StoreResult<'_, ProcessResult>;

    fn payments_for(&self, donation_id: Uuid) -> StoreResult<'_, Vec<Payment>>;
}

pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: NewWebhookJob) -> StoreResult<'_, EnqueueResult>;

    /// Claims up to `limit` due jobs and marks them `processing`.
    fn claim(&self, limit: i64) -> StoreResult<'_, Vec<WebhookJob>>;

    /// Counts one more failed run and puts the job back after `delay`.
    /// This and `finish` only touch jobs still `processing`.
    fn reschedule(&self, id: Uuid, error: String, delay: Duration) -> StoreResult<'_, ()>;

    fn finish(&self, id: Uuid, outcome: JobOutcome) -> StoreResult<'_, ()>;

    /// Jobs stuck in `processing` longer than `older_than` go back to `pending`.
    fn reap_stale(&self, older_than: Duration) -> StoreResult<'_, u64>;

    fn failed_jobs(&self, limit: i64) -> StoreResult<'_, Vec<WebhookJob>>;
}

pub trait AttemptLog: Send + Sync {
    fn record(&self, attempt: NewPaymentAttempt) -> StoreResult<'_, PaymentAttempt>;

    fn attempts_since(
        &self,
        since: DateTime<Utc>,
        gateway: Option<GatewayName>,
    ) -> StoreResult<'_, Vec<PaymentAttempt>>;

    fn attempts_for_payment(&self, payment_id: Uuid) -> StoreResult<'_, Vec<PaymentAttempt>>;
}
