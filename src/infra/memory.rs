//! Process-local store behind one mutex. Same semantics as the Postgres
//! store: the mutex plays the role of the row lock and the transaction.

use {
    crate::domain::{
        attempt::{NewPaymentAttempt, PaymentAttempt},
        donation::{Campaign, Donation, DonationStatus, UserAction},
        error::PipelineError,
        event::CanonicalEvent,
        gateway::GatewayName,
        job::{EnqueueResult, JobOutcome, JobStatus, NewWebhookJob, WebhookJob},
        payment::{Payment, PaymentStatus},
        store::{AttemptLog, DonationStore, JobQueue, StoreResult},
        transition::{Decision, ProcessResult, deferred, plan},
    },
    chrono::{DateTime, TimeDelta, Utc},
    std::{
        collections::{HashMap, HashSet},
        time::Duration,
    },
    tokio::sync::Mutex,
    uuid::Uuid,
};

#[derive(Default)]
struct State {
    campaigns: HashMap<Uuid, Campaign>,
    donations: HashMap<Uuid, Donation>,
    payments: Vec<Payment>,
    attempts: Vec<PaymentAttempt>,
    processed_events: HashSet<String>,
    jobs: Vec<WebhookJob>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn to_delta(d: Duration) -> Result<TimeDelta, PipelineError> {
    TimeDelta::from_std(d).map_err(|e| PipelineError::Validation(format!("delay out of range: {e}")))
}

fn not_found(id: Uuid) -> PipelineError {
    PipelineError::NotFound(format!("donation {id}"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        self.state.lock().await.campaigns.insert(campaign.id, campaign);
    }

    /// Overwrites a donation as-is, bypassing every check.
    pub async fn put_donation(&self, donation: Donation) {
        self.state.lock().await.donations.insert(donation.id, donation);
    }

    pub async fn jobs(&self) -> Vec<WebhookJob> {
        self.state.lock().await.jobs.clone()
    }

    pub async fn attempts(&self) -> Vec<PaymentAttempt> {
        self.state.lock().await.attempts.clone()
    }

    pub async fn processed_event_count(&self) -> usize {
        self.state.lock().await.processed_events.len()
    }

    /// Makes a job due now, as if its backoff had elapsed.
    pub async fn make_due(&self, job_id: Uuid) {
        let mut s = self.state.lock().await;
        if let Some(job) = s.jobs.iter_mut().find(|j| j.id == job_id) {
            job.scheduled_at = Utc::now();
        }
    }
}

impl DonationStore for MemoryStore {
    fn find_campaign(&self, id: Uuid) -> StoreResult<'_, Option<Campaign>> {
        Box::pin(async move { Ok(self.state.lock().await.campaigns.get(&id).cloned()) })
    }

    fn insert(&self, donation: Donation, payment: Payment) -> StoreResult<'_, ()> {
        Box::pin(async move {
            let mut s = self.state.lock().await;
            if !s.campaigns.contains_key(&donation.campaign_id) {
                return Err(PipelineError::NotFound(format!(
                    "campaign {}",
                    donation.campaign_id
                )));
            }
            if let Some(intent) = donation.payment_intent_id.as_deref() {
                if s.donations
                    .values()
                    .any(|d| d.payment_intent_id.as_deref() == Some(intent))
                {
                    return Err(PipelineError::Conflict(format!(
                        "payment intent {intent} already attached"
                    )));
                }
            }
            s.donations.insert(donation.id, donation);
            s.payments.push(payment);
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
            let mut s = self.state.lock().await;
            let now = Utc::now();
            if let Some(p) = s.payments.iter_mut().find(|p| p.id == payment_id) {
                p.payment_intent_id = Some(intent_id.clone());
                p.updated_at = now;
            }
            let donation = s.donations.get_mut(&donation_id).ok_or_else(|| not_found(donation_id))?;
            donation.payment_intent_id = Some(intent_id);
            donation.updated_at = now;
            Ok(donation.clone())
        })
    }

    fn mark_creation_failed(
        &self,
        donation_id: Uuid,
        payment_id: Uuid,
        reason: String,
    ) -> StoreResult<'_, Donation> {
        Box::pin(async move {
            let mut s = self.state.lock().await;
            let now = Utc::now();
            if let Some(p) = s.payments.iter_mut().find(|p| p.id == payment_id) {
                p.status = PaymentStatus::Failed;
                p.metadata = serde_json::json!({ "error": reason });
                p.updated_at = now;
            }
            let donation = s.donations.get_mut(&donation_id).ok_or_else(|| not_found(donation_id))?;
            if donation.status.can_transition_to(&DonationStatus::Failed) {
                donation.status = DonationStatus::Failed;
                donation.updated_at = now;
            }
            Ok(donation.clone())
        })
    }

    fn find_by_id(&self, id: Uuid) -> StoreResult<'_, Option<Donation>> {
        Box::pin(async move { Ok(self.state.lock().await.donations.get(&id).cloned()) })
    }

    fn find_by_payment_intent_id<'a>(
        &'a self,
        intent_id: &'a str,
    ) -> StoreResult<'a, Option<Donation>> {
        Box::pin(async move {
            let s = self.state.lock().await;
            Ok(s.donations
                .values()
                .find(|d| d.payment_intent_id.as_deref() == Some(intent_id))
                .cloned())
        })
    }

    fn find_by_transaction_id<'a>(
        &'a self,
        transaction_id: &'a str,
    ) -> StoreResult<'a, Option<Donation>> {
        Box::pin(async move {
            let s = self.state.lock().await;
            Ok(s.donations
                .values()
                .find(|d| d.transaction_id.as_deref() == Some(transaction_id))
                .cloned())
        })
    }

    fn apply_user_action(
        &self,
        id: Uuid,
        action: UserAction,
        now: DateTime<Utc>,
    ) -> StoreResult<'_, Donation> {
        Box::pin(async move {
            let mut s = self.state.lock().await;
            let donation = s.donations.get_mut(&id).ok_or_else(|| not_found(id))?;
            let mut next = donation.clone();
            action.apply(&mut next, now)?;
            *donation = next.clone();
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
            let mut s = self.state.lock().await;
            let now = Utc::now();

            let donation = s
                .donations
                .get(&donation_id)
                .cloned()
                .ok_or_else(|| not_found(donation_id))?;

            let key = event.idempotency_key();
            if s.processed_events.contains(&key) {
                return Ok(ProcessResult::Duplicate);
            }

            let mine: Vec<Payment> = s
                .payments
                .iter()
                .filter(|p| p.donation_id == donation_id)
                .cloned()
                .collect();
            let existing = Payment::find_for_event(&mine, event.intent_id.as_deref());
            let plan = plan(&donation, existing, &event, now);
            if plan.decision == Decision::Deferred {
                return Err(deferred(&donation, &event));
            }
            s.processed_events.insert(key);

            if plan.payment_is_new {
                s.payments.push(plan.payment.clone());
            } else if plan.payment_changed {
                if let Some(p) = s.payments.iter_mut().find(|p| p.id == plan.payment.id) {
                    *p = plan.payment.clone();
                }
            }
            if plan.donation_changed {
                s.donations.insert(donation_id, plan.donation.clone());
            }

            let attempt = NewPaymentAttempt::from_event(plan.payment.id, &event, latency_ms).into_attempt(now);
            let attempt_id = attempt.id;
            s.attempts.push(attempt);

            Ok(ProcessResult::from_plan(&plan, donation.status, attempt_id))
        })
    }

    fn payments_for(&self, donation_id: Uuid) -> StoreResult<'_, Vec<Payment>> {
        Box::pin(async move {
            let s = self.state.lock().await;
            Ok(s.payments
                .iter()
                .filter(|p| p.donation_id == donation_id)
                .cloned()
                .collect())
        })
    }
}

impl JobQueue for MemoryStore {
    fn enqueue(&self, job: NewWebhookJob) -> StoreResult<'_, EnqueueResult> {
        Box::pin(async move {
            let mut s = self.state.lock().await;
            let now = Utc::now();

            if let Some(key) = job.dedup_key.as_deref() {
                let existing = s
                    .jobs
                    .iter_mut()
                    .find(|j| j.gateway == job.gateway && j.dedup_key.as_deref() == Some(key));
                if let Some(existing) = existing {
                    if existing.status != JobStatus::Failed {
                        return Ok(EnqueueResult::Duplicate);
                    }
                    existing.status = JobStatus::Pending;
                    existing.attempts = 0;
                    existing.last_error = None;
                    existing.payload = job.payload;
                    existing.signature = job.signature;
                    existing.scheduled_at = now;
                    existing.updated_at = now;
                    return Ok(EnqueueResult::Revived(existing.id));
                }
            }

            let id = job.id;
            s.jobs.push(job.into_job(now));
            Ok(EnqueueResult::Enqueued(id))
        })
    }

    fn claim(&self, limit: i64) -> StoreResult<'_, Vec<WebhookJob>> {
        Box::pin(async move {
            let mut s = self.state.lock().await;
            let now = Utc::now();
            let limit = usize::try_from(limit).unwrap_or(0);

            let mut due: Vec<_> = s
                .jobs
                .iter_mut()
                .filter(|j| j.status == JobStatus::Pending && j.scheduled_at <= now)
                .collect();
            due.sort_by_key(|j| j.scheduled_at);

            Ok(due
                .into_iter()
                .take(limit)
                .map(|j| {
                    j.status = JobStatus::Processing;
                    j.updated_at = now;
                    j.clone()
                })
                .collect())
        })
    }

    fn reschedule(&self, id: Uuid, error: String, delay: Duration) -> StoreResult<'_, ()> {
        Box::pin(async move {
            let delay = to_delta(delay)?;
            let mut s = self.state.lock().await;
            let now = Utc::now();
            if let Some(job) = s.jobs.iter_mut().find(|j| j.id == id && j.status == JobStatus::Processing) {
                job.attempts += 1;
                job.last_error = Some(error);
                job.status = JobStatus::Pending;
                job.scheduled_at = now + delay;
                job.updated_at = now;
            }
            Ok(())
        })
    }

    fn finish(&self, id: Uuid, outcome: JobOutcome) -> StoreResult<'_, ()> {
        Box::pin(async move {
            let mut s = self.state.lock().await;
            if let Some(job) = s.jobs.iter_mut().find(|j| j.id == id && j.status == JobStatus::Processing) {
                if matches!(outcome, JobOutcome::Failed(_)) {
                    job.attempts += 1;
                }
                job.status = outcome.status();
                job.last_error = outcome.error().map(str::to_string);
                job.updated_at = Utc::now();
            }
            Ok(())
        })
    }

    fn reap_stale(&self, older_than: Duration) -> StoreResult<'_, u64> {
        Box::pin(async move {
            let cutoff = Utc::now() - to_delta(older_than)?;
            let mut s = self.state.lock().await;
            let mut reaped = 0;
            for job in s
                .jobs
                .iter_mut()
                .filter(|j| j.status == JobStatus::Processing && j.updated_at < cutoff)
            {
                job.status = JobStatus::Pending;
                job.updated_at = Utc::now();
                reaped += 1;
            }
            Ok(reaped)
        })
    }

    fn failed_jobs(&self, limit: i64) -> StoreResult<'_, Vec<WebhookJob>> {
        Box::pin(async move {
            let s = self.state.lock().await;
            let mut failed: Vec<_> = s
                .jobs
                .iter()
                .filter(|j| j.status == JobStatus::Failed)
                .cloned()
                .collect();
            failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            failed.truncate(usize::try_from(limit).unwrap_or(0));
            Ok(failed)
        })
    }
}

impl AttemptLog for MemoryStore {
    fn record(&self, attempt: NewPaymentAttempt) -> StoreResult<'_, PaymentAttempt> {
        Box::pin(async move {
            let attempt = attempt.into_attempt(Utc::now());
            self.state.lock().await.attempts.push(attempt.clone());
            Ok(attempt)
        })
    }

    fn attempts_since(
        &self,
        since: DateTime<Utc>,
        gateway: Option<GatewayName>,
    ) -> StoreResult<'_, Vec<PaymentAttempt>> {
        Box::pin(async move {
            let s = self.state.lock().await;
            Ok(s.attempts
                .iter()
                .filter(|a| a.created_at >= since)
                .filter(|a| gateway.is_none_or(|g| a.gateway == g))
                .cloned()
                .collect())
        })
    }

    fn attempts_for_payment(&self, payment_id: Uuid) -> StoreResult<'_, Vec<PaymentAttempt>> {
        Box::pin(async move {
            let s = self.state.lock().await;
            Ok(s.attempts
                .iter()
                .filter(|a| a.payment_id == payment_id)
                .cloned()
                .collect())
        })
    }
}
