mod common;

use {
    common::*,
    donation_sync::{
        domain::{
            donation::{DonationStatus, NewDonation, NewDonationParams, UserAction},
            error::PipelineError,
            event::{CanonicalEvent, EventKind},
            gateway::GatewayName,
            id::EventId,
            job::{EnqueueResult, JobOutcome, JobStatus, NewWebhookJob},
            money::{Currency, Money, MoneyAmount},
            payment::{Payment, PaymentStatus},
            store::{AttemptLog, DonationStore, JobQueue},
            transition::ProcessResult,
        },
        infra::postgres::PgStore,
    },
    serde_json::Value,
    std::time::Duration,
    uuid::Uuid,
};

const DB: &str = "donation_sync_test_store";

async fn store() -> PgStore {
    PgStore::new(setup_pool(DB).await)
}

async fn campaign(store: &PgStore) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO campaigns (id, title) VALUES ($1, 'Test campaign')")
        .bind(id)
        .execute(store.pool())
        .await
        .unwrap();
    id
}

async fn seed(store: &PgStore, intent: &str, minor: i64) -> Uuid {
    let campaign_id = campaign(store).await;
    let donation = NewDonation::new(NewDonationParams {
        campaign_id,
        donor_id: None,
        money: Money::new(MoneyAmount::new(minor).unwrap(), Currency::Usd),
        payment_method: "card".into(),
        gateway: GatewayName::Stripe,
        anonymous: true,
        recurring: false,
        frequency: None,
        notes: None,
    })
    .unwrap()
    .into_donation();
    let payment = Payment::new(donation.id, GatewayName::Stripe, None, Value::Null);
    let payment_id = payment.id;
    store.insert(donation.clone(), payment).await.unwrap();
    store
        .attach_intent(donation.id, payment_id, intent.to_string())
        .await
        .unwrap();
    donation.id
}

fn event(event_id: &str, intent: &str, kind: EventKind) -> CanonicalEvent {
    CanonicalEvent {
        gateway: GatewayName::Stripe,
        event_id: EventId::new(event_id).unwrap(),
        event_type: "payment_intent.test".into(),
        kind,
        external_id: intent.into(),
        intent_id: Some(intent.into()),
        transaction_id: Some(format!("ch_{intent}")),
        captured: false,
        raw: Value::Null,
    }
}

fn unique(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::now_v7().simple())
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn insert_attach_and_find() {
    let store = store().await;
    let intent = unique("pi");
    let id = seed(&store, &intent, 2500).await;

    let by_intent = store.find_by_payment_intent_id(&intent).await.unwrap().unwrap();
    assert_eq!(by_intent.id, id);
    assert_eq!(by_intent.status, DonationStatus::Pending);
    assert_eq!(by_intent.money.amount().minor(), 2500);

    let payments = store.payments_for(id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].payment_intent_id.as_deref(), Some(intent.as_str()));
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn reconciliation_advances_and_dedups() {
    let store = store().await;
    let intent = unique("pi");
    let id = seed(&store, &intent, 2500).await;
    let evt = event(&unique("evt"), &intent, EventKind::PaymentSucceeded);

    let first = store.apply_reconciliation(id, evt.clone(), 12).await.unwrap();
    let ProcessResult::Advanced { donation, from, attempt_id } = first else {
        panic!("expected an advance, got {first:?}");
    };
    assert_eq!(from, DonationStatus::Pending);
    assert_eq!(donation.status, DonationStatus::Completed);
    assert!(donation.completed_at.is_some());
    assert_eq!(donation.transaction_id, Some(format!("ch_{intent}")));

    let second = store.apply_reconciliation(id, evt, 12).await.unwrap();
    assert!(matches!(second, ProcessResult::Duplicate));

    let payments = store.payments_for(id).await.unwrap();
    assert_eq!(payments[0].status, PaymentStatus::Succeeded);
    let attempts = store.attempts_for_payment(payments[0].id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].id, attempt_id);
    assert_eq!(attempts[0].latency_ms, 12);
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn illegal_transition_is_rejected_but_audited() {
    let store = store().await;
    let intent = unique("pi");
    let id = seed(&store, &intent, 2500).await;

    store
        .apply_reconciliation(id, event(&unique("evt"), &intent, EventKind::PaymentSucceeded), 1)
        .await
        .unwrap();
    let late_failure = event(&unique("evt"), &intent, EventKind::PaymentFailed { reason: None });
    let result = store.apply_reconciliation(id, late_failure, 1).await.unwrap();

    let ProcessResult::Rejected { donation, .. } = result else {
        panic!("expected rejection, got {result:?}");
    };
    assert_eq!(donation.status, DonationStatus::Completed);
    let payments = store.payments_for(id).await.unwrap();
    assert_eq!(store.attempts_for_payment(payments[0].id).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn cumulative_refunds_are_capped() {
    let store = store().await;
    let intent = unique("pi");
    let id = seed(&store, &intent, 1000).await;
    store
        .apply_reconciliation(id, event(&unique("evt"), &intent, EventKind::PaymentSucceeded), 1)
        .await
        .unwrap();

    let partial = EventKind::Refunded {
        amount_refunded: MoneyAmount::new(300).unwrap(),
    };
    store
        .apply_reconciliation(id, event(&unique("evt"), &intent, partial), 1)
        .await
        .unwrap();
    let after = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(after.status, DonationStatus::PartiallyRefunded);
    assert_eq!(after.refunded_amount.minor(), 300);

    let over = EventKind::Refunded {
        amount_refunded: MoneyAmount::new(5000).unwrap(),
    };
    store
        .apply_reconciliation(id, event(&unique("evt"), &intent, over), 1)
        .await
        .unwrap();
    let after = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(after.status, DonationStatus::Refunded);
    assert_eq!(after.refunded_amount.minor(), 1000);
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn user_actions_check_current_status() {
    let store = store().await;
    let intent = unique("pi");
    let id = seed(&store, &intent, 1000).await;

    let cancelled = store
        .apply_user_action(id, UserAction::Cancel, chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(cancelled.status, DonationStatus::Cancelled);

    let again = store
        .apply_user_action(id, UserAction::Cancel, chrono::Utc::now())
        .await;
    assert!(matches!(again, Err(PipelineError::Conflict(_))));

    let missing = store
        .apply_user_action(Uuid::now_v7(), UserAction::Cancel, chrono::Utc::now())
        .await;
    assert!(matches!(missing, Err(PipelineError::NotFound(_))));
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn job_queue_dedup_claim_and_revive() {
    let store = store().await;
    let key = unique("evt");
    let job = || {
        NewWebhookJob::new(
            GatewayName::Stripe,
            Some(key.clone()),
            "payment_intent.succeeded",
            "{}",
            "sig",
        )
    };

    let EnqueueResult::Enqueued(id) = store.enqueue(job()).await.unwrap() else {
        panic!("expected a new job");
    };
    assert_eq!(store.enqueue(job()).await.unwrap(), EnqueueResult::Duplicate);

    let claimed = store.claim(100).await.unwrap();
    assert!(claimed.iter().any(|j| j.id == id));
    let mine = claimed.iter().find(|j| j.id == id).unwrap();
    assert_eq!(mine.status, JobStatus::Processing);

    store
        .reschedule(id, "gateway unavailable".into(), Duration::from_secs(60))
        .await
        .unwrap();
    assert!(!store.claim(100).await.unwrap().iter().any(|j| j.id == id));

    // not processing any more: a late finish from the old claim is ignored
    store.finish(id, JobOutcome::Completed).await.unwrap();
    assert!(!store.failed_jobs(100).await.unwrap().iter().any(|j| j.id == id));

    sqlx::query("UPDATE webhook_jobs SET scheduled_at = now() WHERE id = $1")
        .bind(id)
        .execute(store.pool())
        .await
        .unwrap();
    assert!(store.claim(100).await.unwrap().iter().any(|j| j.id == id));
    store
        .finish(id, JobOutcome::Failed("retries exhausted".into()))
        .await
        .unwrap();
    let gaps = store.failed_jobs(100).await.unwrap();
    let gap = gaps.iter().find(|j| j.id == id).unwrap();
    assert_eq!(gap.attempts, 2);
    assert_eq!(gap.last_error.as_deref(), Some("retries exhausted"));

    assert_eq!(store.enqueue(job()).await.unwrap(), EnqueueResult::Revived(id));
    assert!(store.claim(100).await.unwrap().iter().any(|j| j.id == id));
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn jobs_without_key_are_never_collapsed() {
    let store = store().await;
    let job = || NewWebhookJob::new(GatewayName::Mollie, None, "payment.state_changed", "id=tr_1", "sig");

    assert!(matches!(store.enqueue(job()).await.unwrap(), EnqueueResult::Enqueued(_)));
    assert!(matches!(store.enqueue(job()).await.unwrap(), EnqueueResult::Enqueued(_)));
}
