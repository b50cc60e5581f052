use {
    crate::domain::{
        attempt::{AttemptOutcome, NewPaymentAttempt},
        donation::{Donation, NewDonation, NewDonationParams, RecurringFrequency, UserAction},
        error::{GatewayError, PipelineError},
        gateway::{GatewayName, GatewayRegistry, IntentRequest},
        money::{Currency, Money},
        payment::Payment,
        store::{AttemptLog, DonationStore},
    },
    chrono::Utc,
    rust_decimal::Decimal,
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
    uuid::Uuid,
};

#[derive(Debug, Clone)]
pub struct CreateDonation {
    pub campaign_id: Uuid,
    pub donor_id: Option<Uuid>,
    /// Major units (`25.50`).
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_method: String,
    pub payment_gateway: Option<GatewayName>,
    pub anonymous: bool,
    pub recurring: bool,
    pub frequency: Option<RecurringFrequency>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedDonation {
    pub donation: Donation,
    pub client_secret: Option<String>,
    pub checkout_url: Option<String>,
}

pub struct DonationService {
    donations: Arc<dyn DonationStore>,
    attempts: Arc<dyn AttemptLog>,
    gateways: Arc<GatewayRegistry>,
    intent_timeout: Duration,
}

impl DonationService {
    pub fn new(
        donations: Arc<dyn DonationStore>,
        attempts: Arc<dyn AttemptLog>,
        gateways: Arc<GatewayRegistry>,
        intent_timeout: Duration,
    ) -> Self {
        Self {
            donations,
            attempts,
            gateways,
            intent_timeout,
        }
    }

    pub async fn create(&self, req: CreateDonation) -> Result<CreatedDonation, PipelineError> {
        let campaign = self
            .donations
            .find_campaign(req.campaign_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("campaign {}", req.campaign_id)))?;
        if !campaign.accepting_donations {
            return Err(PipelineError::Conflict(format!(
                "campaign {} is not accepting donations",
                campaign.id
            )));
        }

        let money = Money::from_decimal(req.amount, req.currency)?;
        let adapter = self.gateways.select(req.payment_gateway, req.currency)?;
        let gateway = adapter.name();

        let donation = NewDonation::new(NewDonationParams {
            campaign_id: campaign.id,
            donor_id: req.donor_id,
            money: money.clone(),
            payment_method: req.payment_method,
            gateway,
            anonymous: req.anonymous,
            recurring: req.recurring,
            frequency: req.frequency,
            notes: req.notes,
        })?
        .into_donation();
        let payment = Payment::new(donation.id, gateway, None, serde_json::Value::Null);
        let (donation_id, payment_id) = (donation.id, payment.id);
        self.donations.insert(donation, payment).await?;

        let started = Instant::now();
        let created = match tokio::time::timeout(
            self.intent_timeout,
            adapter.create_payment_intent(IntentRequest {
                donation_id,
                money,
                description: format!("Donation to {}", campaign.title),
            }),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        };
        let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let request_id = format!("create:{donation_id}");

        match created {
            Ok(intent) => {
                let donation = self
                    .donations
                    .attach_intent(donation_id, payment_id, intent.intent_id.clone())
                    .await?;
                self.attempts
                    .record(NewPaymentAttempt::new(
                        payment_id,
                        gateway,
                        request_id,
                        AttemptOutcome::Success,
                        latency_ms,
                        None,
                        intent.raw,
                    ))
                    .await?;
                tracing::info!(
                    %donation_id,
                    %gateway,
                    intent_id = %intent.intent_id,
                    latency_ms,
                    "payment intent created"
                );
                Ok(CreatedDonation {
                    donation,
                    client_secret: intent.client_secret,
                    checkout_url: intent.checkout_url,
                })
            }
            Err(e) => {
                let outcome = match e {
                    GatewayError::Timeout => AttemptOutcome::Timeout,
                    _ => AttemptOutcome::Failure,
                };
                self.donations
                    .mark_creation_failed(donation_id, payment_id, e.to_string())
                    .await?;
                self.attempts
                    .record(NewPaymentAttempt::new(
                        payment_id,
                        gateway,
                        request_id,
                        outcome,
                        latency_ms,
                        Some(e.to_string()),
                        serde_json::json!({ "error": e.to_string() }),
                    ))
                    .await?;
                tracing::warn!(%donation_id, %gateway, error = %e, latency_ms, "payment intent creation failed");
                Err(e.into())
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Donation, PipelineError> {
        self.donations
            .find_by_id(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("donation {id}")))
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Donation, PipelineError> {
        let donation = self
            .donations
            .apply_user_action(id, UserAction::Cancel, Utc::now())
            .await?;
        tracing::info!(donation_id = %id, "donation cancelled by donor");
        Ok(donation)
    }

    pub async fn request_refund(&self, id: Uuid) -> Result<Donation, PipelineError> {
        let donation = self
            .donations
            .apply_user_action(id, UserAction::RequestRefund, Utc::now())
            .await?;
        tracing::info!(donation_id = %id, "refund requested");
        Ok(donation)
    }
}
