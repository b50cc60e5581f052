use {
    crate::domain::{
        audit::AuditEvent,
        donation::{Donation, DonationStatus},
        error::PipelineError,
        event::{CanonicalEvent, EventKind},
        gateway::{Freshness, GatewayRegistry},
        job::WebhookJob,
        money::MoneyAmount,
        notify::{Notification, Notifier},
        store::DonationStore,
        transition::ProcessResult,
    },
    std::{sync::Arc, time::Instant},
};

/// Turns one queued delivery into at most one donation transition.
pub struct Reconciler {
    donations: Arc<dyn DonationStore>,
    gateways: Arc<GatewayRegistry>,
    notifier: Arc<dyn Notifier>,
    large_donation_threshold: MoneyAmount,
}

impl Reconciler {
    pub fn new(
        donations: Arc<dyn DonationStore>,
        gateways: Arc<GatewayRegistry>,
        notifier: Arc<dyn Notifier>,
        large_donation_threshold: MoneyAmount,
    ) -> Self {
        Self {
            donations,
            gateways,
            notifier,
            large_donation_threshold,
        }
    }

    pub async fn process(&self, job: &WebhookJob) -> Result<ProcessResult, PipelineError> {
        let adapter = self.gateways.get(job.gateway).ok_or_else(|| {
            PipelineError::NotFound(format!("gateway not configured: {}", job.gateway))
        })?;
        let payload = job.payload.as_bytes();

        // Stored deliveries are re-verified; a rotated secret fails here for good.
        if !adapter.validate_webhook_signature(payload, &job.signature, Freshness::Ignore) {
            return Err(PipelineError::WebhookSignature(format!(
                "stored {} delivery no longer verifies",
                job.gateway
            )));
        }

        let event = adapter.parse_webhook_event(payload)?;
        let started = Instant::now();
        let event = adapter.refresh_event(event).await?;
        let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        if !event.kind.is_actionable() {
            return Err(PipelineError::UnknownEvent(event.event_type));
        }

        let donation = self.resolve_donation(job, &event).await?;
        let result = self
            .donations
            .apply_reconciliation(donation.id, event.clone(), latency_ms)
            .await?;

        self.report(&event, &result).await;
        Ok(result)
    }

    /// Job hint first, then the intent id, then the transaction id.
    async fn resolve_donation(
        &self,
        job: &WebhookJob,
        event: &CanonicalEvent,
    ) -> Result<Donation, PipelineError> {
        if let Some(id) = job.donation_id {
            if let Some(d) = self.donations.find_by_id(id).await? {
                return Ok(d);
            }
        }
        let (intent_id, transaction_id) = event.lookup_keys();
        if let Some(intent_id) = intent_id {
            if let Some(d) = self.donations.find_by_payment_intent_id(intent_id).await? {
                return Ok(d);
            }
        }
        if let Some(transaction_id) = transaction_id {
            if let Some(d) = self.donations.find_by_transaction_id(transaction_id).await? {
                return Ok(d);
            }
        }
        Err(PipelineError::NotFound(format!(
            "no donation for {} event {} (intent {:?}, transaction {:?})",
            event.gateway, event.event_id, intent_id, transaction_id
        )))
    }

    async fn report(&self, event: &CanonicalEvent, result: &ProcessResult) {
        let event_id = event.event_id.as_str();
        match result {
            ProcessResult::Advanced { donation, from, .. } => {
                AuditEvent::DonationTransitioned {
                    donation_id: donation.id,
                    from: from.as_str(),
                    to: donation.status.as_str(),
                    event_id,
                }
                .emit();
                tracing::info!(
                    donation_id = %donation.id,
                    from = %from,
                    to = %donation.status,
                    event_id,
                    "donation status advanced"
                );
                match donation.status {
                    DonationStatus::Completed => {
                        self.notify(Notification::DonationProcessed {
                            donation: donation.clone(),
                        })
                        .await;
                        if donation.money.amount() >= self.large_donation_threshold {
                            self.notify(Notification::LargeDonation {
                                donation: donation.clone(),
                            })
                            .await;
                        }
                    }
                    DonationStatus::Failed => {
                        let reason = match &event.kind {
                            EventKind::PaymentFailed { reason } => reason.clone(),
                            _ => None,
                        };
                        self.notify(Notification::PaymentFailed {
                            donation: donation.clone(),
                            reason,
                        })
                        .await;
                    }
                    _ => {}
                }
            }
            ProcessResult::Flagged { donation, .. } => {
                AuditEvent::ComplianceReviewFlagged {
                    donation_id: donation.id,
                    event_id,
                }
                .emit();
                tracing::warn!(donation_id = %donation.id, event_id, "dispute opened, flagged for compliance review");
                let reason = match &event.kind {
                    EventKind::DisputeCreated { reason } => reason.clone(),
                    _ => None,
                };
                self.notify(Notification::DisputeOpened {
                    donation: donation.clone(),
                    reason,
                })
                .await;
            }
            ProcessResult::Unchanged { donation, .. } => {
                tracing::info!(donation_id = %donation.id, status = %donation.status, event_id, "no status change");
            }
            ProcessResult::Rejected { donation, .. } => {
                tracing::warn!(
                    donation_id = %donation.id,
                    status = %donation.status,
                    event_type = %event.event_type,
                    event_id,
                    "illegal transition, ignored"
                );
            }
            ProcessResult::Conflict { donation_id } => {
                tracing::warn!(
                    alert = "conditional_update_conflict",
                    %donation_id,
                    event_id,
                    "donation changed concurrently, event not applied"
                );
            }
            ProcessResult::Duplicate => {
                AuditEvent::WebhookDuplicate {
                    gateway: event.gateway,
                    event_id,
                }
                .emit();
                tracing::info!(event_id, "duplicate event, already processed");
            }
        }
    }

    async fn notify(&self, notification: Notification) {
        let kind = notification.kind();
        let donation_id = notification.donation().id;
        if let Err(e) = self.notifier.notify(notification).await {
            tracing::error!(kind, %donation_id, error = %e, "notification dispatch failed");
        }
    }
}
