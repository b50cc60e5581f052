use {
    crate::domain::{
        audit::AuditEvent,
        error::{GatewayError, PipelineError},
        gateway::{Freshness, GatewayName, GatewayRegistry},
        job::{EnqueueResult, NewWebhookJob},
        store::JobQueue,
    },
};

#[derive(Debug)]
pub struct AcceptedWebhook {
    pub gateway: GatewayName,
    pub event_id: String,
    pub event_type: String,
    pub result: EnqueueResult,
}

/// Synchronous half of webhook handling: resolve the gateway, parse,
/// verify the signature, enqueue. Nothing is written unless every check
/// passes.
pub async fn accept_webhook(
    gateways: &GatewayRegistry,
    jobs: &dyn JobQueue,
    gateway: &str,
    payload: &[u8],
    signature: Option<&str>,
) -> Result<AcceptedWebhook, PipelineError> {
    let adapter = gateways.resolve(gateway)?;
    let name = adapter.name();

    let event = adapter.parse_webhook_event(payload).inspect_err(|e| {
        AuditEvent::WebhookRejected {
            gateway,
            reason: "invalid payload",
        }
        .emit();
        tracing::warn!(%name, error = %e, "webhook payload rejected");
    })?;

    let signature = signature.unwrap_or_default();
    if !adapter.validate_webhook_signature(payload, signature, Freshness::Enforce) {
        AuditEvent::WebhookRejected {
            gateway,
            reason: "signature",
        }
        .emit();
        return Err(PipelineError::WebhookSignature(format!(
            "{name} signature did not verify"
        )));
    }

    let body = std::str::from_utf8(payload)
        .map_err(|_| GatewayError::InvalidPayload("body is not UTF-8".into()))?;

    let job = NewWebhookJob::new(
        name,
        event.delivery_key(),
        event.event_type.clone(),
        body,
        signature,
    );
    let result = jobs.enqueue(job).await?;

    match result {
        EnqueueResult::Duplicate => AuditEvent::WebhookDuplicate {
            gateway: name,
            event_id: event.event_id.as_str(),
        }
        .emit(),
        EnqueueResult::Enqueued(_) | EnqueueResult::Revived(_) => AuditEvent::WebhookReceived {
            gateway: name,
            event_id: event.event_id.as_str(),
            event_type: &event.event_type,
        }
        .emit(),
    }

    Ok(AcceptedWebhook {
        gateway: name,
        event_id: event.event_id.into_inner(),
        event_type: event.event_type,
        result,
    })
}
