pub mod signature;

use {
    crate::domain::{
        error::GatewayError,
        event::{CanonicalEvent, EventKind},
        gateway::{
            BoxFuture, CreatedIntent, Freshness, GatewayAdapter, GatewayName, IntentRequest,
            PaymentGateway,
        },
        id::EventId,
        money::{Currency, MoneyAmount},
    },
    serde::Deserialize,
    serde_json::Value,
    std::{collections::HashMap, time::Duration},
};

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String, // evt_xxx, idempotency key
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    livemode: bool,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Value,
}

pub struct StripeGateway {
    client: stripe::Client,
    webhook_secret: String,
    tolerance: Duration,
    descriptor: PaymentGateway,
}

impl StripeGateway {
    pub fn new(secret_key: &str, webhook_secret: impl Into<String>, descriptor: PaymentGateway) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
            webhook_secret: webhook_secret.into(),
            tolerance: Duration::from_secs(300),
            descriptor,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    async fn create_payment_intent_inner(
        &self,
        request: IntentRequest,
    ) -> Result<CreatedIntent, GatewayError> {
        let mut params = stripe::CreatePaymentIntent::new(
            request.money.amount().minor(),
            convert_currency(request.money.currency()),
        );
        params.description = Some(&request.description);
        params.metadata = Some(HashMap::from([(
            "donation_id".to_string(),
            request.donation_id.to_string(),
        )]));

        let pi = stripe::PaymentIntent::create(&self.client, params)
            .await
            .map_err(convert_error)?;

        Ok(CreatedIntent {
            intent_id: pi.id.to_string(),
            client_secret: pi.client_secret.clone(),
            checkout_url: None,
            raw: serde_json::to_value(&pi).unwrap_or_default(),
        })
    }
}

fn convert_currency(c: Currency) -> stripe::Currency {
    match c {
        Currency::Usd => stripe::Currency::USD,
        Currency::Eur => stripe::Currency::EUR,
        Currency::Gbp => stripe::Currency::GBP,
        Currency::Chf => stripe::Currency::CHF,
        Currency::Jpy => stripe::Currency::JPY,
    }
}

fn convert_error(e: stripe::StripeError) -> GatewayError {
    match e {
        stripe::StripeError::Stripe(req) if req.http_status >= 500 => GatewayError::Unavailable(
            format!("stripe returned {}", req.http_status),
        ),
        stripe::StripeError::Stripe(req) => GatewayError::Rejected(
            req.message
                .unwrap_or_else(|| format!("stripe returned {}", req.http_status)),
        ),
        stripe::StripeError::Timeout => GatewayError::Timeout,
        stripe::StripeError::ClientError(msg) => GatewayError::Unavailable(msg),
        other => GatewayError::Rejected(other.to_string()),
    }
}

/// String field, or the `id` of an expanded object.
fn id_field(object: &Value, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(o) => o.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn failure_reason(object: &Value) -> Option<String> {
    let error = object.get("last_payment_error")?;
    error
        .get("message")
        .or_else(|| error.get("code"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn parse_event(payload: &[u8]) -> Result<CanonicalEvent, GatewayError> {
    let raw: Value = serde_json::from_slice(payload)
        .map_err(|e| GatewayError::InvalidPayload(format!("invalid JSON: {e}")))?;
    let event: StripeEvent = serde_json::from_value(raw.clone())
        .map_err(|e| GatewayError::InvalidPayload(format!("not a stripe event: {e}")))?;
    let event_id = EventId::new(event.id)
        .map_err(|e| GatewayError::InvalidPayload(e.to_string()))?;

    let object = &event.data.object;
    let object_id = id_field(object, "id").unwrap_or_default();

    let (kind, intent_id, transaction_id) = match event.event_type.as_str() {
        "payment_intent.succeeded" => (
            EventKind::PaymentSucceeded,
            Some(object_id.clone()),
            id_field(object, "latest_charge"),
        ),
        "payment_intent.payment_failed" => (
            EventKind::PaymentFailed {
                reason: failure_reason(object),
            },
            Some(object_id.clone()),
            id_field(object, "latest_charge"),
        ),
        "payment_intent.requires_action" => {
            (EventKind::RequiresAction, Some(object_id.clone()), None)
        }
        "payment_intent.processing" => (EventKind::Processing, Some(object_id.clone()), None),
        "payment_intent.canceled" => (EventKind::Canceled, Some(object_id.clone()), None),
        "charge.refunded" => {
            let refunded = object
                .get("amount_refunded")
                .and_then(Value::as_i64)
                .ok_or_else(|| GatewayError::InvalidPayload("charge without amount_refunded".into()))?;
            let amount_refunded = MoneyAmount::new(refunded)
                .map_err(|e| GatewayError::InvalidPayload(e.to_string()))?;
            (
                EventKind::Refunded { amount_refunded },
                id_field(object, "payment_intent"),
                Some(object_id.clone()),
            )
        }
        "charge.dispute.created" => (
            EventKind::DisputeCreated {
                reason: object.get("reason").and_then(Value::as_str).map(str::to_string),
            },
            id_field(object, "payment_intent"),
            id_field(object, "charge"),
        ),
        _ => (EventKind::Unknown, None, None),
    };

    if !event.livemode {
        tracing::debug!(event_id = %event_id, "stripe test-mode event");
    }

    Ok(CanonicalEvent {
        gateway: GatewayName::Stripe,
        event_id,
        event_type: event.event_type,
        kind,
        external_id: object_id,
        intent_id,
        transaction_id,
        captured: false,
        raw,
    })
}

impl GatewayAdapter for StripeGateway {
    fn descriptor(&self) -> &PaymentGateway {
        &self.descriptor
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn validate_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
        freshness: Freshness,
    ) -> bool {
        let tolerance = match freshness {
            Freshness::Enforce => Some(self.tolerance),
            Freshness::Ignore => None,
        };
        signature::validate_webhook_signature(payload, signature, &self.webhook_secret, tolerance)
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> Result<CanonicalEvent, GatewayError> {
        parse_event(payload)
    }

    /// Stripe events carry the object state at send time.
    fn refresh_event(
        &self,
        event: CanonicalEvent,
    ) -> BoxFuture<'_, Result<CanonicalEvent, GatewayError>> {
        Box::pin(async move { Ok(event) })
    }

    fn create_payment_intent(
        &self,
        request: IntentRequest,
    ) -> BoxFuture<'_, Result<CreatedIntent, GatewayError>> {
        Box::pin(async move { self.create_payment_intent_inner(request).await })
    }
}
