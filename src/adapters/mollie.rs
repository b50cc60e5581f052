//! Mollie payments API. Webhooks only carry the payment id; the state is
//! fetched from `GET /v2/payments/{id}` in [`GatewayAdapter::refresh_event`].

use {
    crate::domain::{
        error::GatewayError,
        event::{CanonicalEvent, EventKind},
        gateway::{
            BoxFuture, CreatedIntent, Freshness, GatewayAdapter, GatewayName, IntentRequest,
            PaymentGateway,
        },
        id::{EventId, ExternalId},
        money::{Currency, Money, MoneyAmount},
    },
    hmac::{Hmac, Mac},
    serde::Deserialize,
    serde_json::{Value, json},
    sha2::Sha256,
    std::time::Duration,
    subtle::ConstantTimeEq,
};

pub const SIGNATURE_HEADER: &str = "X-Mollie-Signature";
pub const DEFAULT_API_BASE: &str = "https://api.mollie.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct WebhookBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MollieAmount {
    currency: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MolliePayment {
    id: String,
    status: String,
    #[serde(default)]
    paid_at: Option<String>,
    #[serde(default)]
    amount_refunded: Option<MollieAmount>,
    #[serde(default)]
    amount_charged_back: Option<MollieAmount>,
    #[serde(default)]
    details: Option<Value>,
}

pub struct MollieGateway {
    http: reqwest::Client,
    api_key: String,
    webhook_secret: String,
    api_base: String,
    public_base_url: String,
    descriptor: PaymentGateway,
}

impl MollieGateway {
    pub fn new(
        api_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        public_base_url: impl Into<String>,
        descriptor: PaymentGateway,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            public_base_url: public_base_url.into(),
            descriptor,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, GatewayError> {
        let response = request
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(convert_transport_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("mollie returned {status}")));
        }
        if !status.is_success() {
            let detail = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("mollie returned {status}"));
            return Err(GatewayError::Rejected(detail));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("unreadable mollie response: {e}")))
    }

    async fn refresh_event_inner(&self, event: CanonicalEvent) -> Result<CanonicalEvent, GatewayError> {
        let url = format!("{}/v2/payments/{}", self.api_base, event.external_id);
        let raw = self.send(self.http.get(&url)).await?;
        event_from_payment(raw)
    }

    async fn create_payment_intent_inner(
        &self,
        request: IntentRequest,
    ) -> Result<CreatedIntent, GatewayError> {
        let body = json!({
            "amount": {
                "currency": request.money.currency().as_str().to_ascii_uppercase(),
                "value": request.money.to_decimal_string(),
            },
            "description": request.description,
            "redirectUrl": format!("{}/donations/{}/return", self.public_base_url, request.donation_id),
            "webhookUrl": format!("{}/webhooks/mollie", self.public_base_url),
            "metadata": { "donation_id": request.donation_id.to_string() },
        });

        let url = format!("{}/v2/payments", self.api_base);
        let raw = self.send(self.http.post(&url).json(&body)).await?;

        let intent_id = raw
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Unavailable("mollie response without id".into()))?
            .to_string();
        let checkout_url = raw
            .pointer("/_links/checkout/href")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(CreatedIntent {
            intent_id,
            client_secret: None,
            checkout_url,
            raw,
        })
    }
}

fn convert_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable(e.to_string())
    }
}

fn amount_of(amount: Option<&MollieAmount>) -> Result<MoneyAmount, GatewayError> {
    let Some(amount) = amount else {
        return Ok(MoneyAmount::ZERO);
    };
    let currency = Currency::try_from(amount.currency.as_str())
        .map_err(|e| GatewayError::InvalidPayload(e.to_string()))?;
    Money::parse(&amount.value, currency)
        .map(|m| m.amount())
        .map_err(|e| GatewayError::InvalidPayload(e.to_string()))
}

/// Maps a fetched payment to the event it implies. The event id encodes the
/// observed state, so a later state of the same payment is a new event.
fn event_from_payment(raw: Value) -> Result<CanonicalEvent, GatewayError> {
    let payment: MolliePayment = serde_json::from_value(raw.clone())
        .map_err(|e| GatewayError::InvalidPayload(format!("not a mollie payment: {e}")))?;

    let captured = payment.paid_at.is_some() || payment.status == "paid";
    let charged_back = amount_of(payment.amount_charged_back.as_ref())?;
    let refunded = amount_of(payment.amount_refunded.as_ref())?;

    let (kind, event_type, event_id) = if !charged_back.is_zero() {
        (
            EventKind::DisputeCreated {
                reason: Some("chargeback".into()),
            },
            "payment.charged_back".to_string(),
            format!("{}:chargeback:{charged_back}", payment.id),
        )
    } else if !refunded.is_zero() {
        (
            EventKind::Refunded {
                amount_refunded: refunded,
            },
            "payment.refunded".to_string(),
            format!("{}:refunded:{refunded}", payment.id),
        )
    } else {
        let kind = match payment.status.as_str() {
            "paid" => EventKind::PaymentSucceeded,
            "failed" => EventKind::PaymentFailed {
                reason: payment
                    .details
                    .as_ref()
                    .and_then(|d| d.get("failureReason"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            "canceled" | "expired" => EventKind::Canceled,
            "open" | "pending" | "authorized" => EventKind::Processing,
            _ => EventKind::Unknown,
        };
        (
            kind,
            format!("payment.{}", payment.status),
            format!("{}:{}", payment.id, payment.status),
        )
    };

    Ok(CanonicalEvent {
        gateway: GatewayName::Mollie,
        event_id: EventId::new(event_id).map_err(|e| GatewayError::InvalidPayload(e.to_string()))?,
        event_type,
        kind,
        external_id: payment.id.clone(),
        intent_id: Some(payment.id),
        transaction_id: None,
        captured,
        raw,
    })
}

fn parse_event(payload: &[u8]) -> Result<CanonicalEvent, GatewayError> {
    let trimmed = payload.trim_ascii_start();
    let body: WebhookBody = if trimmed.starts_with(b"{") {
        serde_json::from_slice(trimmed)
            .map_err(|e| GatewayError::InvalidPayload(format!("invalid JSON: {e}")))?
    } else {
        serde_urlencoded::from_bytes(trimmed)
            .map_err(|e| GatewayError::InvalidPayload(format!("invalid form body: {e}")))?
    };
    let id = ExternalId::new(body.id).map_err(|e| GatewayError::InvalidPayload(e.to_string()))?;

    Ok(CanonicalEvent {
        gateway: GatewayName::Mollie,
        event_id: EventId::new(id.as_str()).map_err(|e| GatewayError::InvalidPayload(e.to_string()))?,
        event_type: "payment.webhook".into(),
        kind: EventKind::StateChanged,
        external_id: id.as_str().to_string(),
        intent_id: Some(id.as_str().to_string()),
        transaction_id: None,
        captured: false,
        raw: json!({ "id": id.as_str() }),
    })
}

/// Accepts `sha256=<hex>` or bare hex over the raw body.
pub fn validate_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let signature = signature.trim();
    let hex_part = signature.strip_prefix("sha256=").unwrap_or(signature);
    if hex_part.is_empty() || secret.is_empty() {
        return false;
    }
    let Ok(given) = hex::decode(hex_part) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let expected = mac.finalize().into_bytes();
    given.len() == expected.len() && bool::from(given.as_slice().ct_eq(expected.as_slice()))
}

pub fn sign(secret: &str, payload: &[u8]) -> String {
    match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(payload);
            format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
        }
        Err(_) => String::new(),
    }
}

impl GatewayAdapter for MollieGateway {
    fn descriptor(&self) -> &PaymentGateway {
        &self.descriptor
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn validate_webhook_signature(&self, payload: &[u8], signature: &str, _: Freshness) -> bool {
        validate_webhook_signature(payload, signature, &self.webhook_secret)
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> Result<CanonicalEvent, GatewayError> {
        parse_event(payload)
    }

    fn refresh_event(
        &self,
        event: CanonicalEvent,
    ) -> BoxFuture<'_, Result<CanonicalEvent, GatewayError>> {
        Box::pin(async move { self.refresh_event_inner(event).await })
    }

    fn create_payment_intent(
        &self,
        request: IntentRequest,
    ) -> BoxFuture<'_, Result<CreatedIntent, GatewayError>> {
        Box::pin(async move { self.create_payment_intent_inner(request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "mollie_secret";

    #[test]
    fn accepts_prefixed_and_bare_signatures() {
        let body = b"id=tr_WDqYK6vllg";
        let header = sign(SECRET, body);
        assert!(validate_webhook_signature(body, &header, SECRET));
        let bare = header.trim_start_matches("sha256=");
        assert!(validate_webhook_signature(body, bare, SECRET));
    }

    #[test]
    fn rejects_bad_signatures() {
        let body = b"id=tr_WDqYK6vllg";
        assert!(!validate_webhook_signature(body, "", SECRET));
        assert!(!validate_webhook_signature(body, "sha256=", SECRET));
        assert!(!validate_webhook_signature(body, "sha256=zz", SECRET));
        assert!(!validate_webhook_signature(body, &sign("other", body), SECRET));
        assert!(!validate_webhook_signature(b"id=tr_other", &sign(SECRET, body), SECRET));
    }

    #[test]
    fn parses_form_and_json_bodies() {
        let form = parse_event(b"id=tr_abc").unwrap();
        let json = parse_event(br#"{"id":"tr_abc"}"#).unwrap();
        for event in [form, json] {
            assert_eq!(event.kind, EventKind::StateChanged);
            assert_eq!(event.external_id, "tr_abc");
            assert!(event.delivery_key().is_none());
        }
        assert!(parse_event(b"{not json").is_err());
        assert!(parse_event(b"foo=bar").is_err());
    }

    #[test]
    fn maps_payment_states() {
        let paid = event_from_payment(json!({"id": "tr_1", "status": "paid"})).unwrap();
        assert_eq!(paid.kind, EventKind::PaymentSucceeded);
        assert_eq!(paid.event_id.as_str(), "tr_1:paid");
        assert_eq!(paid.intent_id.as_deref(), Some("tr_1"));

        let expired = event_from_payment(json!({"id": "tr_1", "status": "expired"})).unwrap();
        assert_eq!(expired.kind, EventKind::Canceled);

        let open = event_from_payment(json!({"id": "tr_1", "status": "open"})).unwrap();
        assert_eq!(open.kind, EventKind::Processing);

        let failed = event_from_payment(json!({
            "id": "tr_1", "status": "failed", "details": {"failureReason": "insufficient_funds"}
        }))
        .unwrap();
        assert_eq!(
            failed.kind,
            EventKind::PaymentFailed {
                reason: Some("insufficient_funds".into())
            }
        );
    }

    #[test]
    fn refunds_and_chargebacks_override_status() {
        let refunded = event_from_payment(json!({
            "id": "tr_1", "status": "paid",
            "amountRefunded": {"currency": "EUR", "value": "5.00"}
        }))
        .unwrap();
        assert_eq!(
            refunded.kind,
            EventKind::Refunded {
                amount_refunded: MoneyAmount::new(500).unwrap()
            }
        );
        assert_eq!(refunded.event_id.as_str(), "tr_1:refunded:500");

        let disputed = event_from_payment(json!({
            "id": "tr_1", "status": "paid",
            "amountRefunded": {"currency": "EUR", "value": "0.00"},
            "amountChargedBack": {"currency": "EUR", "value": "10.00"}
        }))
        .unwrap();
        assert!(matches!(disputed.kind, EventKind::DisputeCreated { .. }));
    }
}
