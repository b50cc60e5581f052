use {
    super::{gateway::GatewayName, id::EventId, money::MoneyAmount},
    serde::Serialize,
};

/// Gateway-agnostic meaning of a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    PaymentSucceeded,
    PaymentFailed { reason: Option<String> },
    RequiresAction,
    Processing,
    Canceled,
    DisputeCreated { reason: Option<String> },
    /// `amount_refunded` is cumulative, as both providers report it.
    Refunded { amount_refunded: MoneyAmount },
    /// The webhook only names an object; its state has to be fetched.
    StateChanged,
    Unknown,
}

impl EventKind {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::StateChanged | Self::Unknown)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CanonicalEvent {
    pub gateway: GatewayName,
    pub event_id: EventId,
    /// Provider's own type string (`payment_intent.succeeded`, `payment.paid`).
    pub event_type: String,
    pub kind: EventKind,
    /// Id of the object the webhook is about.
    pub external_id: String,
    pub intent_id: Option<String>,
    pub transaction_id: Option<String>,
    /// Gateway state shows the money was captured. Only set when the state
    /// was fetched from the provider rather than read off a single event.
    pub captured: bool,
    pub raw: serde_json::Value,
}

impl CanonicalEvent {
    /// Key of the processed-events log. Event ids are only unique per gateway.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.gateway, self.event_id)
    }

    /// Job dedup key. Deliveries that only name an object say nothing about
    /// which state change they announce, so they are never collapsed.
    pub fn delivery_key(&self) -> Option<String> {
        match self.kind {
            EventKind::StateChanged => None,
            _ => Some(self.event_id.as_str().to_string()),
        }
    }

    /// Ids to try, in order, when resolving the donation this event belongs to.
    pub fn lookup_keys(&self) -> (Option<&str>, Option<&str>) {
        (self.intent_id.as_deref(), self.transaction_id.as_deref())
    }
}
