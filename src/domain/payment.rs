use {
    super::{error::PipelineError, event::EventKind, gateway::GatewayName},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

/// Gateway-level status of one payment attempt chain. Only gateway
/// callbacks change it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    RequiresAction,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::RequiresAction => "requires_action",
            Self::Canceled => "canceled",
        }
    }

    /// Status a gateway event implies for the payment row, if any.
    /// Refunds and disputes leave the payment's own status alone.
    pub fn from_event(kind: &EventKind) -> Option<PaymentStatus> {
        match kind {
            EventKind::PaymentSucceeded => Some(Self::Succeeded),
            EventKind::PaymentFailed { .. } => Some(Self::Failed),
            EventKind::RequiresAction => Some(Self::RequiresAction),
            EventKind::Processing => Some(Self::Pending),
            EventKind::Canceled => Some(Self::Canceled),
            EventKind::DisputeCreated { .. }
            | EventKind::Refunded { .. }
            | EventKind::StateChanged
            | EventKind::Unknown => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "requires_action" => Ok(Self::RequiresAction),
            "canceled" => Ok(Self::Canceled),
            other => Err(PipelineError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub donation_id: Uuid,
    pub gateway: GatewayName,
    pub payment_intent_id: Option<String>,
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        donation_id: Uuid,
        gateway: GatewayName,
        payment_intent_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            donation_id,
            gateway,
            payment_intent_id,
            transaction_id: None,
            status: PaymentStatus::Pending,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds a gateway event into this row. Returns whether anything changed.
    pub fn absorb(
        &mut self,
        kind: &EventKind,
        transaction_id: Option<&str>,
        raw: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> bool {
        let mut changed = false;
        match PaymentStatus::from_event(kind) {
            Some(status) if status != self.status => {
                self.status = status;
                changed = true;
            }
            _ => {}
        }
        if self.transaction_id.is_none() {
            if let Some(txn) = transaction_id {
                self.transaction_id = Some(txn.to_string());
                changed = true;
            }
        }
        if changed {
            self.metadata = raw.clone();
            self.updated_at = now;
        }
        changed
    }

    /// The row an event belongs to among one donation's payments (oldest
    /// first): same intent id, else the newest row still without an intent.
    pub fn find_for_event<'a>(payments: &'a [Payment], intent_id: Option<&str>) -> Option<&'a Payment> {
        match intent_id {
            Some(intent) => payments
                .iter()
                .find(|p| p.payment_intent_id.as_deref() == Some(intent))
                .or_else(|| payments.iter().rev().find(|p| p.payment_intent_id.is_none())),
            None => payments.last(),
        }
    }
}
