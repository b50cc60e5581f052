use {
    super::{
        error::PipelineError,
        gateway::GatewayName,
        money::{Money, MoneyAmount},
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
}

impl DonationStatus {
    pub const ALL: [DonationStatus; 7] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Refunded,
        Self::PartiallyRefunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::PartiallyRefunded => "partially_refunded",
        }
    }

    /// No gateway event moves a donation out of these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Refunded)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Lifecycle rank; a legal transition never lowers it.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed | Self::Cancelled => 2,
            Self::PartiallyRefunded => 3,
            Self::Refunded => 4,
        }
    }

    pub fn can_transition_to(&self, next: &DonationStatus) -> bool {
        use DonationStatus::*;
        matches!(
            (self, next),
            (Pending, Processing | Completed | Failed | Cancelled)
                | (Processing, Completed | Failed | Cancelled)
                | (Completed, Refunded | PartiallyRefunded)
                | (PartiallyRefunded, Refunded | PartiallyRefunded)
        )
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for DonationStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PipelineError::Validation(format!("unknown donation status: {s}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecurringFrequency {
    Monthly,
    Quarterly,
    Yearly,
}

impl RecurringFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

impl TryFrom<&str> for RecurringFrequency {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            other => Err(PipelineError::Validation(format!(
                "unknown recurring frequency: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Campaign {
    pub id: Uuid,
    pub title: String,
    pub accepting_donations: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Donation {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub donor_id: Option<Uuid>,
    pub money: Money,
    pub status: DonationStatus,
    pub payment_method: String,
    pub gateway: GatewayName,
    pub payment_intent_id: Option<String>,
    pub transaction_id: Option<String>,
    pub anonymous: bool,
    pub recurring: bool,
    pub frequency: Option<RecurringFrequency>,
    pub notes: Option<String>,
    pub refunded_amount: MoneyAmount,
    pub compliance_review: bool,
    pub donated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewDonationParams {
    pub campaign_id: Uuid,
    pub donor_id: Option<Uuid>,
    pub money: Money,
    pub payment_method: String,
    pub gateway: GatewayName,
    pub anonymous: bool,
    pub recurring: bool,
    pub frequency: Option<RecurringFrequency>,
    pub notes: Option<String>,
}

/// For INSERT. Always starts `pending`, id generated via Uuid::now_v7().
#[derive(Debug, Clone)]
pub struct NewDonation {
    donation: Donation,
}

impl NewDonation {
    pub fn new(p: NewDonationParams) -> Result<Self, PipelineError> {
        if p.money.amount().is_zero() {
            return Err(PipelineError::Validation("donation amount must be positive".into()));
        }
        if p.payment_method.trim().is_empty() {
            return Err(PipelineError::Validation("payment_method is required".into()));
        }
        match (p.recurring, p.frequency) {
            (true, None) => {
                return Err(PipelineError::Validation(
                    "recurring donations need a frequency".into(),
                ));
            }
            (false, Some(_)) => {
                return Err(PipelineError::Validation(
                    "frequency given for a one-off donation".into(),
                ));
            }
            _ => {}
        }

        let now = Utc::now();
        Ok(Self {
            donation: Donation {
                id: Uuid::now_v7(),
                campaign_id: p.campaign_id,
                // anonymous donations never keep a donor reference
                donor_id: if p.anonymous { None } else { p.donor_id },
                money: p.money,
                status: DonationStatus::Pending,
                payment_method: p.payment_method,
                gateway: p.gateway,
                payment_intent_id: None,
                transaction_id: None,
                anonymous: p.anonymous,
                recurring: p.recurring,
                frequency: p.frequency,
                notes: p.notes,
                refunded_amount: MoneyAmount::ZERO,
                compliance_review: false,
                donated_at: now,
                completed_at: None,
                cancelled_at: None,
                refund_requested_at: None,
                updated_at: now,
            },
        })
    }

    pub fn into_donation(self) -> Donation {
        self.donation
    }
}

/// Explicit donor/admin actions on a donation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Cancel,
    RequestRefund,
}

impl UserAction {
    pub fn allowed_from(&self, status: DonationStatus) -> bool {
        match self {
            Self::Cancel => status.is_open(),
            Self::RequestRefund => {
                matches!(status, DonationStatus::Completed | DonationStatus::PartiallyRefunded)
            }
        }
    }

    /// Applies the action, or returns `Conflict` when the current status forbids it.
    pub fn apply(&self, donation: &mut Donation, now: DateTime<Utc>) -> Result<(), PipelineError> {
        if !self.allowed_from(donation.status) {
            return Err(PipelineError::Conflict(match self {
                Self::Cancel => format!("donation in status {} cannot be cancelled", donation.status),
                Self::RequestRefund => {
                    format!("donation in status {} cannot be refunded", donation.status)
                }
            }));
        }
        match self {
            Self::Cancel => {
                donation.status = DonationStatus::Cancelled;
                donation.cancelled_at = Some(now);
            }
            Self::RequestRefund => {
                if donation.refund_requested_at.is_some() {
                    return Err(PipelineError::Conflict("refund already requested".into()));
                }
                donation.refund_requested_at = Some(now);
            }
        }
        donation.updated_at = now;
        Ok(())
    }
}
