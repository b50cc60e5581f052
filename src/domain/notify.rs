use {
    super::{donation::Donation, gateway::BoxFuture},
    serde::Serialize,
    thiserror::Error,
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    DonationProcessed { donation: Donation },
    LargeDonation { donation: Donation },
    PaymentFailed { donation: Donation, reason: Option<String> },
    DisputeOpened { donation: Donation, reason: Option<String> },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DonationProcessed { .. } => "donation_processed",
            Self::LargeDonation { .. } => "large_donation",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::DisputeOpened { .. } => "dispute_opened",
        }
    }

    pub fn donation(&self) -> &Donation {
        match self {
            Self::DonationProcessed { donation }
            | Self::LargeDonation { donation }
            | Self::PaymentFailed { donation, .. }
            | Self::DisputeOpened { donation, .. } => donation,
        }
    }
}

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound notification dispatch. Fire-and-forget from the pipeline's
/// point of view: errors are logged by the caller and never roll back a
/// transition.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>>;
}
