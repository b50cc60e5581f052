use {
    super::{error::PipelineError, gateway::GatewayName},
    chrono::{DateTime, Utc},
    serde::Serialize,
    std::{fmt, time::Duration},
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    /// Permanent failure: not retried, not a reconciliation gap.
    Dropped,
    /// Retries exhausted.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Dropped => "dropped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "dropped" => Ok(Self::Dropped),
            "failed" => Ok(Self::Failed),
            other => Err(PipelineError::Validation(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

/// A verified webhook delivery waiting for reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookJob {
    pub id: Uuid,
    pub gateway: GatewayName,
    /// Provider event id when the delivery carries one. Mollie deliveries have
    /// none and are always enqueued.
    pub dedup_key: Option<String>,
    pub event_type: String,
    /// Raw body exactly as received; the signature covers these bytes.
    pub payload: String,
    pub signature: String,
    pub donation_id: Option<Uuid>,
    pub attempts: i32,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookJob {
    pub id: Uuid,
    pub gateway: GatewayName,
    pub dedup_key: Option<String>,
    pub event_type: String,
    pub payload: String,
    pub signature: String,
    pub donation_id: Option<Uuid>,
}

impl NewWebhookJob {
    pub fn new(
        gateway: GatewayName,
        dedup_key: Option<String>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            gateway,
            dedup_key,
            event_type: event_type.into(),
            payload: payload.into(),
            signature: signature.into(),
            donation_id: None,
        }
    }

    pub fn into_job(self, now: DateTime<Utc>) -> WebhookJob {
        WebhookJob {
            id: self.id,
            gateway: self.gateway,
            dedup_key: self.dedup_key,
            event_type: self.event_type,
            payload: self.payload,
            signature: self.signature,
            donation_id: self.donation_id,
            attempts: 0,
            status: JobStatus::Pending,
            last_error: None,
            scheduled_at: now,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Enqueued(Uuid),
    /// A failed job with the same key was put back to `pending`.
    Revived(Uuid),
    /// Already queued, running or done.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Dropped(String),
    Failed(String),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed => JobStatus::Completed,
            Self::Dropped(_) => JobStatus::Dropped,
            Self::Failed(_) => JobStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Completed => None,
            Self::Dropped(e) | Self::Failed(e) => Some(e),
        }
    }
}

/// Fixed backoff tiers for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    tiers: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                Duration::from_secs(60),
                Duration::from_secs(5 * 60),
                Duration::from_secs(15 * 60),
            ],
        }
    }
}

impl RetryPolicy {
    pub fn new(tiers: Vec<Duration>) -> Self {
        Self { tiers }
    }

    pub fn max_retries(&self) -> usize {
        self.tiers.len()
    }

    /// Delay before the next run after `failures` failed runs (1-based),
    /// or `None` once the tiers are used up.
    pub fn delay_after(&self, failures: i32) -> Option<Duration> {
        let index = usize::try_from(failures).ok()?.checked_sub(1)?;
        self.tiers.get(index).copied()
    }
}
