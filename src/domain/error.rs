use thiserror::Error;

/// Failure talking to a payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network failure or 5xx from the provider. Worth retrying.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the request (unsupported currency, bad amount, unknown id).
    #[error("gateway rejected request: {0}")]
    Rejected(String),

    #[error("gateway call timed out")]
    Timeout,

    /// Webhook body could not be mapped to a canonical event.
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("webhook signature: {0}")]
    WebhookSignature(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unrecognized event type: {0}")]
    UnknownEvent(String),

    /// The event depends on a state change that has not been applied yet.
    #[error("event arrived out of order: {0}")]
    OutOfOrder(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("processing timed out")]
    Timeout,
}

impl PipelineError {
    /// Transient failures go back on the queue; everything else is dropped.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(_) | Self::Timeout | Self::OutOfOrder(_) => true,
            Self::Gateway(e) => e.is_transient(),
            _ => false,
        }
    }
}
