use {
    super::{
        error::PipelineError,
        event::{CanonicalEvent, EventKind},
        gateway::GatewayName,
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
    Timeout,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for AttemptOutcome {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "timeout" => Ok(Self::Timeout),
            other => Err(PipelineError::Validation(format!(
                "unknown attempt outcome: {other}"
            ))),
        }
    }
}

/// Write-once record of one interaction with a gateway.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub gateway: GatewayName,
    pub request_id: String,
    pub response: serde_json::Value,
    pub outcome: AttemptOutcome,
    pub latency_ms: i64,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentAttempt {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub gateway: GatewayName,
    pub request_id: String,
    pub response: serde_json::Value,
    pub outcome: AttemptOutcome,
    pub latency_ms: i64,
    pub failure_reason: Option<String>,
}

impl NewPaymentAttempt {
    pub fn new(
        payment_id: Uuid,
        gateway: GatewayName,
        request_id: impl Into<String>,
        outcome: AttemptOutcome,
        latency_ms: i64,
        failure_reason: Option<String>,
        response: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            payment_id,
            gateway,
            request_id: request_id.into(),
            response,
            outcome,
            latency_ms: latency_ms.max(0),
            failure_reason,
        }
    }

    /// Audit row for a reconciled webhook. Failed, canceled and disputed
    /// payments count as failures so they show up in failure statistics.
    pub fn from_event(payment_id: Uuid, event: &CanonicalEvent, latency_ms: i64) -> Self {
        let (outcome, reason) = match &event.kind {
            EventKind::PaymentFailed { reason } => (
                AttemptOutcome::Failure,
                Some(reason.clone().unwrap_or_else(|| "payment_failed".into())),
            ),
            EventKind::Canceled => (AttemptOutcome::Failure, Some("canceled".into())),
            EventKind::DisputeCreated { reason } => (
                AttemptOutcome::Failure,
                Some(format!("dispute:{}", reason.as_deref().unwrap_or("unspecified"))),
            ),
            _ => (AttemptOutcome::Success, None),
        };
        Self::new(
            payment_id,
            event.gateway,
            event.event_id.as_str(),
            outcome,
            latency_ms,
            reason,
            event.raw.clone(),
        )
    }

    pub fn into_attempt(self, created_at: DateTime<Utc>) -> PaymentAttempt {
        PaymentAttempt {
            id: self.id,
            payment_id: self.payment_id,
            gateway: self.gateway,
            request_id: self.request_id,
            response: self.response,
            outcome: self.outcome,
            latency_ms: self.latency_ms,
            failure_reason: self.failure_reason,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AttemptStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    /// Most frequent failure reasons, most common first.
    pub top_failure_reasons: Vec<(String, usize)>,
    pub volume_by_gateway: HashMap<GatewayName, usize>,
}

impl AttemptStats {
    pub fn from_attempts(attempts: &[PaymentAttempt]) -> Self {
        if attempts.is_empty() {
            return Self::default();
        }

        let mut stats = Self {
            total: attempts.len(),
            ..Self::default()
        };
        let mut reasons: HashMap<&str, usize> = HashMap::new();
        let mut latency_sum: i64 = 0;

        for a in attempts {
            match a.outcome {
                AttemptOutcome::Success => stats.succeeded += 1,
                AttemptOutcome::Failure => stats.failed += 1,
                AttemptOutcome::Timeout => stats.timed_out += 1,
            }
            if let Some(reason) = a.failure_reason.as_deref() {
                *reasons.entry(reason).or_default() += 1;
            }
            *stats.volume_by_gateway.entry(a.gateway).or_default() += 1;
            latency_sum = latency_sum.saturating_add(a.latency_ms);
        }

        stats.success_rate = stats.succeeded as f64 / stats.total as f64;
        stats.average_latency_ms = latency_sum as f64 / stats.total as f64;

        let mut reasons: Vec<(String, usize)> = reasons
            .into_iter()
            .map(|(r, n)| (r.to_string(), n))
            .collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        reasons.truncate(5);
        stats.top_failure_reasons = reasons;

        stats
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum SuspiciousPattern {
    /// Many failed attempts against one payment: card testing.
    RepeatedFailures { payment_id: Uuid, failures: usize },
    Dispute { payment_id: Uuid },
    ElevatedFailureRate { gateway: GatewayName, failure_rate: f64, attempts: usize },
}

pub const REPEATED_FAILURE_THRESHOLD: usize = 3;
const FAILURE_RATE_MIN_SAMPLE: usize = 10;
const FAILURE_RATE_THRESHOLD: f64 = 0.5;

pub fn detect_suspicious_patterns(attempts: &[PaymentAttempt]) -> Vec<SuspiciousPattern> {
    let mut failures_per_payment: HashMap<Uuid, usize> = HashMap::new();
    let mut per_gateway: HashMap<GatewayName, (usize, usize)> = HashMap::new();
    let mut found = Vec::new();

    for a in attempts {
        let entry = per_gateway.entry(a.gateway).or_default();
        entry.0 += 1;
        if a.outcome != AttemptOutcome::Success {
            entry.1 += 1;
            *failures_per_payment.entry(a.payment_id).or_default() += 1;
        }
        if a
            .failure_reason
            .as_deref()
            .is_some_and(|r| r.starts_with("dispute"))
        {
            found.push(SuspiciousPattern::Dispute { payment_id: a.payment_id });
        }
    }

    let mut repeated: Vec<_> = failures_per_payment
        .into_iter()
        .filter(|(_, n)| *n >= REPEATED_FAILURE_THRESHOLD)
        .collect();
    repeated.sort();
    found.extend(
        repeated
            .into_iter()
            .map(|(payment_id, failures)| SuspiciousPattern::RepeatedFailures { payment_id, failures }),
    );

    let mut gateways: Vec<_> = per_gateway.into_iter().collect();
    gateways.sort_by_key(|(g, _)| g.as_str());
    for (gateway, (attempts, failures)) in gateways {
        if attempts < FAILURE_RATE_MIN_SAMPLE {
            continue;
        }
        let failure_rate = failures as f64 / attempts as f64;
        if failure_rate > FAILURE_RATE_THRESHOLD {
            found.push(SuspiciousPattern::ElevatedFailureRate {
                gateway,
                failure_rate,
                attempts,
            });
        }
    }

    found
}
