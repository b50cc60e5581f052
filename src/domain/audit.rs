use {super::gateway::GatewayName, serde::Serialize, uuid::Uuid};

/// Compliance record for webhook handling, written to the `audit` log target.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditEvent<'a> {
    WebhookReceived {
        gateway: GatewayName,
        event_id: &'a str,
        event_type: &'a str,
    },
    WebhookRejected {
        gateway: &'a str,
        reason: &'a str,
    },
    WebhookDuplicate {
        gateway: GatewayName,
        event_id: &'a str,
    },
    DonationTransitioned {
        donation_id: Uuid,
        from: &'a str,
        to: &'a str,
        event_id: &'a str,
    },
    ComplianceReviewFlagged {
        donation_id: Uuid,
        event_id: &'a str,
    },
}

impl AuditEvent<'_> {
    pub fn action(&self) -> &'static str {
        match self {
            Self::WebhookReceived { .. } => "webhook_received",
            Self::WebhookRejected { .. } => "webhook_rejected",
            Self::WebhookDuplicate { .. } => "webhook_duplicate",
            Self::DonationTransitioned { .. } => "donation_transitioned",
            Self::ComplianceReviewFlagged { .. } => "compliance_review_flagged",
        }
    }

    pub fn emit(&self) {
        let detail = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(target: "audit", action = self.action(), %detail);
    }
}
