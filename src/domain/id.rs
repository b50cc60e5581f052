use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::PipelineError;

/// Provider-side object identifier: Stripe `pi_`/`ch_`/`re_`, Mollie `tr_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::Validation("ExternalId cannot be empty".into()));
        }
        if trimmed.len() != id.len() || id.chars().any(char::is_whitespace) {
            return Err(PipelineError::Validation(format!(
                "ExternalId cannot contain whitespace, got: {id:?}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Idempotency key of one gateway notification.
///
/// Stripe delivers `evt_xxx`. Mollie has no event ids, so the key is derived
/// from the payment id plus the state observed when refreshing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PipelineError::Validation("EventId cannot be empty".into()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_ids() {
        assert!(ExternalId::new("").is_err());
        assert!(ExternalId::new("  ").is_err());
        assert!(ExternalId::new("pi_ 123").is_err());
        assert!(EventId::new("").is_err());
    }

    #[test]
    fn accepts_provider_ids() {
        assert_eq!(ExternalId::new("tr_WDqYK6vllg").unwrap().as_str(), "tr_WDqYK6vllg");
        assert_eq!(EventId::new("tr_abc:paid").unwrap().to_string(), "tr_abc:paid");
    }
}
