use {
    super::{
        error::{GatewayError, PipelineError},
        event::CanonicalEvent,
        money::{Currency, Money},
    },
    derive_more::Display,
    serde::{Deserialize, Serialize},
    std::{collections::HashMap, future::Future, pin::Pin, sync::Arc},
    uuid::Uuid,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayName {
    #[display("stripe")]
    Stripe,
    #[display("mollie")]
    Mollie,
}

impl GatewayName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Mollie => "mollie",
        }
    }
}

impl TryFrom<&str> for GatewayName {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "stripe" => Ok(Self::Stripe),
            "mollie" => Ok(Self::Mollie),
            other => Err(PipelineError::NotFound(format!("unknown gateway: {other}"))),
        }
    }
}

/// Configuration of one available gateway integration.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentGateway {
    pub name: GatewayName,
    pub test_mode: bool,
    /// Lower wins when the donor does not pick a gateway.
    pub priority: i32,
    pub supported_currencies: Vec<Currency>,
    pub enabled: bool,
}

impl PaymentGateway {
    pub fn supports(&self, currency: Currency) -> bool {
        self.supported_currencies.contains(&currency)
    }
}

/// Whether a signature's timestamp must still be inside the replay window.
/// Jobs re-verify stored deliveries long after they arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Enforce,
    Ignore,
}

pub struct IntentRequest {
    pub donation_id: Uuid,
    pub money: Money,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CreatedIntent {
    pub intent_id: String,
    pub client_secret: Option<String>,
    pub checkout_url: Option<String>,
    pub raw: serde_json::Value,
}

pub trait GatewayAdapter: Send + Sync {
    fn descriptor(&self) -> &PaymentGateway;

    /// Header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Pure check of a delivery's signature. Missing or empty signatures fail.
    fn validate_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
        freshness: Freshness,
    ) -> bool;

    fn parse_webhook_event(&self, payload: &[u8]) -> Result<CanonicalEvent, GatewayError>;

    /// Re-derive the authoritative state from the provider when the
    /// delivery does not carry it.
    fn refresh_event(
        &self,
        event: CanonicalEvent,
    ) -> BoxFuture<'_, Result<CanonicalEvent, GatewayError>>;

    fn create_payment_intent(
        &self,
        request: IntentRequest,
    ) -> BoxFuture<'_, Result<CreatedIntent, GatewayError>>;

    fn name(&self) -> GatewayName {
        self.descriptor().name
    }
}

/// Explicit name → adapter map, built once at startup.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    adapters: HashMap<GatewayName, Arc<dyn GatewayAdapter>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, adapter: Arc<dyn GatewayAdapter>) -> Self {
        self.adapters.insert(adapter.name(), adapter);
        self
    }

    pub fn get(&self, name: GatewayName) -> Option<&Arc<dyn GatewayAdapter>> {
        self.adapters.get(&name)
    }

    /// Looks up by the route segment (`/webhooks/{gateway}`).
    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn GatewayAdapter>, PipelineError> {
        let name = GatewayName::try_from(name)?;
        self.get(name)
            .ok_or_else(|| PipelineError::NotFound(format!("gateway not configured: {name}")))
    }

    pub fn descriptors(&self) -> Vec<&PaymentGateway> {
        let mut all: Vec<_> = self.adapters.values().map(|a| a.descriptor()).collect();
        all.sort_by_key(|d| (d.priority, d.name.as_str()));
        all
    }

    /// The requested gateway if usable, otherwise the highest-priority enabled
    /// gateway supporting `currency`.
    pub fn select(
        &self,
        requested: Option<GatewayName>,
        currency: Currency,
    ) -> Result<&Arc<dyn GatewayAdapter>, GatewayError> {
        if let Some(name) = requested {
            let adapter = self
                .get(name)
                .filter(|a| a.descriptor().enabled)
                .ok_or_else(|| GatewayError::Rejected(format!("gateway {name} is not enabled")))?;
            if !adapter.descriptor().supports(currency) {
                return Err(GatewayError::Rejected(format!(
                    "gateway {name} does not support {currency}"
                )));
            }
            return Ok(adapter);
        }

        self.descriptors()
            .into_iter()
            .find(|d| d.enabled && d.supports(currency))
            .and_then(|d| self.get(d.name))
            .ok_or_else(|| {
                GatewayError::Rejected(format!("no enabled gateway supports {currency}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(PaymentGateway);

    impl GatewayAdapter for Stub {
        fn descriptor(&self) -> &PaymentGateway {
            &self.0
        }

        fn signature_header(&self) -> &'static str {
            "X-Test-Signature"
        }

        fn validate_webhook_signature(&self, _: &[u8], sig: &str, _: Freshness) -> bool {
            !sig.is_empty()
        }

        fn parse_webhook_event(&self, _: &[u8]) -> Result<CanonicalEvent, GatewayError> {
            Err(GatewayError::InvalidPayload("stub".into()))
        }

        fn refresh_event(
            &self,
            event: CanonicalEvent,
        ) -> BoxFuture<'_, Result<CanonicalEvent, GatewayError>> {
            Box::pin(async move { Ok(event) })
        }

        fn create_payment_intent(
            &self,
            _: IntentRequest,
        ) -> BoxFuture<'_, Result<CreatedIntent, GatewayError>> {
            Box::pin(async { Err(GatewayError::Unavailable("stub".into())) })
        }
    }

    fn stub(name: GatewayName, priority: i32, currencies: &[Currency], enabled: bool) -> Arc<dyn GatewayAdapter> {
        Arc::new(Stub(PaymentGateway {
            name,
            test_mode: true,
            priority,
            supported_currencies: currencies.to_vec(),
            enabled,
        }))
    }

    #[test]
    fn select_prefers_priority_among_supporting_gateways() {
        let registry = GatewayRegistry::new()
            .register(stub(GatewayName::Stripe, 2, &[Currency::Usd, Currency::Eur], true))
            .register(stub(GatewayName::Mollie, 1, &[Currency::Eur], true));

        assert_eq!(registry.select(None, Currency::Eur).unwrap().name(), GatewayName::Mollie);
        assert_eq!(registry.select(None, Currency::Usd).unwrap().name(), GatewayName::Stripe);
        assert!(registry.select(None, Currency::Jpy).is_err());
    }

    #[test]
    fn select_honors_request_and_rejects_unusable() {
        let registry = GatewayRegistry::new()
            .register(stub(GatewayName::Stripe, 2, &[Currency::Eur], true))
            .register(stub(GatewayName::Mollie, 1, &[Currency::Eur], false));

        assert_eq!(
            registry.select(Some(GatewayName::Stripe), Currency::Eur).unwrap().name(),
            GatewayName::Stripe
        );
        assert!(matches!(
            registry.select(Some(GatewayName::Mollie), Currency::Eur),
            Err(GatewayError::Rejected(_))
        ));
        assert!(matches!(
            registry.select(Some(GatewayName::Stripe), Currency::Usd),
            Err(GatewayError::Rejected(_))
        ));
        // disabled Mollie is skipped despite its priority
        assert_eq!(registry.select(None, Currency::Eur).unwrap().name(), GatewayName::Stripe);
    }

    #[test]
    fn resolve_by_route_segment() {
        let registry = GatewayRegistry::new().register(stub(GatewayName::Stripe, 1, &[], true));
        assert!(registry.resolve("stripe").is_ok());
        assert!(matches!(registry.resolve("mollie"), Err(PipelineError::NotFound(_))));
        assert!(matches!(registry.resolve("paypal"), Err(PipelineError::NotFound(_))));
    }
}
