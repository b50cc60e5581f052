//! `Stripe-Signature` verification: `t=<unix>,v1=<hex>[,v1=<hex>...]`,
//! HMAC-SHA256 over `"{t}.{body}"`.

use {
    chrono::Utc,
    hmac::{Hmac, Mac},
    sha2::Sha256,
    std::time::Duration,
    subtle::ConstantTimeEq,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// Every `v1` entry; Stripe sends several while a secret is being rolled.
    pub v1: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// `None` on anything malformed. Unknown schemes (`v0`) are ignored.
    pub fn parse(header: &str) -> Option<Self> {
        let mut timestamp = None;
        let mut v1 = Vec::new();

        for part in header.split(',') {
            let (key, value) = part.trim().split_once('=')?;
            match key {
                "t" => timestamp = Some(value.parse().ok()?),
                "v1" => v1.push(hex::decode(value).ok()?),
                _ => {}
            }
        }

        if v1.is_empty() {
            return None;
        }
        Some(Self {
            timestamp: timestamp?,
            v1,
        })
    }
}

fn compute(secret: &str, timestamp: i64, payload: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac.finalize().into_bytes().to_vec())
}

/// `tolerance: None` skips the timestamp window (re-verification of stored
/// deliveries).
pub fn validate_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Option<Duration>,
) -> bool {
    if header.trim().is_empty() || secret.is_empty() {
        return false;
    }
    let Some(parsed) = SignatureHeader::parse(header) else {
        return false;
    };

    if let Some(tolerance) = tolerance {
        let age = Utc::now().timestamp().saturating_sub(parsed.timestamp);
        let window = i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX);
        if age.abs() > window {
            tracing::warn!(age_secs = age, "stripe signature timestamp outside tolerance");
            return false;
        }
    }

    let Some(expected) = compute(secret, parsed.timestamp, payload) else {
        return false;
    };
    parsed.v1.iter().any(|candidate| {
        candidate.len() == expected.len()
            && bool::from(candidate.as_slice().ct_eq(expected.as_slice()))
    })
}

/// Builds a valid header for `payload`; used by fixtures and replay tooling.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let signature = compute(secret, timestamp, payload).unwrap_or_default();
    format!("t={timestamp},v1={}", hex::encode(signature))
}
