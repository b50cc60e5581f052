use {
    super::error::PipelineError,
    rust_decimal::{Decimal, prelude::ToPrimitive},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Non-negative amount in the currency's minor unit (cents, or yen).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoneyAmount(i64);

impl MoneyAmount {
    pub const ZERO: MoneyAmount = MoneyAmount(0);

    pub fn new(minor: i64) -> Result<Self, PipelineError> {
        if minor < 0 {
            return Err(PipelineError::Validation(format!(
                "MoneyAmount cannot be negative, got: {minor}"
            )));
        }
        Ok(Self(minor))
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Chf,
    Jpy,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
            Self::Chf => "chf",
            Self::Jpy => "jpy",
        }
    }

    /// Number of decimal places in the minor unit.
    pub fn exponent(&self) -> u32 {
        match self {
            Self::Jpy => 0,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            "chf" => Ok(Self::Chf),
            "jpy" => Ok(Self::Jpy),
            other => Err(PipelineError::Validation(format!(
                "unknown currency: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: MoneyAmount,
    currency: Currency,
}

impl Money {
    pub fn new(amount: MoneyAmount, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Builds from a major-unit decimal (`25.50` EUR → 2550).
    /// Rejects negatives and more fractional digits than the currency allows.
    pub fn from_decimal(value: Decimal, currency: Currency) -> Result<Self, PipelineError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(PipelineError::Validation(format!(
                "amount cannot be negative, got: {value}"
            )));
        }
        let value = value.normalize();
        if value.scale() > currency.exponent() {
            return Err(PipelineError::Validation(format!(
                "amount {value} has more than {} decimals for {currency}",
                currency.exponent()
            )));
        }
        let minor = (value * Decimal::from(10i64.pow(currency.exponent())))
            .to_i64()
            .ok_or_else(|| PipelineError::Validation(format!("amount out of range: {value}")))?;
        Ok(Self::new(MoneyAmount::new(minor)?, currency))
    }

    /// Parses provider strings such as Mollie's `"10.00"`.
    pub fn parse(value: &str, currency: Currency) -> Result<Self, PipelineError> {
        let decimal: Decimal = value
            .trim()
            .parse()
            .map_err(|_| PipelineError::Validation(format!("invalid amount: {value:?}")))?;
        Self::from_decimal(decimal, currency)
    }

    pub fn amount(&self) -> MoneyAmount {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Major-unit string with exactly the currency's decimals (`"10.00"`, `"500"`).
    pub fn to_decimal_string(&self) -> String {
        let exponent = self.currency.exponent();
        let decimal = Decimal::new(self.amount.minor(), exponent);
        format!("{decimal:.prec$}", prec = exponent as usize)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal_string(), self.currency)
    }
}
