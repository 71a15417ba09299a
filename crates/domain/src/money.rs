//! Money value object.

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// ISO 4217 currency code, always three upper-case ASCII letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Currency([u8; 3]);

impl Currency {
    pub fn as_str(&self) -> &str {
        // Only ASCII letters are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ValidationError::MissingCurrency);
        }
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(ValidationError::InvalidCurrency(code.to_owned()));
        }
        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}

/// A non-negative amount in minor units (cents) of a single currency.
///
/// Arithmetic between two amounts requires the same currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MoneyRepr")]
pub struct Money {
    amount: i64,
    currency: Currency,
}

#[derive(Deserialize)]
struct MoneyRepr {
    amount: i64,
    currency: Currency,
}

impl TryFrom<MoneyRepr> for Money {
    type Error = ValidationError;

    fn try_from(repr: MoneyRepr) -> Result<Self, Self::Error> {
        Money::with_currency(repr.amount, repr.currency)
    }
}

impl Money {
    /// Creates an amount from minor units.
    pub fn new(amount: i64, currency: &str) -> Result<Self, ValidationError> {
        Self::with_currency(amount, currency.parse()?)
    }

    /// Creates an amount from a decimal value, rounding to the nearest minor
    /// unit (half-up).
    pub fn from_decimal(amount: f64, currency: &str) -> Result<Self, ValidationError> {
        if !amount.is_finite() {
            return Err(ValidationError::AmountOutOfRange);
        }
        Self::from_major_units(decimal_from_f64(amount)?, currency)
    }

    /// Creates an amount from major units (`24.99`), rounding half-up to a
    /// whole minor unit.
    pub fn from_major_units(amount: Decimal, currency: &str) -> Result<Self, ValidationError> {
        let currency = currency.parse()?;
        let minor = amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(ValidationError::AmountOutOfRange)?;
        Self::with_currency(round_to_minor_units(minor)?, currency)
    }

    pub fn zero(currency: &str) -> Result<Self, ValidationError> {
        Self::new(0, currency)
    }

    pub fn with_currency(amount: i64, currency: Currency) -> Result<Self, ValidationError> {
        if amount < 0 {
            return Err(ValidationError::NegativeAmount(amount));
        }
        Ok(Self { amount, currency })
    }

    /// Amount in minor units.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn currency(&self) -> &str {
        self.currency.as_str()
    }

    pub fn currency_code(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn add(&self, other: &Money) -> Result<Money, ValidationError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(ValidationError::AmountOutOfRange)?;
        Ok(Money {
            amount,
            currency: self.currency,
        })
    }

    pub fn subtract(&self, other: &Money) -> Result<Money, ValidationError> {
        self.ensure_same_currency(other)?;
        if other.amount > self.amount {
            return Err(ValidationError::NegativeResult);
        }
        Ok(Money {
            amount: self.amount - other.amount,
            currency: self.currency,
        })
    }

    /// Scales the amount, rounding half-up to a whole minor unit.
    pub fn multiply(&self, factor: f64) -> Result<Money, ValidationError> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(ValidationError::InvalidMultiplier(factor));
        }
        let scaled = Decimal::from(self.amount)
            .checked_mul(decimal_from_f64(factor)?)
            .ok_or(ValidationError::AmountOutOfRange)?;
        Ok(Money {
            amount: round_to_minor_units(scaled)?,
            currency: self.currency,
        })
    }

    pub fn compare(&self, other: &Money) -> Result<Ordering, ValidationError> {
        self.ensure_same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    pub fn greater_than(&self, other: &Money) -> Result<bool, ValidationError> {
        Ok(self.compare(other)? == Ordering::Greater)
    }

    pub fn less_than(&self, other: &Money) -> Result<bool, ValidationError> {
        Ok(self.compare(other)? == Ordering::Less)
    }

    /// Formats as `"24.99 USD"`.
    pub fn to_display_string(&self) -> String {
        self.to_string()
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), ValidationError> {
        if self.currency != other.currency {
            return Err(ValidationError::CurrencyMismatch {
                left: self.currency.to_string(),
                right: other.currency.to_string(),
            });
        }
        Ok(())
    }
}

/// Parses the shortest representation that round-trips, so `1.005` is read
/// as 1.005 and not as its binary neighbour 1.00499...
fn decimal_from_f64(value: f64) -> Result<Decimal, ValidationError> {
    value
        .to_string()
        .parse()
        .map_err(|_| ValidationError::AmountOutOfRange)
}

fn round_to_minor_units(value: Decimal) -> Result<i64, ValidationError> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(ValidationError::AmountOutOfRange)
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.amount / 100,
            self.amount % 100,
            self.currency
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(amount: f64) -> Money {
        Money::from_decimal(amount, "USD").unwrap()
    }

    #[test]
    fn decimal_amounts_add_up() {
        let total = usd(19.99).add(&usd(5.00)).unwrap();
        assert_eq!(total, usd(24.99));
        assert_eq!(total.amount(), 2499);
    }

    #[test]
    fn adding_other_currency_fails() {
        let eur = Money::new(10, "EUR").unwrap();
        let result = usd(19.99).add(&eur);
        assert!(matches!(
            result,
            Err(ValidationError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn currency_is_uppercased() {
        let money = Money::new(100, "usd").unwrap();
        assert_eq!(money.currency(), "USD");
        assert_eq!(money, Money::new(100, "USD").unwrap());
    }

    #[test]
    fn malformed_currency_is_rejected() {
        assert_eq!(Money::new(1, ""), Err(ValidationError::MissingCurrency));
        assert!(matches!(
            Money::new(1, "US"),
            Err(ValidationError::InvalidCurrency(_))
        ));
        assert!(matches!(
            Money::new(1, "U$D"),
            Err(ValidationError::InvalidCurrency(_))
        ));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert_eq!(
            Money::new(-1, "USD"),
            Err(ValidationError::NegativeAmount(-1))
        );
        assert!(Money::from_decimal(-0.5, "USD").is_err());
    }

    #[test]
    fn decimal_rounds_half_up() {
        assert_eq!(usd(0.005).amount(), 1);
        assert_eq!(usd(0.004).amount(), 0);
        assert_eq!(usd(10.125).amount(), 1013);
    }

    #[test]
    fn decimal_midpoints_not_exact_in_binary_round_up() {
        assert_eq!(usd(1.005).amount(), 101);
        assert_eq!(usd(1.015).amount(), 102);
        assert_eq!(usd(0.285).amount(), 29);
    }

    #[test]
    fn major_units_from_decimal_type() {
        let money = Money::from_major_units(Decimal::new(1005, 3), "USD").unwrap();
        assert_eq!(money.amount(), 101);
        assert!(Money::from_major_units(Decimal::new(-1, 0), "USD").is_err());
        assert!(Money::from_major_units(Decimal::MAX, "USD").is_err());
    }

    #[test]
    fn subtract_cannot_go_negative() {
        assert_eq!(usd(5.0).subtract(&usd(2.5)).unwrap(), usd(2.5));
        assert_eq!(
            usd(1.0).subtract(&usd(2.0)),
            Err(ValidationError::NegativeResult)
        );
    }

    #[test]
    fn multiply_rounds_and_rejects_negative_factor() {
        let price = Money::new(333, "USD").unwrap();
        assert_eq!(price.multiply(1.5).unwrap().amount(), 500);
        assert_eq!(price.multiply(3.0).unwrap().amount(), 999);
        assert!(price.multiply(0.0).unwrap().is_zero());

        let hundred = Money::new(100, "USD").unwrap();
        assert_eq!(hundred.multiply(1.005).unwrap().amount(), 101);
        assert_eq!(hundred.multiply(0.285).unwrap().amount(), 29);
        assert_eq!(Money::new(1, "USD").unwrap().multiply(2.5).unwrap().amount(), 3);
        assert!(matches!(
            price.multiply(-1.0),
            Err(ValidationError::InvalidMultiplier(_))
        ));
    }

    #[test]
    fn comparisons_require_same_currency() {
        assert!(usd(2.0).greater_than(&usd(1.0)).unwrap());
        assert!(usd(1.0).less_than(&usd(2.0)).unwrap());
        assert_eq!(usd(1.0).compare(&usd(1.0)).unwrap(), Ordering::Equal);
        assert!(usd(1.0).compare(&Money::new(100, "EUR").unwrap()).is_err());
    }

    #[test]
    fn displays_major_units_and_code() {
        assert_eq!(usd(24.99).to_display_string(), "24.99 USD");
        assert_eq!(Money::new(5, "EUR").unwrap().to_string(), "0.05 EUR");
    }

    #[test]
    fn serializes_as_amount_and_currency() {
        let json = serde_json::to_value(Money::new(2499, "USD").unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"amount": 2499, "currency": "USD"}));

        let back: Money = serde_json::from_value(json).unwrap();
        assert_eq!(back.amount(), 2499);

        let negative = serde_json::json!({"amount": -1, "currency": "USD"});
        assert!(serde_json::from_value::<Money>(negative).is_err());
    }
}
