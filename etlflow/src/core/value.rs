//! Scalar values carried by records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Free text.
    Text,
    /// A floating point number.
    Number,
    /// A monetary amount in the given ISO currency code.
    Currency(String),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Number => write!(f, "number"),
            Self::Currency(code) => write!(f, "currency({code})"),
        }
    }
}

/// A monetary amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    /// The amount, in units of `currency`.
    pub amount: f64,
    /// ISO currency code, e.g. `GBP`.
    pub currency: String,
}

impl Money {
    /// Creates a new amount.
    #[must_use]
    pub fn new(amount: f64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

/// A single scalar value.
///
/// `Null` is accepted by every field type and stands for a missing cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value.
    Null,
    /// A number.
    Number(f64),
    /// A monetary amount.
    Currency(Money),
    /// Text.
    Text(String),
}

impl Value {
    /// Creates a text value.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Returns true if the value fits the given field type.
    #[must_use]
    pub fn conforms_to(&self, ty: &FieldType) -> bool {
        match (self, ty) {
            (Self::Null, _)
            | (Self::Text(_), FieldType::Text)
            | (Self::Number(_), FieldType::Number) => true,
            (Self::Currency(money), FieldType::Currency(code)) => money.currency == *code,
            _ => false,
        }
    }

    /// Returns a name for the value's type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Number(_) => "number".to_string(),
            Self::Currency(money) => format!("currency({})", money.currency),
            Self::Text(_) => "text".to_string(),
        }
    }

    /// Returns the numeric content of a number or currency value.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Currency(money) => Some(money.amount),
            _ => None,
        }
    }

    /// Returns the text content.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Parses a serialized cell back into a value of the given type.
    ///
    /// Empty cells become `Null`. Numbers may carry thousands separators.
    pub fn parse(raw: &str, ty: &FieldType) -> Option<Self> {
        match ty {
            FieldType::Text if raw.is_empty() => Some(Self::Null),
            FieldType::Text => Some(Self::Text(raw.to_string())),
            FieldType::Number | FieldType::Currency(_) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Some(Self::Null);
                }
                let number: f64 = trimmed.replace(',', "").parse().ok()?;
                Some(match ty {
                    FieldType::Currency(code) => Self::Currency(Money::new(number, code.clone())),
                    _ => Self::Number(number),
                })
            }
        }
    }

    /// Renders the value as a single delimited-text cell.
    #[must_use]
    pub fn to_cell(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Number(n) => format_number(*n),
            Self::Currency(money) => format_number(money.amount),
            Self::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cell())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<Money> for Value {
    fn from(value: Money) -> Self {
        Self::Currency(value)
    }
}

/// Formats a number so whole values keep one decimal place (`80.0`).
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 {
        format!("{n:.1}")
    } else {
        n.to_string()
    }
}

/// Rounds half away from zero to `decimals` places.
#[must_use]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(i32::try_from(decimals).unwrap_or(i32::MAX));
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conforms_to() {
        assert!(Value::text("a").conforms_to(&FieldType::Text));
        assert!(Value::Number(1.0).conforms_to(&FieldType::Number));
        assert!(Value::Null.conforms_to(&FieldType::Number));
        assert!(!Value::text("1").conforms_to(&FieldType::Number));

        let gbp = Value::Currency(Money::new(80.0, "GBP"));
        assert!(gbp.conforms_to(&FieldType::Currency("GBP".to_string())));
        assert!(!gbp.conforms_to(&FieldType::Currency("EUR".to_string())));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(Value::parse("1,234.5", &FieldType::Number), Some(Value::Number(1234.5)));
        assert_eq!(Value::parse("", &FieldType::Number), Some(Value::Null));
        assert_eq!(Value::parse("abc", &FieldType::Number), None);
        assert_eq!(
            Value::parse("92.0", &FieldType::Currency("EUR".to_string())),
            Some(Value::Currency(Money::new(92.0, "EUR")))
        );
    }

    #[test]
    fn test_parse_empty_text_is_null() {
        assert_eq!(Value::parse("", &FieldType::Text), Some(Value::Null));
        assert_eq!(Value::parse(" ", &FieldType::Text), Some(Value::text(" ")));
    }

    #[test]
    fn test_to_cell() {
        assert_eq!(Value::Number(80.0).to_cell(), "80.0");
        assert_eq!(Value::Number(80.25).to_cell(), "80.25");
        assert_eq!(Value::Null.to_cell(), "");
        assert_eq!(Value::text("Bank A").to_cell(), "Bank A");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.234_5, 2), 1.23);
        assert_eq!(round_to(1.235_1, 2), 1.24);
        assert_eq!(round_to(80.0, 2), 80.0);
    }
}
