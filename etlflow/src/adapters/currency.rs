//! Currency conversion against a reference exchange table.

use async_trait::async_trait;

use crate::context::{ActionContext, StageInputs};
use crate::core::{round_to, ExchangeTable, Field, FieldType, Money, RecordStream, Schema, Value};
use crate::errors::ActionError;
use crate::stages::{Action, ActionResult};

/// Placeholder replaced by the currency code in output field names.
pub const CODE_PLACEHOLDER: &str = "{code}";

/// Default output field pattern.
pub const DEFAULT_FIELD_PATTERN: &str = "MC_{code}_Billion";

/// Adds one converted amount per target currency to every record.
#[derive(Debug, Clone)]
pub struct CurrencyConversion {
    source_field: String,
    reference: String,
    targets: Vec<String>,
    field_pattern: String,
    decimals: u32,
}

impl CurrencyConversion {
    /// Converts `source_field` with rates from the `reference` table.
    #[must_use]
    pub fn new(
        source_field: impl Into<String>,
        reference: impl Into<String>,
        targets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            source_field: source_field.into(),
            reference: reference.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            field_pattern: DEFAULT_FIELD_PATTERN.to_string(),
            decimals: 2,
        }
    }

    /// Sets the output field pattern; `{code}` is replaced by the target code.
    #[must_use]
    pub fn with_field_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.field_pattern = pattern.into();
        self
    }

    /// Sets the rounding precision.
    #[must_use]
    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = decimals;
        self
    }

    /// Returns the output field name for a currency code.
    #[must_use]
    pub fn field_name(&self, code: &str) -> String {
        self.field_pattern.replace(CODE_PLACEHOLDER, code)
    }

    /// Applies the conversion with an explicit table.
    pub fn convert(&self, stream: &RecordStream, table: &ExchangeTable) -> Result<RecordStream, ActionError> {
        let position = stream.schema().position(&self.source_field).ok_or_else(|| {
            ActionError::malformed(format!("no source field '{}'", self.source_field))
        })?;
        let rates = self
            .targets
            .iter()
            .map(|code| table.rate(code).map(|rate| (code.as_str(), rate)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut fields = stream.schema().fields().to_vec();
        fields.extend(
            rates
                .iter()
                .map(|(code, _)| Field::new(self.field_name(code), FieldType::Currency((*code).to_string()))),
        );
        let schema = Schema::new(fields).map_err(|e| ActionError::malformed(e.to_string()))?;

        let mut out = RecordStream::new(schema);
        for (index, row) in stream.rows().iter().enumerate() {
            let amount = match &row[position] {
                Value::Null => None,
                value => Some(value.as_f64().ok_or_else(|| {
                    ActionError::malformed(format!(
                        "record {}: '{}' is {}, not numeric",
                        index + 1,
                        self.source_field,
                        value.type_name()
                    ))
                })?),
            };
            let mut values = row.clone();
            values.extend(rates.iter().map(|(code, rate)| match amount {
                Some(amount) => Value::Currency(Money::new(round_to(amount * rate, self.decimals), *code)),
                None => Value::Null,
            }));
            out.push(values)?;
        }
        Ok(out)
    }
}

#[async_trait]
impl Action for CurrencyConversion {
    async fn execute(&self, inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        let table = ctx.reference(&self.reference)?;
        self.convert(inputs.single()?, &table).map(Some)
    }
}
