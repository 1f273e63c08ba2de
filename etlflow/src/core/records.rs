//! Tabular record streams passed between stages.
//!
//! A [`RecordStream`] owns a shared [`Schema`] and an ordered list of rows.
//! Every row holds exactly one value per schema field, so all records in a
//! stream share the same field set. Streams are never mutated once handed to
//! another stage; transforms build a new stream.
//!
//! Empty text is stored as `Null`, so a missing text cell has exactly one
//! representation.

use super::value::{FieldType, Value};
use crate::errors::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// The field name.
    pub name: String,
    /// The declared type.
    #[serde(rename = "type")]
    pub ty: FieldType,
}

impl Field {
    /// Creates a new field.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Creates a text field.
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    /// Creates a number field.
    #[must_use]
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }
}

/// The ordered field set shared by every record of a stream.
///
/// Field order is kept for serialization; lookups go through the name index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Creates a schema, rejecting duplicate field names.
    pub fn new(fields: Vec<Field>) -> Result<Self, SchemaError> {
        let mut index = HashMap::with_capacity(fields.len());
        for (position, field) in fields.iter().enumerate() {
            if index.insert(field.name.clone(), position).is_some() {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields, index })
    }

    /// Creates a schema of text fields.
    pub fn text<I, S>(names: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(Field::text).collect())
    }

    /// Creates a schema with no fields.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns the fields in order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the field names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Returns the position of a field.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.position(name).map(|i| &self.fields[i])
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks a row of values against the schema.
    pub fn check(&self, values: &[Value]) -> Result<(), SchemaError> {
        if values.len() != self.fields.len() {
            return Err(SchemaError::Arity {
                expected: self.fields.len(),
                actual: values.len(),
            });
        }
        for (field, value) in self.fields.iter().zip(values) {
            if !value.conforms_to(&field.ty) {
                return Err(SchemaError::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.ty.to_string(),
                    actual: value.type_name(),
                });
            }
        }
        Ok(())
    }
}

/// A borrowed view of one record.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    schema: &'a Schema,
    values: &'a [Value],
}

impl<'a> Record<'a> {
    /// Looks up a value by field name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.schema.position(name).map(|i| &self.values[i])
    }

    /// Returns the values in schema order.
    #[must_use]
    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    /// Returns the record as `(name, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        let schema = self.schema;
        let values = self.values;
        schema
            .fields
            .iter()
            .zip(values.iter())
            .map(|(f, v)| (f.name.as_str(), v))
    }
}

/// An ordered sequence of same-schema records.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordStream {
    schema: Arc<Schema>,
    rows: Vec<Vec<Value>>,
}

impl RecordStream {
    /// Creates an empty stream with the given schema.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self::with_schema(Arc::new(schema))
    }

    /// Creates an empty stream sharing an existing schema.
    #[must_use]
    pub fn with_schema(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Creates a stream with no fields and no records.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Schema::empty())
    }

    /// Creates a stream from rows, checking each against the schema.
    pub fn from_rows(schema: Schema, rows: Vec<Vec<Value>>) -> Result<Self, SchemaError> {
        let mut stream = Self::new(schema);
        for row in rows {
            stream.push(row)?;
        }
        Ok(stream)
    }

    /// Appends a record, checking it against the schema.
    ///
    /// Empty text values are stored as `Null`.
    pub fn push(&mut self, mut values: Vec<Value>) -> Result<(), SchemaError> {
        self.schema.check(&values)?;
        for value in &mut values {
            if matches!(value, Value::Text(s) if s.is_empty()) {
                *value = Value::Null;
            }
        }
        self.rows.push(values);
        Ok(())
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the shared schema handle.
    #[must_use]
    pub fn schema_arc(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the stream has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the record at `index`.
    #[must_use]
    pub fn record(&self, index: usize) -> Option<Record<'_>> {
        self.rows.get(index).map(|values| Record {
            schema: &self.schema,
            values,
        })
    }

    /// Iterates over the records in order.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> + '_ {
        self.rows.iter().map(move |values| Record {
            schema: &self.schema,
            values,
        })
    }

    /// Returns the raw rows in order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Returns every value of one column.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>, SchemaError> {
        let position = self
            .schema
            .position(name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))?;
        Ok(self.rows.iter().map(|row| &row[position]).collect())
    }

    /// Builds a new stream by rewriting every row under a new schema.
    pub fn map_rows<F>(&self, schema: Schema, mut f: F) -> Result<Self, SchemaError>
    where
        F: FnMut(Record<'_>) -> Vec<Value>,
    {
        let mut out = Self::new(schema);
        out.rows.reserve(self.rows.len());
        for record in self.records() {
            out.push(f(record))?;
        }
        Ok(out)
    }

    /// Builds a new stream with the same schema, transforming each value.
    pub fn map_values<F>(&self, mut f: F) -> Result<Self, SchemaError>
    where
        F: FnMut(&Field, &Value) -> Value,
    {
        let schema = self.schema.clone();
        let mut out = Self::with_schema(Arc::clone(&schema));
        for row in &self.rows {
            let mapped = schema
                .fields()
                .iter()
                .zip(row)
                .map(|(field, value)| f(field, value))
                .collect();
            out.push(mapped)?;
        }
        Ok(out)
    }
}

impl Default for RecordStream {
    fn default() -> Self {
        Self::empty()
    }
}
