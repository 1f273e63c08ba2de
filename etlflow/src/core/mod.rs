//! Core domain model types for etlflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stage status, run status and kind enums
//! - Scalar values and field types
//! - Tabular record streams
//! - Read-only reference tables

mod records;
mod reference;
mod status;
mod value;

pub use records::{Field, Record, RecordStream, Schema};
pub use reference::{ExchangeTable, ReferenceTables};
pub use status::{RunStatus, StageKind, StageStatus};
pub use value::{round_to, FieldType, Money, Value};
