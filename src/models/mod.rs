//! Data models for csvgate.
//!
//! Schemas describe what a row must look like, rows carry data through the
//! pipeline stages, and reports summarize a finished run.

mod report;
mod row;
mod schema;
mod value;

pub use report::{
    AbortReason, ErrorCategory, ErrorKind, IngestionReport, PipelineState, Severity,
    ValidationError,
};
pub use row::{ExtraField, FieldValue, InvalidField, RawField, RawRow, Record, TypedRow};
pub use schema::{
    ColumnDef, ColumnType, CompareOp, CrossFieldRule, DEFAULT_DATE_FORMAT, Schema,
    SchemaDefinition, translate_date_pattern,
};
pub use value::Value;
