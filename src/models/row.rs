//! Row representations at each pipeline stage.

use super::report::ErrorKind;
use super::schema::Schema;
use super::value::Value;
use serde::Serialize;

/// A raw field as it appeared in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    text: String,
    quoted: bool,
}

impl RawField {
    /// Creates a raw field.
    #[must_use]
    pub fn new(text: impl Into<String>, quoted: bool) -> Self {
        Self {
            text: text.into(),
            quoted,
        }
    }

    /// Creates an unquoted raw field.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }

    /// The unescaped field text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the field was enclosed in quotes.
    #[must_use]
    pub const fn is_quoted(&self) -> bool {
        self.quoted
    }
}

/// One delimited record as produced by the parser.
///
/// Immutable: fields are only readable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    row: u64,
    line: u64,
    fields: Vec<RawField>,
}

impl RawRow {
    /// Creates a raw row.
    #[must_use]
    pub const fn new(row: u64, line: u64, fields: Vec<RawField>) -> Self {
        Self { row, line, fields }
    }

    /// 1-based data row ordinal (the header is not counted).
    #[must_use]
    pub const fn row(&self) -> u64 {
        self.row
    }

    /// 1-based physical line on which the record started.
    #[must_use]
    pub const fn line(&self) -> u64 {
        self.line
    }

    /// The fields in input order.
    #[must_use]
    pub fn fields(&self) -> &[RawField] {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&RawField> {
        self.fields.get(index)
    }
}

/// A field that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidField {
    /// Original text of the field.
    pub text: String,
    /// Reason code.
    pub reason: ErrorKind,
    /// Human-readable detail.
    pub detail: String,
}

/// Decoding outcome for one schema column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Successfully decoded (possibly null).
    Valid(Value),
    /// Decoding failed.
    Invalid(InvalidField),
}

impl FieldValue {
    /// Returns the decoded value, if valid.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Valid(v) => Some(v),
            Self::Invalid(_) => None,
        }
    }

    /// Whether decoding succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// A field present in the input with no matching schema column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraField {
    /// Header name of the field.
    pub name: String,
    /// Raw text of the field.
    pub text: String,
}

/// A row after field decoding, aligned to the schema's column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedRow {
    /// 1-based data row ordinal.
    pub row: u64,
    /// 1-based physical start line.
    pub line: u64,
    /// One entry per schema column, in schema order.
    pub values: Vec<FieldValue>,
    /// Fields with no schema column.
    pub extras: Vec<ExtraField>,
}

impl TypedRow {
    /// Looks up a column's decoding outcome by name (case-insensitive).
    #[must_use]
    pub fn get<'a>(&'a self, schema: &Schema, name: &str) -> Option<&'a FieldValue> {
        schema.position(name).and_then(|i| self.values.get(i))
    }

    /// Converts into an accepted record.
    ///
    /// Returns `None` if any field is invalid.
    #[must_use]
    pub fn into_record(self) -> Option<Record> {
        let values = self
            .values
            .into_iter()
            .map(|field| match field {
                FieldValue::Valid(v) => Some(v),
                FieldValue::Invalid(_) => None,
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Record {
            row: self.row,
            values,
        })
    }
}

/// An accepted, fully typed record in schema column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Record {
    /// Source data row ordinal (0 for records not read from input).
    pub row: u64,
    /// Values in schema column order.
    pub values: Vec<Value>,
}

impl Record {
    /// Creates a record that did not come from parsed input.
    #[must_use]
    pub const fn new(values: Vec<Value>) -> Self {
        Self { row: 0, values }
    }

    /// Looks up a value by column name (case-insensitive).
    #[must_use]
    pub fn get<'a>(&'a self, schema: &Schema, name: &str) -> Option<&'a Value> {
        schema.position(name).and_then(|i| self.values.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDef, ColumnType};

    #[test]
    fn test_into_record_requires_all_valid() {
        let typed = TypedRow {
            row: 1,
            line: 2,
            values: vec![
                FieldValue::Valid(Value::Integer(1)),
                FieldValue::Valid(Value::Null),
            ],
            extras: Vec::new(),
        };
        let record = typed.into_record().unwrap();
        assert_eq!(record.row, 1);
        assert_eq!(record.values, vec![Value::Integer(1), Value::Null]);

        let broken = TypedRow {
            row: 2,
            line: 3,
            values: vec![FieldValue::Invalid(InvalidField {
                text: "x".into(),
                reason: ErrorKind::TypeMismatch,
                detail: "not an integer".into(),
            })],
            extras: Vec::new(),
        };
        assert!(broken.into_record().is_none());
    }

    #[test]
    fn test_record_lookup_by_name() {
        let schema = Schema::new(vec![
            ColumnDef::new("id", ColumnType::Integer),
            ColumnDef::new("name", ColumnType::Text),
        ])
        .unwrap();
        let record = Record::new(vec![Value::Integer(7), Value::from("Ada")]);
        assert_eq!(record.get(&schema, "NAME"), Some(&Value::from("Ada")));
        assert!(record.get(&schema, "email").is_none());
    }
}
