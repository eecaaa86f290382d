//! Field codec: raw text to typed values and back.

use crate::models::{
    ColumnDef, ColumnType, ErrorKind, ExtraField, FieldValue, InvalidField, RawField, RawRow,
    Record, Schema, TypedRow, Value,
};
use crate::{Error, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::borrow::Cow;

/// Maps schema columns to input field positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    sources: Vec<Option<usize>>,
    extras: Vec<(usize, String)>,
}

impl ColumnMapping {
    /// Identity mapping for headerless input: column `i` is field `i`.
    #[must_use]
    pub fn positional(schema: &Schema) -> Self {
        Self {
            sources: (0..schema.len()).map(Some).collect(),
            extras: Vec::new(),
        }
    }

    /// Maps header names to schema columns (case-insensitive).
    ///
    /// Header fields with no schema column, and repeated header names after
    /// the first, become extras.
    #[must_use]
    pub fn from_header(schema: &Schema, headers: &[String]) -> Self {
        let mut sources = vec![None; schema.len()];
        let mut extras = Vec::new();
        for (index, name) in headers.iter().enumerate() {
            match schema.position(name) {
                Some(position) if sources[position].is_none() => sources[position] = Some(index),
                _ => extras.push((index, name.clone())),
            }
        }
        Self { sources, extras }
    }

    /// Input field index feeding schema column `position`.
    #[must_use]
    pub fn source(&self, position: usize) -> Option<usize> {
        self.sources.get(position).copied().flatten()
    }

    /// Schema columns absent from the input.
    pub fn missing<'a>(&'a self, schema: &'a Schema) -> impl Iterator<Item = &'a ColumnDef> {
        schema
            .columns()
            .iter()
            .zip(&self.sources)
            .filter(|(_, source)| source.is_none())
            .map(|(column, _)| column)
    }

    /// Input fields with no schema column, as `(index, header name)`.
    #[must_use]
    pub fn extras(&self) -> &[(usize, String)] {
        &self.extras
    }
}

/// Decodes and encodes fields for one schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldCodec<'a> {
    schema: &'a Schema,
    null_value: &'a str,
}

impl<'a> FieldCodec<'a> {
    /// Creates a codec. `null_value` is the extra unquoted null spelling;
    /// the empty string is always null.
    #[must_use]
    pub const fn new(schema: &'a Schema, null_value: &'a str) -> Self {
        Self { schema, null_value }
    }

    /// The schema this codec decodes against.
    #[must_use]
    pub const fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Whether a raw field reads as null for the column at `position`.
    ///
    /// Unquoted empty text and unquoted null spellings are null. Quoted empty
    /// text is an empty string for nullable text columns and null otherwise,
    /// so a required column never accepts an empty value.
    #[must_use]
    pub fn is_null(&self, position: usize, field: &RawField) -> bool {
        let text = field.text();
        if field.is_quoted() {
            return text.is_empty()
                && self
                    .schema
                    .columns()
                    .get(position)
                    .is_some_and(|c| c.column_type != ColumnType::Text || !c.nullable);
        }
        text.is_empty() || (!self.null_value.is_empty() && text == self.null_value)
    }

    /// Decodes one field for the schema column at `position`.
    #[must_use]
    pub fn decode(&self, position: usize, field: &RawField) -> FieldValue {
        let Some(column) = self.schema.columns().get(position) else {
            return invalid(field.text(), ErrorKind::UnknownColumn, "no such column");
        };
        if self.is_null(position, field) {
            return null_for(column, field.text());
        }
        let text = field.text();
        match column.column_type {
            ColumnType::Text => self.decode_text(position, text),
            ColumnType::Integer => decode_integer(text),
            ColumnType::Decimal => decode_decimal(text),
            ColumnType::Boolean => decode_boolean(text),
            ColumnType::Date => decode_date(text, self.schema.date_format(position)),
        }
    }

    /// Decodes a raw row into a [`TypedRow`] aligned to the schema.
    ///
    /// Columns missing from the input decode as null. Non-empty fields with
    /// no schema column are carried as extras.
    #[must_use]
    pub fn decode_row(&self, raw: &RawRow, mapping: &ColumnMapping) -> TypedRow {
        let values = (0..self.schema.len())
            .map(|position| match mapping.source(position).and_then(|i| raw.get(i)) {
                Some(field) => self.decode(position, field),
                None => null_for(&self.schema.columns()[position], ""),
            })
            .collect();
        let extras = mapping
            .extras()
            .iter()
            .filter_map(|(index, name)| {
                raw.get(*index)
                    .filter(|field| !field.text().is_empty())
                    .map(|field| ExtraField {
                        name: name.clone(),
                        text: field.text().to_string(),
                    })
            })
            .collect();
        TypedRow {
            row: raw.row(),
            line: raw.line(),
            values,
            extras,
        }
    }

    /// Encodes a value for the column at `position`. Null encodes as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the value's type differs from the
    /// column type, or a non-nullable column holds null.
    pub fn encode<'v>(&self, position: usize, value: &'v Value) -> Result<Option<Cow<'v, str>>> {
        self.check(position, value)?;
        Ok(Some(match value {
            Value::Text(s) => Cow::Borrowed(s.as_str()),
            Value::Integer(n) => Cow::Owned(n.to_string()),
            Value::Decimal(d) => Cow::Owned(d.to_string()),
            Value::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::Date(d) => Cow::Owned(d.format(self.schema.date_format(position)).to_string()),
            Value::Null => return Ok(None),
        }))
    }

    /// Checks that `value` fits the column at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] on a type mismatch, a null or empty
    /// text in a non-nullable column, or an out-of-range position.
    pub fn check(&self, position: usize, value: &Value) -> Result<()> {
        let column = self.schema.columns().get(position).ok_or_else(|| {
            Error::InvalidInput(format!("no column at position {}", position + 1))
        })?;
        match value.column_type() {
            None if column.nullable => Ok(()),
            None => Err(Error::InvalidInput(format!(
                "column '{}' is not nullable",
                column.name
            ))),
            Some(ColumnType::Text) if !column.nullable && value.as_text() == Some("") => {
                Err(Error::InvalidInput(format!(
                    "column '{}' is not nullable and cannot hold empty text",
                    column.name
                )))
            },
            Some(actual) if actual == column.column_type => Ok(()),
            Some(actual) => Err(Error::InvalidInput(format!(
                "column '{}' expects {}, got {actual}",
                column.name, column.column_type
            ))),
        }
    }

    /// Checks a whole record's arity and value types.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the record does not fit the schema.
    pub fn check_record(&self, record: &Record) -> Result<()> {
        if record.values.len() != self.schema.len() {
            return Err(Error::InvalidInput(format!(
                "record has {} values, schema has {} columns",
                record.values.len(),
                self.schema.len()
            )));
        }
        record
            .values
            .iter()
            .enumerate()
            .try_for_each(|(position, value)| self.check(position, value))
    }

    fn decode_text(&self, position: usize, text: &str) -> FieldValue {
        match self.schema.text_pattern(position) {
            Some(pattern) if !pattern.is_match(text) => invalid(
                text,
                ErrorKind::FormatMismatch,
                format!("does not match pattern {}", pattern.as_str()),
            ),
            _ => FieldValue::Valid(Value::Text(text.to_string())),
        }
    }
}

fn null_for(column: &ColumnDef, text: &str) -> FieldValue {
    if column.nullable {
        FieldValue::Valid(Value::Null)
    } else {
        invalid(text, ErrorKind::NullNotAllowed, "value is required")
    }
}

fn invalid(text: &str, reason: ErrorKind, detail: impl Into<String>) -> FieldValue {
    FieldValue::Invalid(InvalidField {
        text: text.to_string(),
        reason,
        detail: detail.into(),
    })
}

fn split_sign(text: &str) -> &str {
    text.strip_prefix(['+', '-']).unwrap_or(text)
}

fn decode_integer(text: &str) -> FieldValue {
    let digits = split_sign(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return invalid(text, ErrorKind::TypeMismatch, "not an integer");
    }
    text.parse::<i64>().map_or_else(
        |_| invalid(text, ErrorKind::TypeMismatch, "integer out of range"),
        |n| FieldValue::Valid(Value::Integer(n)),
    )
}

fn decode_decimal(text: &str) -> FieldValue {
    let body = split_sign(text);
    let (whole, fraction) = body.split_once('.').unwrap_or((body, ""));
    let well_formed = !(whole.is_empty() && fraction.is_empty())
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit());
    if !well_formed {
        return invalid(text, ErrorKind::TypeMismatch, "not a decimal number");
    }
    Decimal::from_str_exact(text).map_or_else(
        |e| invalid(text, ErrorKind::TypeMismatch, format!("decimal out of range: {e}")),
        |d| FieldValue::Valid(Value::Decimal(d)),
    )
}

fn decode_boolean(text: &str) -> FieldValue {
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => FieldValue::Valid(Value::Boolean(true)),
        "false" | "no" | "0" => FieldValue::Valid(Value::Boolean(false)),
        _ => invalid(text, ErrorKind::TypeMismatch, "not a boolean"),
    }
}

fn decode_date(text: &str, format: &str) -> FieldValue {
    match NaiveDate::parse_from_str(text, format) {
        Ok(date) if date.format(format).to_string() == text => FieldValue::Valid(Value::Date(date)),
        _ => invalid(
            text,
            ErrorKind::FormatMismatch,
            format!("not a date in format {format}"),
        ),
    }
}
