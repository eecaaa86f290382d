//! Row validation.
//!
//! Turns a decoded [`TypedRow`] into an accepted [`Record`] or a list of
//! row errors. Warnings never reject a row.

use crate::models::{ErrorKind, FieldValue, Record, Schema, TypedRow, ValidationError};

/// Outcome of validating one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOutcome {
    /// The accepted record, if no error-severity issue was found.
    pub record: Option<Record>,
    /// Errors and warnings for the row, in column order.
    pub issues: Vec<ValidationError>,
}

impl RowOutcome {
    /// Whether the row was accepted.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        self.record.is_some()
    }

    /// Number of error-severity issues.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_error()).count()
    }
}

/// Validates typed rows against a schema.
///
/// Checks, in order:
/// 1. field decoding failures and non-nullable columns holding null
/// 2. extra input fields (`UNKNOWN_COLUMN` warnings)
/// 3. cross-field rules, when both operands are valid and non-null
#[derive(Debug, Clone, Copy)]
pub struct RowValidator<'a> {
    schema: &'a Schema,
}

impl<'a> RowValidator<'a> {
    /// Creates a validator for `schema`.
    #[must_use]
    pub const fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Returns all issues for `row` without consuming it.
    #[must_use]
    pub fn check(&self, row: &TypedRow) -> Vec<ValidationError> {
        let mut issues = Vec::new();

        for (column, value) in self.schema.columns().iter().zip(&row.values) {
            match value {
                FieldValue::Invalid(field) => issues.push(ValidationError::for_column(
                    row.row,
                    row.line,
                    &column.name,
                    field.reason,
                    format!("{} (got {:?})", field.detail, field.text),
                )),
                FieldValue::Valid(v) if v.is_null() && !column.nullable => {
                    issues.push(ValidationError::for_column(
                        row.row,
                        row.line,
                        &column.name,
                        ErrorKind::NullNotAllowed,
                        "value is required",
                    ));
                },
                FieldValue::Valid(_) => {},
            }
        }

        for extra in &row.extras {
            let name = if extra.name.is_empty() {
                "(unnamed)"
            } else {
                extra.name.as_str()
            };
            issues.push(ValidationError::for_column(
                row.row,
                row.line,
                name,
                ErrorKind::UnknownColumn,
                format!("column is not in the schema; value {:?} ignored", extra.text),
            ));
        }

        for resolved in self.schema.resolved_rules() {
            let left = row.values.get(resolved.left).and_then(FieldValue::value);
            let right = row.values.get(resolved.right).and_then(FieldValue::value);
            let (Some(left), Some(right)) = (left, right) else {
                continue;
            };
            if left.is_null() || right.is_null() {
                continue;
            }
            let holds = left
                .compare(right)
                .is_none_or(|ordering| resolved.rule.op.holds(ordering));
            if !holds {
                issues.push(ValidationError::for_column(
                    row.row,
                    row.line,
                    &self.schema.columns()[resolved.left].name,
                    ErrorKind::RuleViolation,
                    format!("rule '{}' does not hold", resolved.rule),
                ));
            }
        }

        issues
    }

    /// Validates `row`, producing the accepted record when it has no errors.
    #[must_use]
    pub fn validate(&self, row: TypedRow) -> RowOutcome {
        let issues = self.check(&row);
        let record = if issues.iter().any(ValidationError::is_error) {
            None
        } else {
            row.into_record()
        };
        RowOutcome { record, issues }
    }
}
