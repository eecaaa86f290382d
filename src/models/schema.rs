//! Schema definitions.
//!
//! A [`Schema`] is an ordered list of [`ColumnDef`]s plus optional
//! [`CrossFieldRule`]s. Schemas are compiled once on construction: names are
//! indexed case-insensitively, date patterns are translated to strftime, and
//! text patterns are compiled into anchored regular expressions.

use crate::{Error, Result};
use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::path::Path;

/// Date pattern used for date columns that declare no format.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Free text.
    #[serde(alias = "string", alias = "str")]
    Text,
    /// Signed 64-bit integer.
    #[serde(alias = "int", alias = "i64")]
    Integer,
    /// Exact decimal number.
    #[serde(alias = "number", alias = "numeric")]
    Decimal,
    /// Calendar date without time zone.
    Date,
    /// Boolean flag.
    #[serde(alias = "bool")]
    Boolean,
}

impl ColumnType {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::Boolean => "boolean",
        }
    }

    /// Whether values of this type have a meaningful ordering.
    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        !matches!(self, Self::Boolean)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name, unique within the schema (case-insensitive).
    pub name: String,
    /// Declared value type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Whether the column accepts null values.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Optional format constraint.
    ///
    /// For date columns this is the date pattern (`yyyy-MM-dd` or `%Y-%m-%d`
    /// style). For text columns it is a regular expression the whole value
    /// must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

const fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    /// Creates a nullable column with no format constraint.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            format: None,
        }
    }

    /// Marks the column as non-nullable.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the format constraint.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Comparison operator for cross-field rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// Left is strictly less than right.
    #[serde(rename = "<", alias = "lt")]
    Lt,
    /// Left is less than or equal to right.
    #[serde(rename = "<=", alias = "le")]
    Le,
    /// Left equals right.
    #[serde(rename = "=", alias = "==", alias = "eq")]
    Eq,
    /// Left differs from right.
    #[serde(rename = "!=", alias = "ne")]
    Ne,
    /// Left is greater than or equal to right.
    #[serde(rename = ">=", alias = "ge")]
    Ge,
    /// Left is strictly greater than right.
    #[serde(rename = ">", alias = "gt")]
    Gt,
}

impl CompareOp {
    /// Returns the operator symbol.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Gt => ">",
        }
    }

    /// Whether the operator needs an ordering rather than just equality.
    #[must_use]
    pub const fn needs_ordering(&self) -> bool {
        !matches!(self, Self::Eq | Self::Ne)
    }

    /// Evaluates the operator against a comparison result.
    #[must_use]
    pub const fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Self::Lt => matches!(ordering, Less),
            Self::Le => matches!(ordering, Less | Equal),
            Self::Eq => matches!(ordering, Equal),
            Self::Ne => !matches!(ordering, Equal),
            Self::Ge => matches!(ordering, Greater | Equal),
            Self::Gt => matches!(ordering, Greater),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule comparing two columns of the same row, e.g. `end >= start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossFieldRule {
    /// Left-hand column name.
    pub left: String,
    /// Comparison operator.
    pub op: CompareOp,
    /// Right-hand column name.
    pub right: String,
}

impl CrossFieldRule {
    /// Creates a new rule.
    #[must_use]
    pub fn new(left: impl Into<String>, op: CompareOp, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            op,
            right: right.into(),
        }
    }
}

impl fmt::Display for CrossFieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

/// Serialized form of a schema, as found in schema files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Optional schema name, used in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Ordered column definitions.
    pub columns: Vec<ColumnDef>,
    /// Cross-field rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<CrossFieldRule>,
}

/// Compiled format constraint for one column.
#[derive(Debug, Clone)]
enum CompiledFormat {
    /// strftime pattern for date columns.
    Date(String),
    /// Anchored regex for text columns.
    Pattern(Regex),
}

/// Compiled cross-field rule with resolved column positions.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedRule {
    pub(crate) left: usize,
    pub(crate) right: usize,
    pub(crate) rule: CrossFieldRule,
}

/// A validated, compiled schema.
#[derive(Debug, Clone)]
pub struct Schema {
    name: Option<String>,
    columns: Vec<ColumnDef>,
    formats: Vec<Option<CompiledFormat>>,
    rules: Vec<ResolvedRule>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Creates a schema from column definitions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the schema is empty, names collide
    /// (case-insensitively), or a format constraint is invalid.
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        Self::from_definition(SchemaDefinition {
            name: None,
            columns,
            rules: Vec::new(),
        })
    }

    /// Creates a schema from columns and cross-field rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the columns are invalid or a rule
    /// references an unknown column or compares incompatible types.
    pub fn with_rules(columns: Vec<ColumnDef>, rules: Vec<CrossFieldRule>) -> Result<Self> {
        Self::from_definition(SchemaDefinition {
            name: None,
            columns,
            rules,
        })
    }

    /// Compiles a schema definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the definition is invalid.
    pub fn from_definition(definition: SchemaDefinition) -> Result<Self> {
        if definition.columns.is_empty() {
            return Err(Error::InvalidInput(
                "schema must declare at least one column".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(definition.columns.len());
        let mut formats = Vec::with_capacity(definition.columns.len());

        for (position, column) in definition.columns.iter().enumerate() {
            let name = column.name.trim();
            if name.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "column {} has an empty name",
                    position + 1
                )));
            }
            if index.insert(name.to_lowercase(), position).is_some() {
                return Err(Error::InvalidInput(format!(
                    "duplicate column name '{name}' (names are case-insensitive)"
                )));
            }
            formats.push(compile_format(column)?);
        }

        let mut schema = Self {
            name: definition.name,
            columns: definition.columns,
            formats,
            rules: Vec::with_capacity(definition.rules.len()),
            index,
        };

        for rule in definition.rules {
            let resolved = schema.resolve_rule(rule)?;
            schema.rules.push(resolved);
        }

        Ok(schema)
    }

    /// Loads a schema definition from a TOML, JSON or YAML file.
    ///
    /// The format is chosen by file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or compiled.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_schema_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        let parse_error = |e: &dyn fmt::Display| Error::OperationFailed {
            operation: "parse_schema_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        };

        let definition: SchemaDefinition = match ext.as_deref() {
            Some("toml") => toml::from_str(&contents).map_err(|e| parse_error(&e))?,
            Some("json") => serde_json::from_str(&contents).map_err(|e| parse_error(&e))?,
            Some("yaml" | "yml") => {
                serde_yaml_ng::from_str(&contents).map_err(|e| parse_error(&e))?
            },
            _ => {
                return Err(Error::InvalidInput(format!(
                    "unsupported schema file extension: {}",
                    path.display()
                )));
            },
        };

        Self::from_definition(definition)
    }

    fn resolve_rule(&self, rule: CrossFieldRule) -> Result<ResolvedRule> {
        let left = self.position(&rule.left).ok_or_else(|| {
            Error::InvalidInput(format!("rule '{rule}' references unknown column '{}'", rule.left))
        })?;
        let right = self.position(&rule.right).ok_or_else(|| {
            Error::InvalidInput(format!(
                "rule '{rule}' references unknown column '{}'",
                rule.right
            ))
        })?;

        let left_type = self.columns[left].column_type;
        let right_type = self.columns[right].column_type;
        if left_type != right_type {
            return Err(Error::InvalidInput(format!(
                "rule '{rule}' compares {left_type} with {right_type}"
            )));
        }
        if rule.op.needs_ordering() && !left_type.is_ordered() {
            return Err(Error::InvalidInput(format!(
                "rule '{rule}' orders {left_type} values; only = and != apply"
            )));
        }

        Ok(ResolvedRule { left, right, rule })
    }

    /// Returns the schema name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Sets the schema name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the column definitions in order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false: a compiled schema has at least one column.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the declared rules.
    pub fn rules(&self) -> impl Iterator<Item = &CrossFieldRule> {
        self.rules.iter().map(|r| &r.rule)
    }

    pub(crate) fn resolved_rules(&self) -> &[ResolvedRule] {
        &self.rules
    }

    /// Returns the position of a column by name (case-insensitive).
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&name.trim().to_lowercase()).copied()
    }

    /// Returns a column definition by name (case-insensitive).
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.position(name).map(|i| &self.columns[i])
    }

    /// Returns the column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Returns the strftime pattern used for the date column at `position`.
    ///
    /// Non-date columns and out-of-range positions fall back to the default.
    #[must_use]
    pub fn date_format(&self, position: usize) -> &str {
        match self.formats.get(position) {
            Some(Some(CompiledFormat::Date(fmt))) => fmt,
            _ => DEFAULT_DATE_FORMAT,
        }
    }

    /// Returns the compiled text pattern for the column at `position`.
    #[must_use]
    pub fn text_pattern(&self, position: usize) -> Option<&Regex> {
        match self.formats.get(position) {
            Some(Some(CompiledFormat::Pattern(re))) => Some(re),
            _ => None,
        }
    }

    /// Returns the serializable definition of this schema.
    #[must_use]
    pub fn to_definition(&self) -> SchemaDefinition {
        SchemaDefinition {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rules: self.rules().cloned().collect(),
        }
    }
}

fn compile_format(column: &ColumnDef) -> Result<Option<CompiledFormat>> {
    match (column.column_type, column.format.as_deref()) {
        (ColumnType::Date, None) => Ok(Some(CompiledFormat::Date(DEFAULT_DATE_FORMAT.to_string()))),
        (ColumnType::Date, Some(pattern)) => {
            let strftime = translate_date_pattern(pattern);
            let mut rendered = String::new();
            if StrftimeItems::new(&strftime).any(|item| matches!(item, Item::Error))
                || write!(rendered, "{}", NaiveDate::default().format(&strftime)).is_err()
            {
                return Err(Error::InvalidInput(format!(
                    "column '{}' has an invalid date format '{pattern}'",
                    column.name
                )));
            }
            Ok(Some(CompiledFormat::Date(strftime)))
        },
        (ColumnType::Text, Some(pattern)) => {
            let anchored = format!("^(?:{pattern})$");
            let re = Regex::new(&anchored).map_err(|e| {
                Error::InvalidInput(format!(
                    "column '{}' has an invalid text pattern: {e}",
                    column.name
                ))
            })?;
            Ok(Some(CompiledFormat::Pattern(re)))
        },
        (_, None) => Ok(None),
        (other, Some(_)) => Err(Error::InvalidInput(format!(
            "column '{}': format constraints apply to date and text columns, not {other}",
            column.name
        ))),
    }
}

/// Translates a `yyyy-MM-dd` style date pattern into strftime syntax.
///
/// Patterns that already contain `%` are returned unchanged. Recognized
/// tokens: `yyyy`, `yy`, `MM`, `M`, `dd`, `d`. Everything else is literal.
#[must_use]
pub fn translate_date_pattern(pattern: &str) -> String {
    const TOKENS: [(&str, &str); 6] = [
        ("yyyy", "%Y"),
        ("yy", "%y"),
        ("MM", "%m"),
        ("M", "%-m"),
        ("dd", "%d"),
        ("d", "%-d"),
    ];

    if pattern.contains('%') {
        return pattern.to_string();
    }

    let mut out = String::with_capacity(pattern.len() + 4);
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (token, replacement) in TOKENS {
            if let Some(stripped) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = stripped;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", ColumnType::Integer).required(),
            ColumnDef::new("name", ColumnType::Text),
            ColumnDef::new("joined", ColumnType::Date).with_format("yyyy-MM-dd"),
        ]
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let schema = Schema::new(people()).unwrap();
        assert_eq!(schema.position("ID"), Some(0));
        assert_eq!(schema.position(" Joined "), Some(2));
        assert!(schema.column("missing").is_none());
        assert_eq!(schema.date_format(2), "%Y-%m-%d");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let columns = vec![
            ColumnDef::new("Name", ColumnType::Text),
            ColumnDef::new("name", ColumnType::Text),
        ];
        let err = Schema::new(columns).unwrap_err();
        assert!(err.to_string().contains("duplicate column name"));
    }

    #[test]
    fn test_empty_schema_rejected() {
        assert!(Schema::new(Vec::new()).is_err());
    }

    #[test]
    fn test_format_on_integer_rejected() {
        let columns = vec![ColumnDef::new("n", ColumnType::Integer).with_format("\\d+")];
        assert!(Schema::new(columns).is_err());
    }

    #[test]
    fn test_time_only_date_format_rejected() {
        let result = Schema::new(vec![ColumnDef::new("at", ColumnType::Date).with_format("%H:%M")]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let columns = vec![ColumnDef::new("code", ColumnType::Text).with_format("(")];
        assert!(Schema::new(columns).is_err());
    }

    #[test]
    fn test_rule_resolution() {
        let columns = vec![
            ColumnDef::new("start", ColumnType::Date),
            ColumnDef::new("end", ColumnType::Date),
            ColumnDef::new("active", ColumnType::Boolean),
            ColumnDef::new("label", ColumnType::Text),
        ];

        let ok = Schema::with_rules(
            columns.clone(),
            vec![CrossFieldRule::new("end", CompareOp::Ge, "START")],
        )
        .unwrap();
        assert_eq!(ok.resolved_rules()[0].left, 1);
        assert_eq!(ok.resolved_rules()[0].right, 0);

        let unknown = Schema::with_rules(
            columns.clone(),
            vec![CrossFieldRule::new("end", CompareOp::Ge, "finish")],
        );
        assert!(unknown.is_err());

        let mixed = Schema::with_rules(
            columns.clone(),
            vec![CrossFieldRule::new("end", CompareOp::Eq, "label")],
        );
        assert!(mixed.is_err());

        let ordered_bool = Schema::with_rules(
            columns,
            vec![CrossFieldRule::new("active", CompareOp::Lt, "active")],
        );
        assert!(ordered_bool.is_err());
    }

    #[test]
    fn test_translate_date_pattern() {
        assert_eq!(translate_date_pattern("yyyy-MM-dd"), "%Y-%m-%d");
        assert_eq!(translate_date_pattern("dd/MM/yy"), "%d/%m/%y");
        assert_eq!(translate_date_pattern("M/d/yyyy"), "%-m/%-d/%Y");
        assert_eq!(translate_date_pattern("%d.%m.%Y"), "%d.%m.%Y");
    }

    #[test]
    fn test_definition_from_toml() {
        let toml_src = r#"
name = "people"

[[columns]]
name = "id"
type = "int"
nullable = false

[[columns]]
name = "joined"
type = "date"
format = "yyyy-MM-dd"

[[columns]]
name = "left"
type = "date"

[[rules]]
left = "left"
op = ">="
right = "joined"
"#;
        let definition: SchemaDefinition = toml::from_str(toml_src).unwrap();
        let schema = Schema::from_definition(definition).unwrap();
        assert_eq!(schema.name(), Some("people"));
        assert_eq!(schema.len(), 3);
        assert!(!schema.columns()[0].nullable);
        assert!(schema.columns()[1].nullable);
        assert_eq!(schema.rules().count(), 1);
    }

    #[test]
    fn test_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"{"columns": [{"name": "code", "type": "text", "format": "[A-Z]{3}"}]}"#,
        )
        .unwrap();

        let schema = Schema::load_from_file(&path).unwrap();
        assert!(schema.text_pattern(0).unwrap().is_match("BTC"));
        assert!(!schema.text_pattern(0).unwrap().is_match("BTCX"));
    }

    #[test]
    fn test_load_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.txt");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            Schema::load_from_file(&path),
            Err(Error::InvalidInput(_))
        ));
    }
}
