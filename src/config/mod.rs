//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `CSVGATE_*` environment overrides. Every pipeline receives its config
//! explicitly; nothing here is global.

use crate::observability::LogFormat;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default upper bound on the bytes of a single record (1 MiB).
pub const DEFAULT_MAX_RECORD_BYTES: usize = 1024 * 1024;

/// Default number of rows per parallel decode batch.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// How quote characters inside quoted fields are escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Escape {
    /// A quote is written twice: `"say ""hi"""`.
    #[default]
    Doubled,
    /// A backslash escapes the next byte: `"say \"hi\""`.
    ///
    /// Doubled quotes are still accepted on input.
    Backslash,
}

/// Delimiter, quoting and null conventions of a CSV stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvDialect {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Quote byte.
    pub quote: u8,
    /// Escape convention inside quoted fields.
    pub escape: Escape,
    /// Whether the first record is a header.
    pub has_header: bool,
    /// Whether blank lines are skipped.
    pub skip_empty_lines: bool,
    /// Unquoted text treated as null in addition to the empty string.
    pub null_value: String,
    /// Whether unquoted field text is trimmed of surrounding whitespace.
    pub trim: bool,
    /// Upper bound on the bytes of one record.
    pub max_record_bytes: usize,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            escape: Escape::Doubled,
            has_header: true,
            skip_empty_lines: true,
            null_value: String::new(),
            trim: false,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

impl CsvDialect {
    /// Tab-separated values.
    #[must_use]
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::default()
        }
    }

    /// Sets the delimiter.
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the quote byte.
    #[must_use]
    pub const fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    /// Sets the escape convention.
    #[must_use]
    pub const fn with_escape(mut self, escape: Escape) -> Self {
        self.escape = escape;
        self
    }

    /// Sets whether the first record is a header.
    #[must_use]
    pub const fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Sets the null representation.
    #[must_use]
    pub fn with_null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = null_value.into();
        self
    }

    /// Sets whether blank lines are skipped.
    #[must_use]
    pub const fn with_skip_empty_lines(mut self, skip: bool) -> Self {
        self.skip_empty_lines = skip;
        self
    }

    /// Sets whether unquoted fields are trimmed.
    #[must_use]
    pub const fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    /// Sets the per-record byte limit.
    #[must_use]
    pub const fn with_max_record_bytes(mut self, max: usize) -> Self {
        self.max_record_bytes = max;
        self
    }

    /// Checks that the dialect bytes are usable together.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for non-ASCII or line-break bytes,
    /// colliding delimiter/quote/escape bytes, or a zero record limit.
    pub fn validate(&self) -> Result<()> {
        for (name, byte) in [("delimiter", self.delimiter), ("quote", self.quote)] {
            if !byte.is_ascii() || byte == b'\n' || byte == b'\r' {
                return Err(Error::InvalidInput(format!(
                    "{name} must be a single ASCII character other than a line break"
                )));
            }
        }
        if self.delimiter == self.quote {
            return Err(Error::InvalidInput(
                "delimiter and quote must differ".to_string(),
            ));
        }
        if self.escape == Escape::Backslash && (self.delimiter == b'\\' || self.quote == b'\\') {
            return Err(Error::InvalidInput(
                "backslash escaping cannot be combined with a backslash delimiter or quote"
                    .to_string(),
            ));
        }
        if self.max_record_bytes == 0 {
            return Err(Error::InvalidInput(
                "max_record_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// How many accepted records an [`crate::IngestionReport`] keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordRetention {
    /// Keep every accepted record.
    #[default]
    All,
    /// Keep the first `n` accepted records.
    Sample(usize),
    /// Keep none; only counts are reported.
    CountOnly,
}

impl RecordRetention {
    /// Whether a record should be kept given how many are already kept.
    #[must_use]
    pub const fn keeps(&self, already_kept: usize) -> bool {
        match self {
            Self::All => true,
            Self::Sample(n) => already_kept < *n,
            Self::CountOnly => false,
        }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Input dialect.
    pub dialect: CsvDialect,
    /// Abort once more than this many errors are recorded.
    pub max_errors: Option<usize>,
    /// Accepted record retention policy.
    pub retention: RecordRetention,
    /// Decode worker threads (1 = sequential).
    pub workers: usize,
    /// Rows per parallel decode batch.
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dialect: CsvDialect::default(),
            max_errors: None,
            retention: RecordRetention::All,
            workers: 1,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl IngestConfig {
    /// Sets the dialect.
    #[must_use]
    pub fn with_dialect(mut self, dialect: CsvDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Sets the error threshold.
    #[must_use]
    pub const fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = Some(max_errors);
        self
    }

    /// Sets the retention policy.
    #[must_use]
    pub const fn with_retention(mut self, retention: RecordRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the decode worker count.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the parallel batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Validates the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid dialect or zero
    /// workers/batch size.
    pub fn validate(&self) -> Result<()> {
        self.dialect.validate()?;
        if self.workers == 0 || self.batch_size == 0 {
            return Err(Error::InvalidInput(
                "workers and batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Export settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Quote byte.
    pub quote: u8,
    /// Escape convention.
    pub escape: Escape,
    /// Whether a header row is written first.
    pub has_header: bool,
    /// Null representation of the reading side; text equal to it is quoted.
    pub null_value: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::from(&CsvDialect::default())
    }
}

impl From<&CsvDialect> for ExportConfig {
    fn from(dialect: &CsvDialect) -> Self {
        Self {
            delimiter: dialect.delimiter,
            quote: dialect.quote,
            escape: dialect.escape,
            has_header: dialect.has_header,
            null_value: dialect.null_value.clone(),
        }
    }
}

impl ExportConfig {
    /// Sets whether a header row is written.
    #[must_use]
    pub const fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Sets the field delimiter.
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Validates the export bytes with the same rules as input dialects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unusable delimiter/quote bytes.
    pub fn validate(&self) -> Result<()> {
        self.reading_dialect().validate()
    }

    /// Returns the input dialect that reads this export back.
    #[must_use]
    pub fn reading_dialect(&self) -> CsvDialect {
        CsvDialect {
            delimiter: self.delimiter,
            quote: self.quote,
            escape: self.escape,
            has_header: self.has_header,
            null_value: self.null_value.clone(),
            ..CsvDialect::default()
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `csvgate=debug`.
    pub filter: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Main configuration for csvgate.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Ingestion settings.
    pub ingest: IngestConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Dialect section.
    pub dialect: Option<ConfigFileDialect>,
    /// Ingest section.
    pub ingest: Option<ConfigFileIngest>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Dialect section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileDialect {
    /// Delimiter character.
    pub delimiter: Option<String>,
    /// Quote character.
    pub quote: Option<String>,
    /// Escape convention.
    pub escape: Option<Escape>,
    /// Header flag.
    pub has_header: Option<bool>,
    /// Blank line handling.
    pub skip_empty_lines: Option<bool>,
    /// Null representation.
    pub null_value: Option<String>,
    /// Trim unquoted fields.
    pub trim: Option<bool>,
    /// Per-record byte limit.
    pub max_record_bytes: Option<usize>,
}

/// Ingest section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileIngest {
    /// Error threshold.
    pub max_errors: Option<usize>,
    /// Retention policy.
    pub retention: Option<RecordRetention>,
    /// Decode workers.
    pub workers: Option<usize>,
    /// Parallel batch size.
    pub batch_size: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive.
    pub filter: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl AppConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or describes an
    /// invalid dialect.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`<config_dir>/csvgate/config.toml`)
    /// 2. XDG config dir (`~/.config/csvgate/config.toml`)
    ///
    /// Returns default configuration if no readable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("csvgate").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("csvgate")
                .join("config.toml"),
        ];

        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Applies `CSVGATE_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an override has an invalid value.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Recognized keys: `CSVGATE_DELIMITER`, `CSVGATE_MAX_ERRORS`,
    /// `CSVGATE_LOG_FORMAT`, `CSVGATE_LOG_FILE`. Blank values are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if an override has an invalid value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(delimiter) = get("CSVGATE_DELIMITER") {
            self.ingest.dialect.delimiter = parse_dialect_char("CSVGATE_DELIMITER", &delimiter)?;
        }
        if let Some(max_errors) = get("CSVGATE_MAX_ERRORS") {
            let parsed = max_errors.trim().parse::<usize>().map_err(|e| {
                Error::InvalidInput(format!("CSVGATE_MAX_ERRORS '{max_errors}': {e}"))
            })?;
            self.ingest.max_errors = Some(parsed);
        }
        if let Some(format) = get("CSVGATE_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&format)?;
        }
        if let Some(file) = get("CSVGATE_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }

        self.ingest.validate()
    }

    /// Converts a `ConfigFile` to `AppConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dialect) = file.dialect {
            let target = &mut config.ingest.dialect;
            if let Some(delimiter) = dialect.delimiter {
                target.delimiter = parse_dialect_char("delimiter", &delimiter)?;
            }
            if let Some(quote) = dialect.quote {
                target.quote = parse_dialect_char("quote", &quote)?;
            }
            if let Some(escape) = dialect.escape {
                target.escape = escape;
            }
            if let Some(v) = dialect.has_header {
                target.has_header = v;
            }
            if let Some(v) = dialect.skip_empty_lines {
                target.skip_empty_lines = v;
            }
            if let Some(v) = dialect.null_value {
                target.null_value = v;
            }
            if let Some(v) = dialect.trim {
                target.trim = v;
            }
            if let Some(v) = dialect.max_record_bytes {
                target.max_record_bytes = v;
            }
        }
        if let Some(ingest) = file.ingest {
            config.ingest.max_errors = ingest.max_errors;
            if let Some(retention) = ingest.retention {
                config.ingest.retention = retention;
            }
            if let Some(workers) = ingest.workers {
                config.ingest.workers = workers;
            }
            if let Some(batch_size) = ingest.batch_size {
                config.ingest.batch_size = batch_size;
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format)?;
            }
            config.logging.filter = logging.filter;
            config.logging.file = logging.file.map(PathBuf::from);
        }

        config.ingest.validate()?;
        Ok(config)
    }
}

/// Parses a one-character dialect setting.
///
/// Accepts a literal character or the escapes `\t` and `tab`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] unless the value is exactly one ASCII
/// character.
pub fn parse_dialect_char(name: &str, value: &str) -> Result<u8> {
    match value {
        "\\t" | "tab" => return Ok(b'\t'),
        _ => {},
    }
    match value.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a single ASCII character, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_dialect_is_rfc_style() {
        let dialect = CsvDialect::default();
        assert_eq!(dialect.delimiter, b',');
        assert_eq!(dialect.quote, b'"');
        assert_eq!(dialect.escape, Escape::Doubled);
        assert!(dialect.has_header);
        assert!(dialect.validate().is_ok());
    }

    #[test]
    fn test_dialect_validation() {
        assert!(CsvDialect::default().with_quote(b',').validate().is_err());
        assert!(CsvDialect::default().with_delimiter(b'\n').validate().is_err());
        assert!(
            CsvDialect::default()
                .with_delimiter(b'\\')
                .with_escape(Escape::Backslash)
                .validate()
                .is_err()
        );
        assert!(
            CsvDialect::default()
                .with_max_record_bytes(0)
                .validate()
                .is_err()
        );
        assert!(CsvDialect::tsv().validate().is_ok());
    }

    #[test]
    fn test_retention_keeps() {
        assert!(RecordRetention::All.keeps(1_000_000));
        assert!(RecordRetention::Sample(2).keeps(1));
        assert!(!RecordRetention::Sample(2).keeps(2));
        assert!(!RecordRetention::CountOnly.keeps(0));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[dialect]
delimiter = ";"
escape = "backslash"
null_value = "NULL"

[ingest]
max_errors = 25
retention = { sample = 10 }
workers = 4

[logging]
format = "json"
filter = "csvgate=debug"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.ingest.dialect.delimiter, b';');
        assert_eq!(config.ingest.dialect.escape, Escape::Backslash);
        assert_eq!(config.ingest.dialect.null_value, "NULL");
        assert_eq!(config.ingest.max_errors, Some(25));
        assert_eq!(config.ingest.retention, RecordRetention::Sample(10));
        assert_eq!(config.ingest.workers, 4);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter.as_deref(), Some("csvgate=debug"));
    }

    #[test]
    fn test_load_rejects_bad_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dialect]\ndelimiter = \";;\"\n").unwrap();
        assert!(AppConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dialect]\ndelimeter = \";\"\n").unwrap();
        assert!(AppConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CSVGATE_DELIMITER", "tab"),
            ("CSVGATE_MAX_ERRORS", "3"),
            ("CSVGATE_LOG_FORMAT", "json"),
            ("CSVGATE_LOG_FILE", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::new();
        config
            .apply_overrides(|key| vars.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.ingest.dialect.delimiter, b'\t');
        assert_eq!(config.ingest.max_errors, Some(3));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_overrides_reject_garbage() {
        let mut config = AppConfig::new();
        let result = config.apply_overrides(|key| {
            (key == "CSVGATE_MAX_ERRORS").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_export_config_reads_back() {
        let dialect = CsvDialect::default()
            .with_delimiter(b'|')
            .with_escape(Escape::Backslash);
        let export = ExportConfig::from(&dialect).with_header(false);
        let back = export.reading_dialect();
        assert_eq!(back.delimiter, b'|');
        assert_eq!(back.escape, Escape::Backslash);
        assert!(!back.has_header);
    }
}
