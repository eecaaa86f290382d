//! Streaming CSV record parser.
//!
//! [`StreamingParser`] reads one record at a time from any [`BufRead`],
//! holding at most one record (bounded by
//! [`CsvDialect::max_record_bytes`]) in memory. Malformed records are yielded
//! as [`ParsedRecord::Malformed`] so a single bad row never ends the stream.
//!
//! # Recovery
//!
//! | Problem | Kind | Resumes at |
//! |---------|------|------------|
//! | Quote still open at end of input | `UNTERMINATED_QUOTE` | line after the record's first line |
//! | Text after a closing quote | `MALFORMED_QUOTE` | next line |
//! | Record over the byte limit | `RECORD_TOO_LARGE` | next line |
//! | Invalid UTF-8 | `INVALID_ENCODING` | next record |
//! | Wrong number of fields | `FIELD_COUNT_MISMATCH` | next record |
//!
//! A quote byte inside an unquoted field is kept literally.

use crate::config::{CsvDialect, Escape};
use crate::models::{ErrorKind, RawField, RawRow, ValidationError};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::io::{self, BufRead};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// One item produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRecord {
    /// A well-formed record.
    Row(RawRow),
    /// A record that failed structurally, as a row-scoped error.
    Malformed(ValidationError),
}

impl ParsedRecord {
    /// 1-based data row ordinal of the record.
    #[must_use]
    pub const fn row(&self) -> u64 {
        match self {
            Self::Row(raw) => raw.row(),
            Self::Malformed(err) => err.row,
        }
    }
}

/// Result of reading the header record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderRecord {
    /// No header configured, or the input is empty.
    Absent,
    /// Header names, trimmed, in input order.
    Names(Vec<String>),
    /// The header record was structurally broken.
    Malformed(ValidationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    Escaped,
    QuoteSeen,
    AfterQuote,
}

enum Scan {
    Eof,
    Blank,
    Fields(Vec<RawField>),
    Broken { kind: ErrorKind, detail: String },
}

#[derive(Default)]
struct RecordBuf {
    raw: Vec<u8>,
    fields: Vec<(Vec<u8>, bool)>,
    field: Vec<u8>,
    quoted: bool,
    first_break: Option<usize>,
}

impl RecordBuf {
    fn end_field(&mut self, trim: bool) {
        let mut text = std::mem::take(&mut self.field);
        if trim && !self.quoted {
            text = trim_blanks(&text).to_vec();
        }
        self.fields.push((text, self.quoted));
        self.quoted = false;
    }

    fn finish(mut self, trim: bool) -> Scan {
        self.end_field(trim);
        let mut fields = Vec::with_capacity(self.fields.len());
        for (index, (bytes, quoted)) in self.fields.into_iter().enumerate() {
            match String::from_utf8(bytes) {
                Ok(text) => fields.push(RawField::new(text, quoted)),
                Err(e) => {
                    return Scan::Broken {
                        kind: ErrorKind::InvalidEncoding,
                        detail: format!(
                            "field {} is not valid UTF-8 (byte offset {})",
                            index + 1,
                            e.utf8_error().valid_up_to()
                        ),
                    };
                },
            }
        }
        Scan::Fields(fields)
    }
}

fn trim_blanks(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !is_blank(*b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_blank(*b)).map_or(start, |i| i + 1);
    &bytes[start..end]
}

const fn is_blank(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

const fn is_break(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

/// Lazy, single-pass CSV record reader.
///
/// Yields `Result<ParsedRecord>`; an `Err` is an I/O failure of the
/// underlying reader and ends iteration.
pub struct StreamingParser<R> {
    reader: R,
    dialect: CsvDialect,
    replay: VecDeque<u8>,
    line: u64,
    row: u64,
    header: Option<HeaderRecord>,
    expected_fields: Option<usize>,
    bom_checked: bool,
    finished: bool,
}

impl<R: BufRead> StreamingParser<R> {
    /// Creates a parser over `reader`.
    pub const fn new(reader: R, dialect: CsvDialect) -> Self {
        Self {
            reader,
            dialect,
            replay: VecDeque::new(),
            line: 1,
            row: 0,
            header: None,
            expected_fields: None,
            bom_checked: false,
            finished: false,
        }
    }

    /// Requires every data row to have exactly `count` fields.
    ///
    /// A header, when present, overrides this with its own width.
    #[must_use]
    pub const fn with_expected_fields(mut self, count: usize) -> Self {
        self.expected_fields = Some(count);
        self
    }

    /// The dialect in use.
    pub const fn dialect(&self) -> &CsvDialect {
        &self.dialect
    }

    /// Number of data rows yielded so far.
    pub const fn rows_read(&self) -> u64 {
        self.row
    }

    /// Reads the header record if the dialect has one.
    ///
    /// Leading blank lines are skipped. Repeated calls return the same
    /// result without reading further.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reader fails.
    pub fn read_header(&mut self) -> Result<HeaderRecord> {
        if let Some(header) = &self.header {
            return Ok(header.clone());
        }
        let header = if self.dialect.has_header {
            self.scan_header()?
        } else {
            HeaderRecord::Absent
        };
        if let HeaderRecord::Names(names) = &header {
            self.expected_fields = Some(names.len());
        }
        self.header = Some(header.clone());
        Ok(header)
    }

    fn scan_header(&mut self) -> Result<HeaderRecord> {
        loop {
            let line = self.line;
            match self.scan()? {
                Scan::Eof => return Ok(HeaderRecord::Absent),
                Scan::Blank => {},
                Scan::Fields(fields) => {
                    return Ok(HeaderRecord::Names(
                        fields.iter().map(|f| f.text().trim().to_string()).collect(),
                    ));
                },
                Scan::Broken { kind, detail } => {
                    return Ok(HeaderRecord::Malformed(ValidationError::structural(
                        0, line, kind, detail,
                    )));
                },
            }
        }
    }

    /// Reads the next data record.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reader fails.
    pub fn next_record(&mut self) -> Result<Option<ParsedRecord>> {
        if let HeaderRecord::Malformed(_) = self.read_header()? {
            return Ok(None);
        }
        loop {
            let line = self.line;
            let fields = match self.scan()? {
                Scan::Eof => return Ok(None),
                Scan::Blank if self.dialect.skip_empty_lines => continue,
                Scan::Blank => vec![RawField::plain("")],
                Scan::Fields(fields) => fields,
                Scan::Broken { kind, detail } => {
                    self.row += 1;
                    return Ok(Some(ParsedRecord::Malformed(ValidationError::structural(
                        self.row, line, kind, detail,
                    ))));
                },
            };
            self.row += 1;
            if let Some(expected) = self.expected_fields.filter(|n| *n != fields.len()) {
                return Ok(Some(ParsedRecord::Malformed(ValidationError::structural(
                    self.row,
                    line,
                    ErrorKind::FieldCountMismatch,
                    format!("expected {expected} fields, found {}", fields.len()),
                ))));
            }
            return Ok(Some(ParsedRecord::Row(RawRow::new(self.row, line, fields))));
        }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        if let Some(&byte) = self.replay.front() {
            return Ok(Some(byte));
        }
        loop {
            match self.reader.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::io("read_input", &e)),
            }
        }
    }

    fn bump(&mut self) {
        if self.replay.pop_front().is_none() {
            self.reader.consume(1);
        }
    }

    fn skip_bom(&mut self) -> Result<()> {
        self.bom_checked = true;
        let has_bom = loop {
            match self.reader.fill_buf() {
                Ok(buf) => break buf.starts_with(&UTF8_BOM),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::io("read_input", &e)),
            }
        };
        if has_bom {
            self.reader.consume(UTF8_BOM.len());
        }
        Ok(())
    }

    /// Consumes the `\n` of a `\r\n` pair, if present, and counts the line.
    fn end_line(&mut self, byte: u8, rec: &mut RecordBuf) -> Result<()> {
        if byte == b'\r' && self.peek()? == Some(b'\n') {
            self.bump();
            rec.raw.push(b'\n');
        }
        self.line += 1;
        Ok(())
    }

    fn quoted_byte(&mut self, byte: u8, rec: &mut RecordBuf) -> Result<()> {
        rec.field.push(byte);
        if is_break(byte) {
            let before = rec.raw.len();
            self.end_line(byte, rec)?;
            if rec.raw.len() > before {
                rec.field.push(b'\n');
            }
            if rec.first_break.is_none() {
                rec.first_break = Some(rec.raw.len());
            }
        }
        Ok(())
    }

    /// Skips the rest of the current physical line.
    fn discard_line(&mut self) -> Result<()> {
        while let Some(byte) = self.peek()? {
            self.bump();
            if is_break(byte) {
                if byte == b'\r' && self.peek()? == Some(b'\n') {
                    self.bump();
                }
                self.line += 1;
                break;
            }
        }
        Ok(())
    }

    /// Re-queues the bytes a broken record swallowed after its first line.
    ///
    /// Returns `false` if the record never crossed a line break.
    fn replay_after_first_line(&mut self, rec: &RecordBuf, start_line: u64) -> bool {
        let Some(offset) = rec.first_break else {
            return false;
        };
        let pending: Vec<u8> = self.replay.drain(..).collect();
        self.replay.extend(&rec.raw[offset..]);
        self.replay.extend(pending);
        self.line = start_line + 1;
        true
    }

    fn unterminated(&mut self, rec: &RecordBuf, start_line: u64) -> Scan {
        self.replay_after_first_line(rec, start_line);
        Scan::Broken {
            kind: ErrorKind::UnterminatedQuote,
            detail: "quoted field is never closed".to_string(),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn scan(&mut self) -> Result<Scan> {
        if self.finished {
            return Ok(Scan::Eof);
        }
        if !self.bom_checked {
            self.skip_bom()?;
        }

        let start_line = self.line;
        let CsvDialect {
            delimiter,
            quote,
            escape,
            trim,
            max_record_bytes,
            ..
        } = self.dialect;
        let backslash = escape == Escape::Backslash;
        let mut rec = RecordBuf::default();
        let mut state = State::FieldStart;

        loop {
            let Some(byte) = self.peek()? else {
                return Ok(match state {
                    State::Quoted | State::Escaped => self.unterminated(&rec, start_line),
                    _ if rec.raw.is_empty() => Scan::Eof,
                    _ => rec.finish(trim),
                });
            };
            self.bump();
            rec.raw.push(byte);

            let in_quotes = matches!(state, State::Quoted | State::Escaped);
            if rec.raw.len() > max_record_bytes && (in_quotes || !is_break(byte)) {
                // Lines swallowed by an open quote are parsed again.
                let replayed = in_quotes && self.replay_after_first_line(&rec, start_line);
                if !replayed {
                    if is_break(byte) {
                        let mut scratch = RecordBuf::default();
                        self.end_line(byte, &mut scratch)?;
                    } else {
                        self.discard_line()?;
                    }
                }
                return Ok(Scan::Broken {
                    kind: ErrorKind::RecordTooLarge,
                    detail: format!("record exceeds {max_record_bytes} bytes"),
                });
            }

            match state {
                State::FieldStart => {
                    if byte == quote {
                        rec.quoted = true;
                        state = State::Quoted;
                    } else if byte == delimiter {
                        rec.end_field(trim);
                    } else if is_break(byte) {
                        let blank = rec.raw.len() == 1;
                        self.end_line(byte, &mut rec)?;
                        return Ok(if blank { Scan::Blank } else { rec.finish(trim) });
                    } else if !(trim && is_blank(byte)) {
                        rec.field.push(byte);
                        state = State::Unquoted;
                    }
                },
                State::Unquoted => {
                    if byte == delimiter {
                        rec.end_field(trim);
                        state = State::FieldStart;
                    } else if is_break(byte) {
                        self.end_line(byte, &mut rec)?;
                        return Ok(rec.finish(trim));
                    } else {
                        rec.field.push(byte);
                    }
                },
                State::Quoted => {
                    if byte == quote {
                        state = State::QuoteSeen;
                    } else if backslash && byte == b'\\' {
                        state = State::Escaped;
                    } else {
                        self.quoted_byte(byte, &mut rec)?;
                    }
                },
                State::Escaped => {
                    self.quoted_byte(byte, &mut rec)?;
                    state = State::Quoted;
                },
                State::QuoteSeen | State::AfterQuote => {
                    if byte == quote && state == State::QuoteSeen {
                        rec.field.push(quote);
                        state = State::Quoted;
                    } else if byte == delimiter {
                        rec.end_field(trim);
                        state = State::FieldStart;
                    } else if is_break(byte) {
                        self.end_line(byte, &mut rec)?;
                        return Ok(rec.finish(trim));
                    } else if trim && is_blank(byte) {
                        state = State::AfterQuote;
                    } else {
                        self.discard_line()?;
                        return Ok(Scan::Broken {
                            kind: ErrorKind::MalformedQuote,
                            detail: format!(
                                "unexpected {:?} after closing quote",
                                char::from(byte)
                            ),
                        });
                    }
                },
            }
        }
    }
}

impl<R: BufRead> Iterator for StreamingParser<R> {
    type Item = Result<ParsedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            },
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Read};

    fn parse_with(input: &[u8], dialect: CsvDialect) -> (HeaderRecord, Vec<ParsedRecord>) {
        let mut parser = StreamingParser::new(input, dialect);
        let header = parser.read_header().unwrap();
        let records = parser.collect::<Result<Vec<_>>>().unwrap();
        (header, records)
    }

    fn parse(input: &str) -> Vec<ParsedRecord> {
        parse_with(input.as_bytes(), CsvDialect::default()).1
    }

    fn texts(record: &ParsedRecord) -> Vec<&str> {
        match record {
            ParsedRecord::Row(raw) => raw.fields().iter().map(RawField::text).collect(),
            ParsedRecord::Malformed(err) => panic!("expected row, got {err}"),
        }
    }

    fn kind(record: &ParsedRecord) -> ErrorKind {
        match record {
            ParsedRecord::Malformed(err) => err.kind,
            ParsedRecord::Row(raw) => panic!("expected error, got row {}", raw.row()),
        }
    }

    #[test]
    fn test_simple_rows_with_header() {
        let (header, records) = parse_with(b"a,b\n1,2\n3,4\n", CsvDialect::default());
        assert_eq!(
            header,
            HeaderRecord::Names(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(records.len(), 2);
        assert_eq!(texts(&records[0]), vec!["1", "2"]);
        assert_eq!(texts(&records[1]), vec!["3", "4"]);
        assert_eq!(records[1].row(), 2);
    }

    #[test]
    fn test_quoted_delimiters_and_newlines() {
        let records = parse("a,b\n\"x,y\",\"line1\nline2\"\n5,6\n");
        assert_eq!(texts(&records[0]), vec!["x,y", "line1\nline2"]);
        match &records[1] {
            ParsedRecord::Row(raw) => assert_eq!(raw.line(), 4),
            ParsedRecord::Malformed(err) => panic!("{err}"),
        }
    }

    #[test]
    fn test_doubled_quote_escape() {
        let records = parse("a\n\"say \"\"hi\"\"\"\n");
        assert_eq!(texts(&records[0]), vec!["say \"hi\""]);
    }

    #[test]
    fn test_backslash_escape() {
        let dialect = CsvDialect::default().with_escape(Escape::Backslash);
        let (_, records) = parse_with(b"a,b\n\"say \\\"hi\\\"\",\"c:\\\\tmp\"\n", dialect);
        assert_eq!(texts(&records[0]), vec!["say \"hi\"", "c:\\tmp"]);
    }

    #[test]
    fn test_quoted_flag_is_kept() {
        let records = parse("a,b\n\"\",\n");
        let ParsedRecord::Row(raw) = &records[0] else {
            panic!("expected row");
        };
        assert!(raw.fields()[0].is_quoted());
        assert!(!raw.fields()[1].is_quoted());
    }

    #[test]
    fn test_crlf_and_bare_cr_line_endings() {
        let records = parse("a,b\r\n1,2\r\n3,4\r5,6");
        assert_eq!(records.len(), 3);
        assert_eq!(texts(&records[2]), vec!["5", "6"]);
        let ParsedRecord::Row(raw) = &records[2] else {
            panic!("expected row");
        };
        assert_eq!(raw.line(), 4);
    }

    #[test]
    fn test_empty_lines_skipped_by_default() {
        let records = parse("a\n\n1\n\n\n2\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].row(), 2);
    }

    #[test]
    fn test_empty_lines_kept_when_configured() {
        let dialect = CsvDialect::default().with_skip_empty_lines(false);
        let (_, records) = parse_with(b"a\n1\n\n2\n", dialect);
        assert_eq!(records.len(), 3);
        assert_eq!(texts(&records[1]), vec![""]);
    }

    #[test]
    fn test_unterminated_quote_recovers_following_rows() {
        let records = parse("id,name\n1,\"Alice\n2,Bob\n3,Carol\n");
        assert_eq!(records.len(), 3);
        assert_eq!(kind(&records[0]), ErrorKind::UnterminatedQuote);
        let ParsedRecord::Malformed(err) = &records[0] else {
            panic!("expected error");
        };
        assert_eq!(err.line, 2);
        assert_eq!(texts(&records[1]), vec!["2", "Bob"]);
        assert_eq!(texts(&records[2]), vec!["3", "Carol"]);
        let ParsedRecord::Row(raw) = &records[2] else {
            panic!("expected row");
        };
        assert_eq!(raw.line(), 4);
        assert_eq!(raw.row(), 3);
    }

    #[test]
    fn test_unterminated_quote_on_last_line() {
        let records = parse("a\n\"open");
        assert_eq!(records.len(), 1);
        assert_eq!(kind(&records[0]), ErrorKind::UnterminatedQuote);
    }

    #[test]
    fn test_malformed_quote_skips_to_next_line() {
        let records = parse("a,b\n\"x\"y,2\n3,4\n");
        assert_eq!(records.len(), 2);
        assert_eq!(kind(&records[0]), ErrorKind::MalformedQuote);
        assert_eq!(texts(&records[1]), vec!["3", "4"]);
    }

    #[test]
    fn test_quote_inside_unquoted_field_is_literal() {
        let records = parse("a\nab\"c\n");
        assert_eq!(texts(&records[0]), vec!["ab\"c"]);
    }

    #[test]
    fn test_field_count_mismatch_is_row_scoped() {
        let records = parse("a,b\n1\n1,2,3\n4,5\n");
        assert_eq!(kind(&records[0]), ErrorKind::FieldCountMismatch);
        assert_eq!(kind(&records[1]), ErrorKind::FieldCountMismatch);
        assert_eq!(texts(&records[2]), vec!["4", "5"]);
    }

    #[test]
    fn test_headerless_uses_expected_fields() {
        let dialect = CsvDialect::default().with_header(false);
        let mut parser = StreamingParser::new(&b"1,2\n3\n"[..], dialect).with_expected_fields(2);
        assert_eq!(parser.read_header().unwrap(), HeaderRecord::Absent);
        let records = parser.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(texts(&records[0]), vec!["1", "2"]);
        assert_eq!(kind(&records[1]), ErrorKind::FieldCountMismatch);
    }

    #[test]
    fn test_record_too_large_resumes() {
        let dialect = CsvDialect::default().with_max_record_bytes(8);
        let (_, records) = parse_with(b"a\nshort\nwaytoolongvalue\nok\n", dialect);
        assert_eq!(records.len(), 3);
        assert_eq!(texts(&records[0]), vec!["short"]);
        assert_eq!(kind(&records[1]), ErrorKind::RecordTooLarge);
        assert_eq!(texts(&records[2]), vec!["ok"]);
    }

    #[test]
    fn test_oversized_open_quote_replays_following_lines() {
        let dialect = CsvDialect::default().with_max_record_bytes(16);
        let (_, records) = parse_with(b"a,b\n1,\"open\n2,x\n3,y\n4,z\n5,w\n", dialect);
        assert_eq!(records.len(), 5);
        let ParsedRecord::Malformed(err) = &records[0] else {
            panic!("expected error");
        };
        assert_eq!(err.kind, ErrorKind::RecordTooLarge);
        assert_eq!(err.line, 2);
        assert_eq!(texts(&records[1]), vec!["2", "x"]);
        assert_eq!(texts(&records[4]), vec!["5", "w"]);
        let ParsedRecord::Row(raw) = &records[4] else {
            panic!("expected row");
        };
        assert_eq!(raw.line(), 6);
        assert_eq!(raw.row(), 5);
    }

    #[test]
    fn test_invalid_utf8_is_structural() {
        let (_, records) = parse_with(b"a\n\xff\xfe\nok\n", CsvDialect::default());
        assert_eq!(kind(&records[0]), ErrorKind::InvalidEncoding);
        assert_eq!(texts(&records[1]), vec!["ok"]);
    }

    #[test]
    fn test_bom_is_skipped() {
        let (header, _) = parse_with(b"\xEF\xBB\xBFid\n1\n", CsvDialect::default());
        assert_eq!(header, HeaderRecord::Names(vec!["id".to_string()]));
    }

    #[test]
    fn test_trim_unquoted_fields() {
        let dialect = CsvDialect::default().with_trim(true);
        let (_, records) = parse_with(b"a,b\n  x  , \" y \" \n", dialect);
        assert_eq!(texts(&records[0]), vec!["x", " y "]);
    }

    #[test]
    fn test_custom_delimiter_and_quote() {
        let dialect = CsvDialect::default()
            .with_delimiter(b';')
            .with_quote(b'\'');
        let (_, records) = parse_with(b"a;b\n'x;y';2\n", dialect);
        assert_eq!(texts(&records[0]), vec!["x;y", "2"]);
    }

    #[test]
    fn test_malformed_header_ends_stream() {
        let mut parser = StreamingParser::new(&b"\"a,b\n1,2\n"[..], CsvDialect::default());
        assert!(matches!(
            parser.read_header().unwrap(),
            HeaderRecord::Malformed(_)
        ));
        assert!(parser.next().is_none());
    }

    #[test]
    fn test_empty_input() {
        let (header, records) = parse_with(b"", CsvDialect::default());
        assert_eq!(header, HeaderRecord::Absent);
        assert!(records.is_empty());
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::other("disk on fire"));
            }
            self.served = true;
            let data = b"a\n1\n";
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    #[test]
    fn test_io_error_ends_iteration() {
        let reader = BufReader::new(FailingReader { served: false });
        let mut parser = StreamingParser::new(reader, CsvDialect::default());
        assert!(matches!(parser.next(), Some(Ok(ParsedRecord::Row(_)))));
        assert!(matches!(parser.next(), Some(Err(Error::OperationFailed { .. }))));
        assert!(parser.next().is_none());
    }
}
