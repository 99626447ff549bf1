use crate::error::Result;
use crate::models::Column;
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const CHUNK_SIZE: usize = 8 * 1024;

/// Delimiter, quoting and escaping rules for a CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvDialect {
    pub delimiter: u8,
    pub quote: u8,
    pub escape: Option<u8>,
    pub skip_leading_space: bool,
    /// Only consulted for positional rows; keyed rows always read a header.
    pub has_header: bool,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            escape: Some(b'\\'),
            skip_leading_space: true,
            has_header: false,
        }
    }
}

/// Row layout, chosen by the job's column references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    Positional,
    Keyed,
}

impl RowShape {
    /// `Keyed` if any column is referenced by header name. Callers reject mixed references.
    pub fn for_columns<'a>(columns: impl IntoIterator<Item = &'a Column>) -> Self {
        if columns.into_iter().any(|c| matches!(c, Column::Name(_))) {
            RowShape::Keyed
        } else {
            RowShape::Positional
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Positional(Vec<String>),
    Keyed(HashMap<String, String>),
}

impl Row {
    pub fn get(&self, column: &Column) -> Option<&str> {
        match (self, column) {
            (Row::Positional(fields), Column::Index(i)) => fields.get(*i).map(String::as_str),
            (Row::Keyed(fields), Column::Name(name)) => fields.get(name).map(String::as_str),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Row::Positional(fields) => fields.len(),
            Row::Keyed(fields) => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A CSV file that can be read from the start any number of times.
#[derive(Debug, Clone)]
pub struct RecordSource {
    path: PathBuf,
    dialect: CsvDialect,
    shape: RowShape,
}

impl RecordSource {
    pub fn new(path: impl AsRef<Path>, dialect: CsvDialect, shape: RowShape) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            dialect,
            shape,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shape(&self) -> RowShape {
        self.shape
    }

    /// Open the file and return a lazy iterator over its rows. Each call starts over.
    pub fn rows(&self) -> Result<Rows> {
        let has_headers = match self.shape {
            RowShape::Keyed => true,
            RowShape::Positional => self.dialect.has_header,
        };
        let file = File::open(&self.path)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(self.dialect.delimiter)
            .quote(self.dialect.quote)
            .escape(None)
            .double_quote(true)
            .has_headers(has_headers)
            .flexible(true)
            .from_reader(DialectReader::new(file, &self.dialect));

        let headers = match self.shape {
            RowShape::Keyed => Some(reader.headers()?.iter().map(str::to_string).collect()),
            RowShape::Positional => None,
        };

        Ok(Rows {
            records: reader.into_records(),
            headers,
        })
    }
}

pub struct Rows {
    records: StringRecordsIntoIter<DialectReader<File>>,
    headers: Option<Vec<String>>,
}

impl Rows {
    fn to_row(&self, record: &StringRecord) -> Row {
        let fields = record.iter().map(str::to_string);
        match &self.headers {
            Some(headers) => Row::Keyed(headers.iter().cloned().zip(fields).collect()),
            None => Row::Positional(fields.collect()),
        }
    }
}

impl Iterator for Rows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(record.map(|r| self.to_row(&r)).map_err(Into::into))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    StartField,
    InField,
    Escaped,
    InQuoted,
    EscapedInQuoted,
    QuoteInQuoted,
}

/// Rewrites the dialect's escapes and leading spaces into plain RFC 4180 for `csv::Reader`.
///
/// Spaces right after a delimiter are dropped outside quotes, and an escape byte makes the
/// next byte literal both inside and outside quotes. Each field is re-emitted unquoted when
/// that is unambiguous and quoted with doubled quotes otherwise.
struct DialectReader<R> {
    inner: R,
    delimiter: u8,
    quote: u8,
    escape: Option<u8>,
    skip_leading_space: bool,
    state: ScanState,
    field: Vec<u8>,
    quoted: bool,
    pending: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> DialectReader<R> {
    fn new(inner: R, dialect: &CsvDialect) -> Self {
        Self {
            inner,
            delimiter: dialect.delimiter,
            quote: dialect.quote,
            escape: dialect.escape,
            skip_leading_space: dialect.skip_leading_space,
            state: ScanState::StartField,
            field: Vec::new(),
            quoted: false,
            pending: Vec::with_capacity(CHUNK_SIZE * 2),
            pos: 0,
            eof: false,
        }
    }

    fn scan(&mut self, b: u8) {
        let is_newline = b == b'\n' || b == b'\r';
        match self.state {
            ScanState::StartField if b == b' ' && self.skip_leading_space => {}
            ScanState::StartField if b == self.quote => {
                self.quoted = true;
                self.state = ScanState::InQuoted;
            }
            ScanState::StartField | ScanState::InField => {
                if b == self.delimiter {
                    self.end_field();
                    self.pending.push(self.delimiter);
                } else if is_newline {
                    self.end_record();
                } else if Some(b) == self.escape {
                    self.state = ScanState::Escaped;
                } else {
                    self.field.push(b);
                    self.state = ScanState::InField;
                }
            }
            ScanState::Escaped => {
                self.field.push(b);
                self.state = ScanState::InField;
            }
            ScanState::InQuoted => {
                if Some(b) == self.escape {
                    self.state = ScanState::EscapedInQuoted;
                } else if b == self.quote {
                    self.state = ScanState::QuoteInQuoted;
                } else {
                    self.field.push(b);
                }
            }
            ScanState::EscapedInQuoted => {
                self.field.push(b);
                self.state = ScanState::InQuoted;
            }
            ScanState::QuoteInQuoted => {
                if b == self.quote {
                    self.field.push(b);
                    self.state = ScanState::InQuoted;
                } else if b == self.delimiter {
                    self.end_field();
                    self.pending.push(self.delimiter);
                } else if is_newline {
                    self.end_record();
                } else {
                    self.field.push(b);
                    self.state = ScanState::InField;
                }
            }
        }
    }

    fn end_field(&mut self) {
        let needs_quotes = self.quoted
            || self
                .field
                .iter()
                .any(|&c| c == self.delimiter || c == self.quote || c == b'\n' || c == b'\r');
        if needs_quotes {
            self.pending.push(self.quote);
            for &c in &self.field {
                if c == self.quote {
                    self.pending.push(c);
                }
                self.pending.push(c);
            }
            self.pending.push(self.quote);
        } else {
            self.pending.extend_from_slice(&self.field);
        }
        self.field.clear();
        self.quoted = false;
        self.state = ScanState::StartField;
    }

    fn end_record(&mut self) {
        self.end_field();
        self.pending.push(b'\n');
    }

    fn fill(&mut self) -> io::Result<()> {
        self.pending.clear();
        self.pos = 0;
        let mut chunk = [0u8; CHUNK_SIZE];
        while self.pending.is_empty() && !self.eof {
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
                if self.state != ScanState::StartField || !self.field.is_empty() || self.quoted {
                    self.end_field();
                }
            } else {
                for &b in &chunk[..n] {
                    self.scan(b);
                }
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for DialectReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.pending.len() {
            self.fill()?;
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(content.as_bytes()).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    fn positional(tmp: &NamedTempFile) -> RecordSource {
        RecordSource::new(tmp.path(), CsvDialect::default(), RowShape::Positional)
    }

    #[test]
    fn reads_positional_rows_without_header() {
        let tmp = csv_file("1,Alice,30\n2,Bob,25\n");
        let rows: Vec<Row> = positional(&tmp).rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(&Column::Index(1)), Some("Alice"));
        assert_eq!(rows[1].get(&Column::Index(2)), Some("25"));
        assert_eq!(rows[1].get(&Column::Index(3)), None);
    }

    #[test]
    fn skips_leading_space_and_handles_quotes() {
        let tmp = csv_file("1, Alice,  30\n2,\"Smith, Jane\",40\n");
        let rows: Vec<Row> = positional(&tmp).rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(rows[0].get(&Column::Index(1)), Some("Alice"));
        assert_eq!(rows[0].get(&Column::Index(2)), Some("30"));
        assert_eq!(rows[1].get(&Column::Index(1)), Some("Smith, Jane"));
        assert_eq!(rows[1].get(&Column::Index(2)), Some("40"));
    }

    #[test]
    fn quoted_field_after_leading_space() {
        let tmp = csv_file("1, \"Smith, Jane\",40\n");
        let rows: Vec<Row> = positional(&tmp).rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(
            rows[0],
            Row::Positional(vec!["1".into(), "Smith, Jane".into(), "40".into()])
        );
    }

    #[test]
    fn escaped_delimiter_outside_quotes() {
        let tmp = csv_file("1,Smith\\, Jane,40\n");
        let rows: Vec<Row> = positional(&tmp).rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(
            rows[0],
            Row::Positional(vec!["1".into(), "Smith, Jane".into(), "40".into()])
        );
    }

    #[test]
    fn honours_backslash_escape() {
        let tmp = csv_file("1,\"say \\\"hi\\\"\"\n2,say \\\"hi\\\"\n");
        let rows: Vec<Row> = positional(&tmp).rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(rows[0].get(&Column::Index(1)), Some("say \"hi\""));
        assert_eq!(rows[1].get(&Column::Index(1)), Some("say \"hi\""));
    }

    #[test]
    fn escape_can_be_disabled() {
        let tmp = csv_file("1,a\\b\n");
        let dialect = CsvDialect {
            escape: None,
            ..CsvDialect::default()
        };
        let source = RecordSource::new(tmp.path(), dialect, RowShape::Positional);
        let row = source.rows().unwrap().next().unwrap().unwrap();
        assert_eq!(row.get(&Column::Index(1)), Some("a\\b"));
    }

    #[test]
    fn crlf_line_endings() {
        let tmp = csv_file("1,a\r\n2,b\r\n");
        let rows: Vec<Row> = positional(&tmp).rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get(&Column::Index(1)), Some("b"));
    }

    #[test]
    fn dialect_reader_normalizes_byte_by_byte() {
        let input: &[u8] = b"1, \"a,b\",c\\,d\nx,\"q\"\"t\"";
        let mut reader = DialectReader::new(input, &CsvDialect::default());
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        while reader.read(&mut byte).unwrap() == 1 {
            out.push(byte[0]);
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1,\"a,b\",\"c,d\"\nx,\"q\"\"t\""
        );
    }

    #[test]
    fn keeps_leading_space_when_disabled() {
        let tmp = csv_file("1, Alice\n");
        let dialect = CsvDialect {
            skip_leading_space: false,
            ..CsvDialect::default()
        };
        let source = RecordSource::new(tmp.path(), dialect, RowShape::Positional);
        let row = source.rows().unwrap().next().unwrap().unwrap();
        assert_eq!(row.get(&Column::Index(1)), Some(" Alice"));
    }

    #[test]
    fn reads_keyed_rows() {
        let tmp = csv_file("id, name\n7, Carol\n");
        let source = RecordSource::new(tmp.path(), CsvDialect::default(), RowShape::Keyed);
        let rows: Vec<Row> = source.rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(&Column::Name("name".into())), Some("Carol"));
        assert_eq!(rows[0].get(&Column::Name("missing".into())), None);
        assert_eq!(rows[0].get(&Column::Index(0)), None);
    }

    #[test]
    fn positional_header_is_skipped_when_configured() {
        let tmp = csv_file("id,name\n7,Carol\n");
        let dialect = CsvDialect {
            has_header: true,
            ..CsvDialect::default()
        };
        let source = RecordSource::new(tmp.path(), dialect, RowShape::Positional);
        let rows: Vec<Row> = source.rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(&Column::Index(0)), Some("7"));
    }

    #[test]
    fn ragged_rows_are_yielded() {
        let tmp = csv_file("1,2,3\n4\n");
        let rows: Vec<Row> = positional(&tmp).rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(rows[0].len(), 3);
        assert_eq!(rows[1].len(), 1);
    }

    #[test]
    fn rows_restart_from_the_beginning() {
        let tmp = csv_file("a\nb\nc\n");
        let source = positional(&tmp);
        let first: Vec<Row> = source.rows().unwrap().take(2).map(Result::unwrap).collect();
        let second: Vec<Row> = source.rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
        assert_eq!(first[0], second[0]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let source = RecordSource::new(
            "/nonexistent/graphload.csv",
            CsvDialect::default(),
            RowShape::Positional,
        );
        assert!(source.rows().is_err());
    }

    #[test]
    fn shape_follows_columns() {
        let cols = [Column::Index(0), Column::Index(1)];
        assert_eq!(RowShape::for_columns(&cols), RowShape::Positional);
        let cols = [Column::Name("id".into())];
        assert_eq!(RowShape::for_columns(&cols), RowShape::Keyed);
    }
}
