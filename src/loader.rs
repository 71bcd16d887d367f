//! Delimited text reader for the INSEE reference files.
//!
//! Rows are produced lazily as column → value maps keyed by the header row.
//! Files ending in `.gz` are decompressed on the fly.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use flate2::read::GzDecoder;
use hashbrown::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Parse(#[from] csv::Error),

    #[error("line {line}: unbalanced quote in column '{column}'")]
    UnbalancedQuote { line: u64, column: String },

    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("line {line}: column '{column}' is empty")]
    EmptyValue { line: u64, column: String },
}

/// One data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based line number in the source file.
    pub line: u64,
    pub values: HashMap<String, String>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    /// Value of a column that must be part of the header.
    pub fn column(&self, column: &str) -> Result<&str, LoaderError> {
        self.get(column)
            .ok_or_else(|| LoaderError::MissingColumn(column.to_string()))
    }

    /// Value of a column that must be present and non-empty.
    pub fn require(&self, column: &str) -> Result<&str, LoaderError> {
        let value = self.column(column)?;
        if value.is_empty() {
            return Err(LoaderError::EmptyValue {
                line: self.line,
                column: column.to_string(),
            });
        }
        Ok(value)
    }
}

/// Single-pass row source over a delimited file.
pub struct CsvSource {
    path: PathBuf,
    headers: Arc<StringRecord>,
    records: StringRecordsIntoIter<Box<dyn Read>>,
}

impl CsvSource {
    pub fn open<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Self, LoaderError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| LoaderError::Io {
            path: path.clone(),
            source,
        })?;

        let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .from_reader(reader);
        let headers = Arc::new(csv_reader.headers()?.clone());

        Ok(Self {
            path,
            headers,
            records: csv_reader.into_records(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.headers.iter()
    }

    /// Fail early if any of `columns` is missing from the header row.
    pub fn require_columns(&self, columns: &[&str]) -> Result<(), LoaderError> {
        for column in columns {
            if !self.headers.iter().any(|h| h == *column) {
                return Err(LoaderError::MissingColumn(column.to_string()));
            }
        }
        Ok(())
    }
}

impl Iterator for CsvSource {
    type Item = Result<Row, LoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };

        let line = record.position().map(|p| p.line()).unwrap_or(0);

        // No INSEE column spans lines, so a line break inside a field means
        // a quote was never closed and swallowed the rows after it.
        if let Some((column, _)) = self
            .headers
            .iter()
            .zip(record.iter())
            .find(|(_, v)| v.contains(['\n', '\r']))
        {
            return Some(Err(LoaderError::UnbalancedQuote {
                line,
                column: column.to_string(),
            }));
        }

        let values = self
            .headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();

        Some(Ok(Row { line, values }))
    }
}
