use keihi_core::NormalizedTransaction;
use std::path::Path;
use thiserror::Error;

use crate::row::{RowExtractor, RowRejected};

/// Substrings that betray a wrong UTF-8 reading of Shift_JIS bytes.
const MOJIBAKE_MARKERS: &[&str] = &["\u{FFFD}", "ï¿½"];

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File is neither valid UTF-8 nor Shift_JIS")]
    Encoding,
    #[error("CSV error: {0}")]
    Parse(#[from] ParseError),
}

/// Structural CSV problems. Any of these fails the whole file.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("Quoted field opened on line {line} is never closed")]
    UnterminatedQuote { line: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    ShiftJis,
}

impl std::fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceEncoding::Utf8 => write!(f, "UTF-8"),
            SourceEncoding::ShiftJis => write!(f, "Shift_JIS"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub encoding: SourceEncoding,
    pub transactions: Vec<NormalizedTransaction>,
    /// Non-blank rows seen by the extractor.
    pub rows_read: usize,
    pub rejected: usize,
}

/// Decodes statement bytes, falling back to Shift_JIS once when the UTF-8
/// reading looks corrupted. A UTF-8 byte-order mark is dropped.
pub fn decode(bytes: &[u8]) -> Result<(String, SourceEncoding), ImportError> {
    let (text, _) = encoding_rs::UTF_8.decode_with_bom_removal(bytes);
    if !looks_corrupted(&text) {
        return Ok((text.into_owned(), SourceEncoding::Utf8));
    }

    tracing::debug!("UTF-8 reading looks corrupted, retrying as Shift_JIS");
    let (text, _, had_errors) = encoding_rs::SHIFT_JIS.decode(bytes);
    if had_errors {
        return Err(ImportError::Encoding);
    }
    Ok((text.into_owned(), SourceEncoding::ShiftJis))
}

fn looks_corrupted(text: &str) -> bool {
    MOJIBAKE_MARKERS.iter().any(|m| text.contains(m))
}

/// Line of a quoted field that is still open at end of input. Follows the
/// reader's rules: a quote only opens a field at its first character, and
/// `""` inside a quoted field is an escaped quote.
fn unterminated_quote(text: &str) -> Option<u64> {
    let mut line = 1;
    let mut open_at = None;
    let mut field_start = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if open_at.is_some() {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                }
                '"' => open_at = None,
                '\n' => line += 1,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if field_start => {
                open_at = Some(line);
                field_start = false;
            }
            ',' | '\r' => field_start = true,
            '\n' => {
                line += 1;
                field_start = true;
            }
            _ => field_start = false,
        }
    }
    open_at
}

/// Reads a whole statement and drives the row extractor over it in order.
#[derive(Default)]
pub struct CsvIngestor {
    extractor: RowExtractor,
}

impl CsvIngestor {
    pub fn new(extractor: RowExtractor) -> Self {
        Self { extractor }
    }

    pub fn ingest(&self, bytes: &[u8]) -> Result<Vec<NormalizedTransaction>, ImportError> {
        Ok(self.ingest_report(bytes)?.transactions)
    }

    pub fn ingest_file(&self, path: &Path) -> Result<IngestReport, ImportError> {
        let bytes = std::fs::read(path)?;
        self.ingest_report(&bytes)
    }

    pub fn ingest_report(&self, bytes: &[u8]) -> Result<IngestReport, ImportError> {
        let (text, encoding) = decode(bytes)?;
        if let Some(line) = unterminated_quote(&text) {
            return Err(ParseError::UnterminatedQuote { line }.into());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut transactions = Vec::new();
        let mut rows_read = 0;
        let mut rejected = 0;
        // Rows depend on the previous row's date, so this stays sequential.
        let mut carry: Option<String> = None;

        for result in reader.records() {
            let record = result.map_err(ParseError::from)?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            rows_read += 1;

            let row: Vec<&str> = record.iter().collect();
            match self.extractor.extract(&row, &mut carry) {
                Ok(tx) => transactions.push(tx),
                Err(reason) => {
                    rejected += 1;
                    let line = record.position().map(|p| p.line()).unwrap_or_default();
                    log_rejection(line, reason);
                }
            }
        }

        tracing::info!(
            %encoding,
            rows = rows_read,
            accepted = transactions.len(),
            rejected,
            "statement ingested"
        );

        Ok(IngestReport {
            encoding,
            transactions,
            rows_read,
            rejected,
        })
    }
}

fn log_rejection(line: u64, reason: RowRejected) {
    match reason {
        RowRejected::SectionBoundary => {
            tracing::debug!(line, "section boundary, carried date cleared")
        }
        other => tracing::debug!(line, reason = ?other, "row skipped"),
    }
}

/// Ingests with the default extractor configuration.
pub fn ingest(bytes: &[u8]) -> Result<Vec<NormalizedTransaction>, ImportError> {
    CsvIngestor::default().ingest(bytes)
}
