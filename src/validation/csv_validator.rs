//! Pre-upload CSV checks.
//!
//! Reads at most `VALIDATION_SAMPLE_SIZE` bytes so a multi-gigabyte campaign
//! list is checked as fast as a small rate sheet. Problems are attributed to
//! 1-based row numbers with the header as row 1, which is how the server
//! numbers rows in its own error reports.

use std::io::Cursor;
use std::path::Path;

use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::AppError;
use crate::tasks::RowError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Size of the sample read from disk (512 KiB).
pub const VALIDATION_SAMPLE_SIZE: usize = 512 * 1024;

/// Maximum number of data records inspected.
pub const MAX_RECORDS_TO_VALIDATE: usize = 1000;

/// Problems collected before giving up on a file.
const MAX_REPORTED_ERRORS: usize = 50;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CsvValidationError {
    EmptyFile,
    NotUtf8,
    NoHeaders,
    /// Required columns absent from the header row.
    MissingColumns { columns: Vec<String> },
    InconsistentColumns { row: u64, expected: usize, found: usize },
    /// A required column is blank on this row.
    MissingValue { row: u64, column: String },
    Malformed { row: u64, message: String },
}

impl CsvValidationError {
    pub fn row(&self) -> Option<u64> {
        match self {
            CsvValidationError::InconsistentColumns { row, .. }
            | CsvValidationError::MissingValue { row, .. }
            | CsvValidationError::Malformed { row, .. } => Some(*row),
            _ => None,
        }
    }

    fn detail(&self) -> String {
        match self {
            CsvValidationError::EmptyFile => "The file is empty".to_string(),
            CsvValidationError::NotUtf8 => "The file is not valid UTF-8 text".to_string(),
            CsvValidationError::NoHeaders => "The file has no header row".to_string(),
            CsvValidationError::MissingColumns { columns } => {
                format!("Missing required columns: {}", columns.join(", "))
            }
            CsvValidationError::InconsistentColumns {
                expected, found, ..
            } => format!("expected {} columns, found {}", expected, found),
            CsvValidationError::MissingValue { column, .. } => {
                format!("missing value for '{}'", column)
            }
            CsvValidationError::Malformed { message, .. } => message.clone(),
        }
    }
}

impl std::fmt::Display for CsvValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.row() {
            Some(row) => write!(f, "Row {}: {}", row, self.detail()),
            None => f.write_str(&self.detail()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CsvValidationWarning {
    HasBom,
    /// Only the start of the file was checked.
    SampleOnly { validated_rows: u64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct CsvValidationResult {
    pub ok: bool,
    pub errors: Vec<CsvValidationError>,
    pub warnings: Vec<CsvValidationWarning>,
    pub headers: Vec<String>,
    pub validated_rows: u64,
    pub file_size_bytes: u64,
}

impl CsvValidationResult {
    fn failed(error: CsvValidationError, warnings: Vec<CsvValidationWarning>, file_size_bytes: u64) -> Self {
        Self {
            ok: false,
            errors: vec![error],
            warnings,
            headers: Vec::new(),
            validated_rows: 0,
            file_size_bytes,
        }
    }

    /// Errors tied to a specific row.
    pub fn row_errors(&self) -> Vec<RowError> {
        self.errors
            .iter()
            .filter_map(|e| e.row().map(|row| RowError::new(row, e.detail())))
            .collect()
    }

    /// The first problem as a submission error, `None` when the file passed.
    pub fn to_error(&self) -> Option<AppError> {
        let first = self.errors.first()?;
        let message = match self.errors.len() {
            1 => first.to_string(),
            n => format!("{} ({} more problems)", first, n - 1),
        };
        Some(AppError::CsvInvalid(message))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Validates the first part of a CSV file.
///
/// `required_columns` are matched against the header case-insensitively.
///
/// # Errors
///
/// Only I/O failures are returned as `AppError`; problems with the content
/// are listed in `CsvValidationResult::errors`.
pub async fn validate(path: &Path, required_columns: &[String]) -> Result<CsvValidationResult, AppError> {
    let file_size_bytes = tokio::fs::metadata(path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read file metadata: {}", e)))?
        .len();

    if file_size_bytes == 0 {
        return Ok(CsvValidationResult::failed(CsvValidationError::EmptyFile, vec![], 0));
    }

    let sample_size = usize::try_from(file_size_bytes)
        .unwrap_or(usize::MAX)
        .min(VALIDATION_SAMPLE_SIZE);
    let mut buffer = vec![0u8; sample_size];
    let mut file = File::open(path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open file: {}", e)))?;
    file.read_exact(&mut buffer)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read file: {}", e)))?;

    let is_sample_only = file_size_bytes > sample_size as u64;
    Ok(validate_sample(&buffer, is_sample_only, required_columns, file_size_bytes))
}

fn validate_sample(
    buffer: &[u8],
    is_sample_only: bool,
    required_columns: &[String],
    file_size_bytes: u64,
) -> CsvValidationResult {
    let mut warnings = Vec::new();

    let data = match buffer.strip_prefix(UTF8_BOM) {
        Some(rest) => {
            warnings.push(CsvValidationWarning::HasBom);
            rest
        }
        None => buffer,
    };

    let text = match std::str::from_utf8(data) {
        Ok(text) => text,
        // A multi-byte character cut by the sample boundary is not an error.
        Err(e) if is_sample_only && e.error_len().is_none() => {
            match std::str::from_utf8(&data[..e.valid_up_to()]) {
                Ok(text) => text,
                Err(_) => {
                    return CsvValidationResult::failed(CsvValidationError::NotUtf8, warnings, file_size_bytes)
                }
            }
        }
        Err(_) => {
            return CsvValidationResult::failed(CsvValidationError::NotUtf8, warnings, file_size_bytes)
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(Cursor::new(text.as_bytes()));

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(|s| s.trim().to_string()).collect(),
        Err(_) => Vec::new(),
    };
    if headers.iter().all(|h| h.is_empty()) {
        return CsvValidationResult::failed(CsvValidationError::NoHeaders, warnings, file_size_bytes);
    }

    let mut errors = Vec::new();

    let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let missing: Vec<String> = required_columns
        .iter()
        .filter(|c| !lowered.contains(&c.trim().to_lowercase()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        errors.push(CsvValidationError::MissingColumns { columns: missing });
    }

    let required_indexes: Vec<(usize, &String)> = required_columns
        .iter()
        .filter_map(|c| {
            lowered
                .iter()
                .position(|h| *h == c.trim().to_lowercase())
                .map(|i| (i, c))
        })
        .collect();

    let expected = headers.len();
    let mut validated_rows: u64 = 0;
    let mut records = reader.records().take(MAX_RECORDS_TO_VALIDATE).peekable();

    while let Some(result) = records.next() {
        // The last record of a partial sample is probably cut short.
        if is_sample_only && records.peek().is_none() {
            break;
        }
        validated_rows += 1;
        let row = validated_rows + 1;

        match result {
            Ok(record) => {
                let is_blank_line = record.len() == 1 && record.get(0).map_or(true, |f| f.trim().is_empty());
                if is_blank_line {
                    continue;
                }
                if record.len() != expected {
                    errors.push(CsvValidationError::InconsistentColumns {
                        row,
                        expected,
                        found: record.len(),
                    });
                } else {
                    for (index, column) in &required_indexes {
                        if record.get(*index).map_or(true, |v| v.trim().is_empty()) {
                            errors.push(CsvValidationError::MissingValue {
                                row,
                                column: (*column).clone(),
                            });
                        }
                    }
                }
            }
            Err(e) => errors.push(CsvValidationError::Malformed {
                row,
                message: e.to_string(),
            }),
        }

        if errors.len() >= MAX_REPORTED_ERRORS {
            break;
        }
    }

    if is_sample_only {
        warnings.push(CsvValidationWarning::SampleOnly { validated_rows });
    }

    CsvValidationResult {
        ok: errors.is_empty(),
        errors,
        warnings,
        headers,
        validated_rows,
        file_size_bytes,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
