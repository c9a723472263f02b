//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract — scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 2       | Universal        | CLI usage error (bad args, bad config)   |
//! | 10-19   | input            | Upload and file management codes         |
//! | 20-29   | data             | Schema, date and reference checks        |
//! | 30-39   | erp              | Reference exporter codes                 |
//! | 40-49   | output           | Import file codes                        |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Map the failure kind in `failure_exit_code`

use erpprep_core::{Failure, FailureDetail, FailureKind};

// =============================================================================
// Universal (0, 2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, unreadable or invalid settings file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Input (10-19)
// =============================================================================

/// Upload is not a .csv or .xlsx file.
pub const EXIT_UNSUPPORTED_FORMAT: u8 = 10;

/// Upload or reference file could not be read, or path does not exist.
pub const EXIT_READ: u8 = 11;

/// Path escapes the downloads directory.
pub const EXIT_INVALID_PATH: u8 = 12;

// =============================================================================
// Data (20-29)
// =============================================================================

/// A schema column is absent from the upload.
pub const EXIT_MISSING_COLUMN: u8 = 20;

/// A `Date` cell is not DDMMYY.
pub const EXIT_DATE_FORMAT: u8 = 21;

/// A required cell is blank.
pub const EXIT_BLANK_FIELD: u8 = 22;

/// Codes with no counterpart in the ERP reference data.
pub const EXIT_UNRESOLVED: u8 = 23;

/// No source produced any row.
pub const EXIT_NO_DATA: u8 = 24;

// =============================================================================
// ERP (30-39)
// =============================================================================

/// Export script failed (non-zero exit or stderr output).
pub const EXIT_EXPORT_FAILED: u8 = 30;

/// Export script exceeded its timeout and was killed.
pub const EXIT_EXPORT_TIMEOUT: u8 = 31;

// =============================================================================
// Output (40-49)
// =============================================================================

/// Import file or chunk could not be written.
pub const EXIT_WRITE: u8 = 40;

// =============================================================================
// Failure mapping
// =============================================================================

pub fn failure_exit_code(kind: FailureKind) -> u8 {
    match kind {
        FailureKind::UnsupportedFormat => EXIT_UNSUPPORTED_FORMAT,
        FailureKind::ReadError => EXIT_READ,
        FailureKind::InvalidPath => EXIT_INVALID_PATH,
        FailureKind::MissingColumn => EXIT_MISSING_COLUMN,
        FailureKind::DateFormatError => EXIT_DATE_FORMAT,
        FailureKind::BlankRequiredField => EXIT_BLANK_FIELD,
        FailureKind::UnresolvedReferences => EXIT_UNRESOLVED,
        FailureKind::NoValidData => EXIT_NO_DATA,
        FailureKind::ExportError => EXIT_EXPORT_FAILED,
        FailureKind::ExportTimeout => EXIT_EXPORT_TIMEOUT,
        FailureKind::WriteError => EXIT_WRITE,
    }
}

/// Structured failure output.
/// Designed for both human-readable and machine-parseable output.
#[derive(Debug, serde::Serialize)]
pub struct FailureOutput<'a> {
    pub error: FailureKind,
    pub message: &'a str,
    pub detail: &'a FailureDetail,
    pub exit_code: u8,
}

impl<'a> FailureOutput<'a> {
    pub fn from_failure(failure: &'a Failure) -> Self {
        Self {
            error: failure.kind,
            message: &failure.message,
            detail: &failure.detail,
            exit_code: failure_exit_code(failure.kind),
        }
    }

    /// Print to stderr: one JSON object, or `error:` plus detail lines.
    pub fn print(&self, json: bool) {
        if json {
            if let Ok(output) = serde_json::to_string(self) {
                eprintln!("{}", output);
            }
            return;
        }

        eprintln!("error: {}", self.message);
        match self.detail {
            FailureDetail::Unresolved(columns) => {
                for (column, values) in columns {
                    if !values.missing.is_empty() {
                        eprintln!("  {column}: not found: {}", values.missing.join(", "));
                    }
                    if !values.invalid.is_empty() {
                        eprintln!("  {column}: no usable id: {}", values.invalid.join(", "));
                    }
                }
            }
            FailureDetail::Rows { rows, .. } => {
                for row in rows {
                    let values: Vec<String> =
                        row.values.iter().map(|(k, v)| format!("{k}={v}")).collect();
                    eprintln!("  line {}: {}", row.line, values.join(", "));
                }
            }
            _ => {}
        }
    }
}
