use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Result type shared by every pipeline stage.
pub type PipelineResult<T> = Result<T, Failure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// File extension is not `.csv` / `.xlsx`.
    UnsupportedFormat,
    /// File could not be opened or parsed.
    ReadError,
    /// Output could not be written.
    WriteError,
    /// ERP exporter exited non-zero or wrote to stderr.
    ExportError,
    /// ERP exporter did not finish within its timeout.
    ExportTimeout,
    /// `Date` cell is not a `DDMMYY` value.
    DateFormatError,
    /// A required cell is empty.
    BlankRequiredField,
    /// Source values have no usable counterpart in a reference table.
    UnresolvedReferences,
    /// No source produced any row.
    NoValidData,
    /// A column required by the document schema is absent.
    MissingColumn,
    /// Path escapes the managed directory.
    InvalidPath,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnsupportedFormat => "unsupported_format",
            Self::ReadError => "read_error",
            Self::WriteError => "write_error",
            Self::ExportError => "export_error",
            Self::ExportTimeout => "export_timeout",
            Self::DateFormatError => "date_format_error",
            Self::BlankRequiredField => "blank_required_field",
            Self::UnresolvedReferences => "unresolved_references",
            Self::NoValidData => "no_valid_data",
            Self::MissingColumn => "missing_column",
            Self::InvalidPath => "invalid_path",
        };
        f.write_str(s)
    }
}

/// One offending source row: 1-based line number in the source file
/// (the header is line 1) and its displayed values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDetail {
    pub line: usize,
    pub values: BTreeMap<String, String>,
}

/// Unresolved values for one comparison.
///
/// `missing` are values with no key in the reference table at all;
/// `invalid` are values whose reference row exists but carries no usable
/// value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnresolvedValues {
    pub missing: Vec<String>,
    pub invalid: Vec<String>,
}

impl UnresolvedValues {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    /// Every unresolved value, missing first.
    pub fn all(&self) -> Vec<String> {
        self.missing.iter().chain(self.invalid.iter()).cloned().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FailureDetail {
    #[default]
    None,
    /// A path, a raw value, or captured stderr.
    Text(String),
    Values(Vec<String>),
    Rows { column: String, rows: Vec<RowDetail> },
    /// Target column -> unresolved values.
    Unresolved(BTreeMap<String, UnresolvedValues>),
}

/// A reportable pipeline failure. Never fatal to the host process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub detail: FailureDetail,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: FailureDetail::None,
        }
    }

    pub fn with_detail(mut self, detail: FailureDetail) -> Self {
        self.detail = detail;
        self
    }

    pub fn unsupported_format(path: impl fmt::Display) -> Self {
        Self::new(
            FailureKind::UnsupportedFormat,
            format!("unsupported file format: {path} (expected .csv or .xlsx)"),
        )
        .with_detail(FailureDetail::Text(path.to_string()))
    }

    pub fn read(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ReadError, message)
    }

    pub fn write(message: impl Into<String>) -> Self {
        Self::new(FailureKind::WriteError, message)
    }

    pub fn missing_columns(columns: Vec<String>) -> Self {
        Self::new(
            FailureKind::MissingColumn,
            format!("missing column(s): {}", columns.join(", ")),
        )
        .with_detail(FailureDetail::Values(columns))
    }

    pub fn no_valid_data() -> Self {
        Self::new(FailureKind::NoValidData, "no valid data was found")
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Failure {}
