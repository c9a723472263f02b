use std::path::Path;

use erpprep_core::{Failure, FailureDetail, PipelineResult, Table};

use crate::{csv, xlsx};

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Xlsx,
}

impl Format {
    /// Format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> PipelineResult<Format> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(Format::Csv),
            Some("xlsx") => Ok(Format::Xlsx),
            _ => Err(Failure::unsupported_format(path.display())),
        }
    }
}

/// Parse a `--separator` value: a single character, or `tab` / `\t`.
pub fn parse_separator(s: &str) -> Result<u8, String> {
    match s {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        _ if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        _ => Err(format!("invalid separator '{s}' (expected a single ASCII character)")),
    }
}

/// Load a table. `separator` only applies to CSV; when absent it is sniffed.
pub fn load(path: &Path, format: Format, separator: Option<u8>) -> PipelineResult<Table> {
    let table = match format {
        Format::Csv => csv::read_table(path, separator),
        Format::Xlsx => xlsx::read_table(path),
    }
    .map_err(|e| read_failure(path, e))?;
    log::debug!(
        "loaded {} ({} rows, {} columns)",
        path.display(),
        table.row_count(),
        table.width()
    );
    Ok(table)
}

/// Column names without reading data rows.
pub fn headers(path: &Path, separator: Option<u8>) -> PipelineResult<Vec<String>> {
    match Format::from_path(path)? {
        Format::Csv => csv::read_headers(path, separator),
        Format::Xlsx => xlsx::read_headers(path),
    }
    .map_err(|e| read_failure(path, e))
}

/// Column names from a raw header row.
///
/// Names are trimmed. A blank header becomes `Unnamed: <index>` and a repeated
/// name gets a `.<n>` suffix, so stray trailing separators or copied columns
/// still load.
pub fn header_names<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(raw.len());
    for (i, name) in raw.iter().enumerate() {
        let name = name.as_ref().trim();
        let base = if name.is_empty() {
            format!("Unnamed: {i}")
        } else {
            name.to_string()
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while names.contains(&candidate) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        names.push(candidate);
    }
    names
}

fn read_failure(path: &Path, message: String) -> Failure {
    Failure::read(format!("cannot read {}: {message}", path.display()))
        .with_detail(FailureDetail::Text(path.display().to_string()))
}

/// Upload loader with a fixed separator policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Loader {
    pub separator: Option<u8>,
}

impl Loader {
    pub fn new(separator: Option<u8>) -> Self {
        Self { separator }
    }

    /// Load by extension.
    pub fn load(&self, path: &Path) -> PipelineResult<Table> {
        load(path, Format::from_path(path)?, self.separator)
    }

    pub fn headers(&self, path: &Path) -> PipelineResult<Vec<String>> {
        headers(path, self.separator)
    }
}
