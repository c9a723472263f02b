use std::fs;
use std::path::{Path, PathBuf};

use erpprep_core::{Failure, FailureDetail, PipelineResult, Table};
use erpprep_recon::chunk::{chunk_table, plan_chunks};
use serde::Serialize;

use crate::{csv, xlsx};

pub const DEFAULT_ROW_THRESHOLD: usize = 5000;

/// What the exporter wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportArtifact {
    /// Single import file.
    Csv { path: PathBuf, rows: usize },
    /// Full CSV, its chunks, and the workbook bundling them.
    Bundle {
        csv: PathBuf,
        chunks: Vec<PathBuf>,
        workbook: PathBuf,
        rows: usize,
    },
}

impl ExportArtifact {
    /// The file to hand over: the CSV, or the bundle workbook.
    pub fn path(&self) -> &Path {
        match self {
            Self::Csv { path, .. } => path,
            Self::Bundle { workbook, .. } => workbook,
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            Self::Csv { rows, .. } | Self::Bundle { rows, .. } => *rows,
        }
    }
}

/// Writes the final import file, splitting it when it grows past
/// `row_threshold` rows.
#[derive(Debug, Clone)]
pub struct ChunkedExporter {
    pub row_threshold: usize,
    /// Columns that are empty on continuation lines.
    pub required_columns: Vec<String>,
}

impl Default for ChunkedExporter {
    fn default() -> Self {
        Self {
            row_threshold: DEFAULT_ROW_THRESHOLD,
            required_columns: vec!["partner_id/id".to_string()],
        }
    }
}

impl ChunkedExporter {
    pub fn export_chunked(&self, tables: &[Table], output_path: &Path) -> PipelineResult<ExportArtifact> {
        let table = Table::concat(tables);
        if table.is_empty() {
            return Err(Failure::no_valid_data());
        }

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| write_failure(parent, e.to_string()))?;
        }
        csv::write_table(&table, output_path, true).map_err(|e| write_failure(output_path, e))?;
        let rows = table.row_count();
        log::info!("wrote {} ({rows} rows)", output_path.display());

        if rows <= self.row_threshold {
            return Ok(ExportArtifact::Csv {
                path: output_path.to_path_buf(),
                rows,
            });
        }

        let spans = plan_chunks(&table, self.row_threshold, self.required_columns.as_slice())?;
        let mut chunks = Vec::with_capacity(spans.len());
        let mut sheets = Vec::with_capacity(spans.len());
        for (i, span) in spans.iter().enumerate() {
            let part = chunk_table(&table, span);
            let path = sibling(output_path, &format!("_{}", i + 1), "csv");
            csv::write_table(&part, &path, true).map_err(|e| write_failure(&path, e))?;
            chunks.push(path);
            sheets.push((format!("Part_{}", i + 1), part));
        }

        let workbook = sibling(output_path, "_combined", "xlsx");
        xlsx::write_workbook(&workbook, &sheets).map_err(|e| write_failure(&workbook, e))?;
        log::info!(
            "split {rows} rows into {} parts: {}",
            chunks.len(),
            workbook.display()
        );

        Ok(ExportArtifact::Bundle {
            csv: output_path.to_path_buf(),
            chunks,
            workbook,
            rows,
        })
    }
}

/// `<dir>/<stem><suffix>.<ext>` next to `path`.
fn sibling(path: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}.{ext}"))
}

fn write_failure(path: &Path, message: String) -> Failure {
    Failure::write(format!("cannot write {}: {message}", path.display()))
        .with_detail(FailureDetail::Text(path.display().to_string()))
}
