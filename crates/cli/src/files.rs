// Downloads directory browsing.
//
// Every path is taken relative to the downloads root and must stay inside
// it, including through symlinks.

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};
use erpprep_core::{Failure, FailureDetail, FailureKind, PipelineResult};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
    pub extension: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Downloads {
    root: PathBuf,
}

impl Downloads {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` under the root. The target must exist.
    pub fn resolve(&self, relative: &str) -> PipelineResult<PathBuf> {
        let relative_path = Path::new(relative);
        let escapes = relative_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(invalid_path(relative));
        }

        let path = self.root.join(relative_path);
        if !path.exists() {
            return Err(Failure::read(format!("no such file or directory: {relative}"))
                .with_detail(FailureDetail::Text(relative.to_string())));
        }

        let root = fs::canonicalize(&self.root)
            .map_err(|e| Failure::read(format!("{}: {e}", self.root.display())))?;
        let resolved =
            fs::canonicalize(&path).map_err(|e| Failure::read(format!("{relative}: {e}")))?;
        if !resolved.starts_with(&root) {
            return Err(invalid_path(relative));
        }
        Ok(resolved)
    }

    /// Directories first, then files, each sorted by name.
    pub fn list(&self, relative: Option<&str>) -> PipelineResult<Vec<FileEntry>> {
        let dir = match relative {
            Some(relative) => self.resolve(relative)?,
            None if !self.root.exists() => return Ok(Vec::new()),
            None => self.root.clone(),
        };
        if !dir.is_dir() {
            return Err(Failure::read(format!("not a directory: {}", dir.display())));
        }

        let entries = fs::read_dir(&dir)
            .map_err(|e| Failure::read(format!("cannot list {}: {e}", dir.display())))?;
        let mut listing = Vec::new();
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let path = entry.path();
            listing.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                modified: metadata.modified().ok().map(DateTime::<Local>::from),
                extension: if metadata.is_dir() {
                    None
                } else {
                    path.extension().map(|e| e.to_string_lossy().to_lowercase())
                },
            });
        }
        listing.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(listing)
    }

    /// Delete one file. Directories are refused.
    pub fn delete(&self, relative: &str) -> PipelineResult<PathBuf> {
        let path = self.resolve(relative)?;
        if path.is_dir() {
            return Err(Failure::new(
                FailureKind::InvalidPath,
                format!("refusing to delete directory: {relative}"),
            )
            .with_detail(FailureDetail::Text(relative.to_string())));
        }
        fs::remove_file(&path)
            .map_err(|e| Failure::write(format!("cannot delete {}: {e}", path.display())))?;
        log::info!("deleted {}", path.display());
        Ok(path)
    }
}

fn invalid_path(relative: &str) -> Failure {
    Failure::new(
        FailureKind::InvalidPath,
        format!("path escapes the downloads directory: {relative}"),
    )
    .with_detail(FailureDetail::Text(relative.to_string()))
}
