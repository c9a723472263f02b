use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use erpprep_core::{Failure, FailureDetail, FailureKind, PipelineResult, Table};
use erpprep_io::{load, Format};
use serde::{Deserialize, Serialize};

use crate::exporter::{ExportRequest, Exporter};

/// Domain expression matching every record.
pub const ALL_RECORDS: &str = "[]";

/// Reference data kinds fetched from the ERP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Partner,
    Product,
    AnalyticAccount,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Partner, Self::Product, Self::AnalyticAccount];

    pub fn model(&self) -> &'static str {
        match self {
            Self::Partner => "res.partner",
            Self::Product => "product.template",
            Self::AnalyticAccount => "account.analytic.account",
        }
    }

    /// Fixed field projection requested from the exporter.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Partner => &["id", "ref", "customer_rank", "supplier_rank"],
            Self::Product => &["id", "display_name", "default_code"],
            Self::AnalyticAccount => &["id.id", "code"],
        }
    }

    /// Column matched against the business code.
    pub fn key_column(&self) -> &'static str {
        match self {
            Self::Partner => "ref",
            Self::Product => "default_code",
            Self::AnalyticAccount => "code",
        }
    }

    /// Column written into the import file. For analytic accounts this is
    /// the `[id, code]` pair the distribution is built from.
    pub fn value_column(&self) -> &'static str {
        match self {
            Self::Partner => "id",
            Self::Product => "display_name",
            Self::AnalyticAccount => "id.id",
        }
    }

    /// Cache file name: the model with dots replaced.
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.model().replace('.', "_"))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Partner => "partner",
            Self::Product => "product",
            Self::AnalyticAccount => "analytic_account",
        })
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "partner" => Ok(Self::Partner),
            "product" => Ok(Self::Product),
            "analytic_account" => Ok(Self::AnalyticAccount),
            other => Err(format!("unknown reference entity '{other}'")),
        }
    }
}

/// Fetches reference tables through an [`Exporter`], reusing recent exports.
pub struct ReferenceResolver {
    exporter: Box<dyn Exporter>,
    work_dir: PathBuf,
    /// Exports younger than this are reused; `None` always re-exports.
    ttl: Option<Duration>,
    separator: u8,
    domains: BTreeMap<EntityKind, String>,
}

impl ReferenceResolver {
    pub fn new(exporter: Box<dyn Exporter>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            exporter,
            work_dir: work_dir.into(),
            ttl: Some(Duration::from_secs(3600)),
            separator: b';',
            domains: BTreeMap::new(),
        }
    }

    /// Reuse window for cached exports. Zero disables reuse.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_domain(mut self, kind: EntityKind, domain: impl Into<String>) -> Self {
        self.domains.insert(kind, domain.into());
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn reference_path(&self, kind: EntityKind) -> PathBuf {
        self.work_dir.join(kind.file_name())
    }

    pub fn resolve_reference(&self, kind: EntityKind) -> PipelineResult<Table> {
        let path = self.reference_path(kind);
        if self.is_fresh(&path) {
            log::debug!("reusing {} export {}", kind, path.display());
        } else {
            self.export(kind, &path)?;
        }
        let table = load(&path, Format::Csv, Some(self.separator))?;

        let absent: Vec<String> = [kind.key_column(), kind.value_column()]
            .into_iter()
            .filter(|c| !table.has_column(c))
            .map(str::to_string)
            .collect();
        if !absent.is_empty() {
            return Err(Failure::read(format!(
                "{} export {} lacks column(s): {}",
                kind,
                path.display(),
                absent.join(", ")
            ))
            .with_detail(FailureDetail::Values(absent)));
        }
        Ok(table)
    }

    fn is_fresh(&self, path: &Path) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age < ttl)
    }

    /// Export to a temporary file, then rename over the cache file.
    fn export(&self, kind: EntityKind, path: &Path) -> PipelineResult<()> {
        fs::create_dir_all(&self.work_dir).map_err(|e| {
            Failure::write(format!("cannot create {}: {e}", self.work_dir.display()))
        })?;
        let tmp_path = self
            .work_dir
            .join(format!(".{}.{}.tmp", kind.file_name(), uuid::Uuid::new_v4()));
        let domain = self
            .domains
            .get(&kind)
            .map(String::as_str)
            .unwrap_or(ALL_RECORDS);

        let request = ExportRequest {
            model: kind.model(),
            fields: kind.fields(),
            domain,
            output: &tmp_path,
        };
        if let Err(failure) = self.exporter.export(&request) {
            let _ = fs::remove_file(&tmp_path);
            return Err(failure);
        }
        if !tmp_path.exists() {
            return Err(Failure::new(
                FailureKind::ExportError,
                format!("exporter wrote no file for {}", kind.model()),
            ));
        }
        fs::rename(&tmp_path, path).map_err(|e| {
            Failure::write(format!("failed to rename tmp to {}: {e}", path.display()))
        })?;
        log::info!("exported {} to {}", kind.model(), path.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
