// Import pipeline: upload -> mapped, reconciled, deduplicated import file.
//
// Stage order per source file:
//   load -> assign -> map -> match -> validate -> filter duplicates
// then every surviving table goes through the chunked exporter together.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use erpprep_config::Settings;
use erpprep_core::{Failure, FailureKind, PipelineResult, Table};
use erpprep_erp::{CommandExporter, ConnectionInfo, EntityKind, Exporter, ReferenceResolver};
use erpprep_io::{csv, ChunkedExporter, ExportArtifact, Format, Loader};
use erpprep_recon::analytic::{analytic_comparison, ANALYTIC_COLUMN};
use erpprep_recon::{
    ColumnMapper, ComparisonSpec, DocumentType, DocumentTypeSchema, DuplicateFilter, MatchPolicy,
    Matcher,
};
use serde::Serialize;

/// Product column, identical in both schemas.
const PRODUCT_COLUMN: &str = "Produit";

/// Reference tables for one run, fetched once and shared by every source.
struct References {
    partners: Table,
    products: Table,
    analytic: Option<Table>,
}

/// Result of `clean`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanReport {
    pub path: PathBuf,
    pub rows: usize,
    /// Schema columns still absent after the assignment.
    pub missing: Vec<String>,
}

pub struct Pipeline {
    loader: Loader,
    resolver: ReferenceResolver,
    mapper: ColumnMapper,
    matcher: Matcher,
    filter: DuplicateFilter,
    exporter: ChunkedExporter,
    downloads: PathBuf,
}

impl Pipeline {
    pub fn new(loader: Loader, resolver: ReferenceResolver, downloads: impl Into<PathBuf>) -> Self {
        Self {
            loader,
            resolver,
            mapper: ColumnMapper::default(),
            matcher: Matcher::new(MatchPolicy::default()),
            filter: DuplicateFilter::default(),
            exporter: ChunkedExporter::default(),
            downloads: downloads.into(),
        }
    }

    /// Build the pipeline described by `settings`, driving the configured
    /// export script.
    pub fn from_settings(settings: &Settings, separator: Option<u8>) -> Self {
        Self::with_exporter(settings, separator, Box::new(command_exporter(settings)))
    }

    /// Same as `from_settings`, with a caller-supplied reference exporter.
    pub fn with_exporter(
        settings: &Settings,
        separator: Option<u8>,
        exporter: Box<dyn Exporter>,
    ) -> Self {
        let mut resolver = ReferenceResolver::new(exporter, &settings.paths.work)
            .with_ttl(Duration::from_secs(settings.exporter.reference_ttl_secs))
            .with_separator(settings.exporter.separator_byte());
        for kind in EntityKind::ALL {
            if let Some(domain) = settings.domain(&kind.to_string()) {
                resolver = resolver.with_domain(kind, domain);
            }
        }

        let policy = if settings.matching.collect_all {
            MatchPolicy::CollectAll
        } else {
            MatchPolicy::FailFast
        };
        Self::new(Loader::new(separator), resolver, &settings.paths.downloads)
            .with_policy(policy)
            .with_row_threshold(settings.export.row_threshold)
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.matcher = Matcher::new(policy);
        self
    }

    pub fn with_row_threshold(mut self, threshold: usize) -> Self {
        self.exporter.row_threshold = threshold;
        self
    }

    pub fn downloads(&self) -> &Path {
        &self.downloads
    }

    // ------------------------------------------------------------------------
    // Cleaning
    // ------------------------------------------------------------------------

    /// Rename uploaded columns to schema names and write `<stem>_cleaned.csv`
    /// next to the upload.
    pub fn clean(
        &self,
        path: &Path,
        doc: DocumentType,
        assignments: &[(String, String)],
    ) -> PipelineResult<CleanReport> {
        let schema = doc.schema();
        let mut table = self.loader.load(path)?;
        self.mapper.assign_columns(&mut table, schema, assignments)?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = path.with_file_name(format!("{stem}_cleaned.csv"));
        csv::write_table(&table, &output, false)
            .map_err(|e| Failure::write(format!("cannot write {}: {e}", output.display())))?;

        let missing = schema
            .column
            .iter()
            .filter(|c| !table.has_column(c))
            .map(|c| c.to_string())
            .collect();
        log::info!("cleaned {} -> {}", path.display(), output.display());
        Ok(CleanReport {
            path: output,
            rows: table.row_count(),
            missing,
        })
    }

    // ------------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------------

    /// Run every source through the pipeline and export the result.
    ///
    /// `output` defaults to the dated import path under the downloads root.
    pub fn process(
        &self,
        doc: DocumentType,
        sources: &[PathBuf],
        assignments: &[(String, String)],
        output: Option<&Path>,
    ) -> PipelineResult<ExportArtifact> {
        if sources.is_empty() {
            return Err(Failure::no_valid_data());
        }
        // Reject bad uploads before paying for reference exports.
        for source in sources {
            Format::from_path(source)?;
        }

        let references = match self.references(doc) {
            Ok(references) => references,
            Err(failure) if failure.kind == FailureKind::ReadError => {
                log::warn!("skipping all sources, reference data unreadable: {failure}");
                return Err(Failure::no_valid_data());
            }
            Err(failure) => return Err(failure),
        };

        let mut tables = Vec::with_capacity(sources.len());
        for source in sources {
            match self.prepare(doc, &references, source, assignments)? {
                Some(table) => tables.push(table),
                None => log::warn!("skipping {}: no rows", source.display()),
            }
        }
        if tables.is_empty() {
            return Err(Failure::no_valid_data());
        }

        let output = match output {
            Some(path) => path.to_path_buf(),
            None => default_output(&self.downloads, doc, chrono::Local::now().naive_local()),
        };
        self.exporter.export_chunked(&tables, &output)
    }

    fn references(&self, doc: DocumentType) -> PipelineResult<References> {
        let partners = self.resolver.resolve_reference(EntityKind::Partner)?;
        let products = self.resolver.resolve_reference(EntityKind::Product)?;
        let analytic = if doc.has_analytic() {
            Some(self.resolver.resolve_reference(EntityKind::AnalyticAccount)?)
        } else {
            None
        };
        Ok(References {
            partners,
            products,
            analytic,
        })
    }

    /// One source through every table stage. `None` when it holds no rows.
    fn prepare(
        &self,
        doc: DocumentType,
        references: &References,
        source: &Path,
        assignments: &[(String, String)],
    ) -> PipelineResult<Option<Table>> {
        let schema = doc.schema();
        let mut table = self.loader.load(source)?.without_blank_rows();
        if !assignments.is_empty() {
            self.mapper.assign_columns(&mut table, schema, assignments)?;
        }
        if table.is_empty() {
            return Ok(None);
        }

        self.mapper.require_columns(&table, schema)?;
        let mapped = self.mapper.map_columns(table, schema)?;

        let comparisons = comparisons(doc, schema, references);
        let (matched, _) = self.matcher.match_table(mapped, &comparisons)?;
        self.filter.validate(&matched, schema)?;

        let entete: Vec<&str> = schema.entete.iter().map(|c| field(schema, c)).collect();
        let filtered =
            self.filter
                .filter_duplicates(matched, field(schema, schema.business_key), &entete)?;
        log::debug!("{}: {} rows ready", source.display(), filtered.row_count());
        Ok(Some(filtered))
    }
}

/// Comparisons run against a mapped table, reported under business names.
fn comparisons<'a>(
    doc: DocumentType,
    schema: &DocumentTypeSchema,
    references: &'a References,
) -> Vec<ComparisonSpec<'a>> {
    let partner_column = doc.partner_column();
    let partner = EntityKind::Partner;
    let product = EntityKind::Product;

    let mut specs = vec![
        ComparisonSpec::new(
            &references.partners,
            field(schema, partner_column),
            partner.key_column(),
            partner.value_column(),
        )
        .labelled(partner_column),
        ComparisonSpec::new(
            &references.products,
            field(schema, PRODUCT_COLUMN),
            product.key_column(),
            product.value_column(),
        )
        .labelled(PRODUCT_COLUMN),
    ];
    if let Some(accounts) = &references.analytic {
        let kind = EntityKind::AnalyticAccount;
        specs.push(analytic_comparison(
            accounts,
            field(schema, ANALYTIC_COLUMN),
            kind.key_column(),
            kind.value_column(),
        ));
    }
    specs
}

/// ERP field path of a business column, or the column itself when unmapped.
fn field<'a>(schema: &DocumentTypeSchema, column: &'a str) -> &'a str {
    schema.field(column).unwrap_or(column)
}

fn command_exporter(settings: &Settings) -> CommandExporter {
    let exporter = &settings.exporter;
    let connection = &settings.connection;
    CommandExporter {
        args: exporter.args.clone(),
        connection: ConnectionInfo {
            hostname: connection.hostname.clone(),
            database: connection.database.clone(),
            login: connection.login.clone(),
            password: connection.password.clone(),
            protocol: connection.protocol.clone(),
            port: connection.port,
            uid: connection.uid,
        },
        timeout: Duration::from_secs(exporter.timeout_secs),
        workers: exporter.workers,
        batch_size: exporter.batch_size,
        separator: char::from(exporter.separator_byte()),
        encoding: exporter.encoding.clone(),
        ..CommandExporter::new(exporter.program.clone(), settings.exporter_dir())
    }
}

/// `<downloads>/Import_du_<dd_mm_YYYY>/Import_<partner>_<dd_mm_YYYY_HHMM>.csv`
pub fn default_output(downloads: &Path, doc: DocumentType, now: NaiveDateTime) -> PathBuf {
    downloads
        .join(format!("Import_du_{}", now.format("%d_%m_%Y")))
        .join(format!(
            "Import_{}_{}.csv",
            doc.partner_column(),
            now.format("%d_%m_%Y_%H%M")
        ))
}
