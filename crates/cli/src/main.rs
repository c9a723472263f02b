// erpprep CLI - turns business uploads into ERP import files

mod exit_codes;

use erpprep_cli::{CleanReport, Downloads, Pipeline};

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use erpprep_config::Settings;
use erpprep_core::{Failure, FailureKind};
use erpprep_io::{parse_separator, Loader};
use erpprep_recon::{DocumentType, MatchPolicy};

use exit_codes::{failure_exit_code, FailureOutput, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "erpprep")]
#[command(about = "Prepare customer-order and supplier-invoice uploads for ERP import")]
#[command(version)]
struct Cli {
    /// Settings file (default: <config dir>/erpprep/config.toml)
    #[arg(long, global = true, env = "ERPPREP_CONFIG")]
    config: Option<PathBuf>,

    /// More logging on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the column headers of an upload
    #[command(after_help = "\
Examples:
  erpprep headers commandes.xlsx
  erpprep headers commandes.csv --separator ';' --json")]
    Headers {
        /// Upload (.csv or .xlsx), looked up in paths.uploads when not found
        file: PathBuf,

        /// CSV field separator (sniffed when omitted)
        #[arg(long, short = 's', value_parser = parse_separator)]
        separator: Option<u8>,

        /// Print a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Show the columns and ERP fields of a document type
    #[command(after_help = "\
Columns marked * are order header fields: filled on the first line of an order,
and cleared on repeated lines.

Examples:
  erpprep schema clt
  erpprep schema fni --json")]
    Schema {
        /// Document type: clt (customer order) or fni (supplier invoice)
        doc: DocumentType,

        #[arg(long)]
        json: bool,
    },

    /// Rename uploaded columns to schema names, writing <stem>_cleaned.csv
    #[command(after_help = "\
Examples:
  erpprep clean export.csv --doc clt --assign 'Client=Nom client' --assign 'Produit=Article'")]
    Clean {
        /// Upload (.csv or .xlsx), looked up in paths.uploads when not found
        file: PathBuf,

        #[arg(long)]
        doc: DocumentType,

        /// Schema column and the uploaded header holding it: 'Column=Header'
        #[arg(long = "assign", value_parser = parse_assignment, required = true)]
        assignments: Vec<(String, String)>,

        #[arg(long, short = 's', value_parser = parse_separator)]
        separator: Option<u8>,

        #[arg(long)]
        json: bool,
    },

    /// Run uploads through the full pipeline and write the import file
    #[command(after_help = "\
Reference data (partners, products, analytic accounts) is exported from the ERP
by the configured export script and reused while younger than
exporter.reference_ttl_secs.

Examples:
  erpprep process commandes.xlsx --doc clt
  erpprep process janvier.csv fevrier.csv --doc fni --collect-all
  erpprep process commandes.csv --doc clt --output import.csv --threshold 2000 --json")]
    Process {
        /// Uploads of the same document type, looked up in paths.uploads when not found
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long)]
        doc: DocumentType,

        /// Column assignment applied to every upload: 'Column=Header'
        #[arg(long = "assign", value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,

        #[arg(long, short = 's', value_parser = parse_separator)]
        separator: Option<u8>,

        /// Output CSV (default: <downloads>/Import_du_<date>/Import_<partner>_<time>.csv)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Rows per import chunk (default: export.row_threshold)
        #[arg(long)]
        threshold: Option<usize>,

        /// Report every unresolved column instead of stopping at the first
        #[arg(long)]
        collect_all: bool,

        #[arg(long)]
        json: bool,
    },

    /// Browse and clean up the downloads directory
    Files {
        #[command(subcommand)]
        command: FilesCommands,
    },
}

#[derive(Subcommand)]
enum FilesCommands {
    /// List a directory under the downloads root
    List {
        /// Directory relative to the downloads root
        path: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Delete a file under the downloads root
    Delete {
        /// File relative to the downloads root
        name: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Headers { file, separator, json } => {
            cmd_headers(cli.config.as_deref(), &file, separator, json)
        }
        Commands::Schema { doc, json } => cmd_schema(doc, json),
        Commands::Clean { file, doc, assignments, separator, json } => {
            cmd_clean(cli.config.as_deref(), &file, doc, &assignments, separator, json)
        }
        Commands::Process {
            files,
            doc,
            assignments,
            separator,
            output,
            threshold,
            collect_all,
            json,
        } => cmd_process(
            cli.config.as_deref(),
            ProcessArgs {
                files,
                doc,
                assignments,
                separator,
                output,
                threshold,
                collect_all,
                json,
            },
        ),
        Commands::Files { command } => match command {
            FilesCommands::List { path, json } => {
                cmd_files_list(cli.config.as_deref(), path.as_deref(), json)
            }
            FilesCommands::Delete { name } => cmd_files_delete(cli.config.as_deref(), &name),
        },
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// `Column=Header` -> (schema column, uploaded header).
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (column, header) = s
        .split_once('=')
        .ok_or_else(|| format!("expected 'Column=Header', got '{s}'"))?;
    let (column, header) = (column.trim(), header.trim());
    if column.is_empty() || header.is_empty() {
        return Err(format!("expected 'Column=Header', got '{s}'"));
    }
    Ok((column.to_string(), header.to_string()))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: failure_exit_code(FailureKind::WriteError), message: msg.into(), hint: None }
    }

    /// Report a pipeline failure. The failure itself is printed here, so the
    /// returned error only carries the exit code and hint.
    pub fn failure(failure: Failure, json: bool) -> Self {
        FailureOutput::from_failure(&failure).print(json);
        let hint = match failure.kind {
            FailureKind::UnsupportedFormat => Some("save the upload as .csv or .xlsx"),
            FailureKind::MissingColumn => {
                Some("map uploaded headers with --assign 'Column=Header' (see `erpprep schema`)")
            }
            FailureKind::UnresolvedReferences => {
                Some("create the missing records in the ERP or fix the codes in the upload")
            }
            FailureKind::ExportTimeout => Some("raise exporter.timeout_secs in the settings file"),
            _ => None,
        };
        Self {
            code: failure_exit_code(failure.kind),
            message: String::new(),
            hint: hint.map(str::to_string),
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, CliError> {
    Settings::load(path).map_err(|e| {
        CliError::args(format!("settings: {e}"))
            .with_hint(format!("default location: {}", Settings::config_path().display()))
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// ============================================================================
// headers / schema
// ============================================================================

fn cmd_headers(
    config: Option<&Path>,
    file: &Path,
    separator: Option<u8>,
    json: bool,
) -> Result<(), CliError> {
    let settings = load_settings(config)?;
    let headers = Loader::new(separator)
        .headers(&settings.upload_path(file))
        .map_err(|f| CliError::failure(f, json))?;
    if json {
        return print_json(&headers);
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for name in headers {
        writeln!(handle, "{}", name).map_err(|e| CliError::io(e.to_string()))?;
    }
    Ok(())
}

fn cmd_schema(doc: DocumentType, json: bool) -> Result<(), CliError> {
    let schema = doc.schema();
    if json {
        let mapping: serde_json::Map<String, serde_json::Value> = schema
            .mapping
            .iter()
            .map(|(column, field)| (column.to_string(), serde_json::Value::from(*field)))
            .collect();
        return print_json(&serde_json::json!({
            "document": doc.tag(),
            "column": schema.column,
            "entete": schema.entete,
            "business_key": schema.business_key,
            "mapping": mapping,
        }));
    }

    let width = schema.column.iter().map(|c| c.chars().count()).max().unwrap_or(0);
    println!("{} ({})", doc.tag(), doc.label());
    for column in schema.column {
        let marker = if schema.entete.contains(column) { "*" } else { " " };
        let field = schema.field(column).unwrap_or("-");
        println!("{marker} {column:<width$}  {field}");
    }
    Ok(())
}

// ============================================================================
// clean
// ============================================================================

fn cmd_clean(
    config: Option<&Path>,
    file: &Path,
    doc: DocumentType,
    assignments: &[(String, String)],
    separator: Option<u8>,
    json: bool,
) -> Result<(), CliError> {
    let settings = load_settings(config)?;
    let pipeline = Pipeline::from_settings(&settings, separator);
    let report: CleanReport = pipeline
        .clean(&settings.upload_path(file), doc, assignments)
        .map_err(|f| CliError::failure(f, json))?;

    if json {
        return print_json(&report);
    }
    println!("{}", report.path.display());
    if !report.missing.is_empty() {
        eprintln!("warning: still missing: {}", report.missing.join(", "));
    }
    Ok(())
}

// ============================================================================
// process
// ============================================================================

struct ProcessArgs {
    files: Vec<PathBuf>,
    doc: DocumentType,
    assignments: Vec<(String, String)>,
    separator: Option<u8>,
    output: Option<PathBuf>,
    threshold: Option<usize>,
    collect_all: bool,
    json: bool,
}

fn cmd_process(config: Option<&Path>, args: ProcessArgs) -> Result<(), CliError> {
    if args.threshold == Some(0) {
        return Err(CliError::args("--threshold must be at least 1"));
    }
    let settings = load_settings(config)?;

    let mut pipeline = Pipeline::from_settings(&settings, args.separator);
    if args.collect_all {
        pipeline = pipeline.with_policy(MatchPolicy::CollectAll);
    }
    if let Some(threshold) = args.threshold {
        pipeline = pipeline.with_row_threshold(threshold);
    }

    let files: Vec<PathBuf> = args.files.iter().map(|f| settings.upload_path(f)).collect();
    let artifact = pipeline
        .process(args.doc, &files, &args.assignments, args.output.as_deref())
        .map_err(|f| CliError::failure(f, args.json))?;

    if args.json {
        return print_json(&artifact);
    }
    println!("{}", artifact.path().display());
    Ok(())
}

// ============================================================================
// files
// ============================================================================

fn cmd_files_list(config: Option<&Path>, path: Option<&str>, json: bool) -> Result<(), CliError> {
    let settings = load_settings(config)?;
    let downloads = Downloads::new(&settings.paths.downloads);
    let entries = downloads.list(path).map_err(|f| CliError::failure(f, json))?;
    if json {
        return print_json(&entries);
    }

    for entry in entries {
        let modified = entry
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        if entry.is_dir {
            println!("{:>10}  {:16}  {}/", "-", modified, entry.name);
        } else {
            println!("{:>10}  {:16}  {}", entry.size, modified, entry.name);
        }
    }
    Ok(())
}

fn cmd_files_delete(config: Option<&Path>, name: &str) -> Result<(), CliError> {
    let settings = load_settings(config)?;
    let deleted = Downloads::new(&settings.paths.downloads)
        .delete(name)
        .map_err(|f| CliError::failure(f, false))?;
    println!("deleted {}", deleted.display());
    Ok(())
}
