// Application settings
// Loaded from --config, $ERPPREP_CONFIG, or ~/.config/erpprep/config.toml

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Entity names accepted under `[references.<name>]`.
pub const REFERENCE_ENTITIES: &[&str] = &["partner", "product", "analytic_account"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub paths: PathsConfig,
    pub exporter: ExporterConfig,
    pub connection: ConnectionConfig,
    pub export: ExportConfig,
    pub matching: MatchingConfig,
    /// Per-entity overrides, keyed by entity name.
    pub references: BTreeMap<String, ReferenceConfig>,
}

/// Directories used by the pipeline. Relative paths resolve against the
/// current directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Where uploads named on the command line are looked up when they are
    /// not found as given.
    pub uploads: PathBuf,
    pub downloads: PathBuf,
    /// Cached reference exports and the connection file.
    pub work: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            uploads: PathBuf::from("uploads"),
            downloads: PathBuf::from("downloads"),
            work: PathBuf::from("work"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExporterConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Defaults to `paths.work`.
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub workers: u32,
    pub batch_size: u32,
    pub separator: String,
    pub encoding: String,
    /// Cached exports younger than this are reused; 0 always re-exports.
    pub reference_ttl_secs: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: vec!["odoo_export_thread.py".to_string()],
            working_dir: None,
            timeout_secs: 3600,
            workers: 2,
            batch_size: 200,
            separator: ";".to_string(),
            encoding: "utf-8-sig".to_string(),
            reference_ttl_secs: 3600,
        }
    }
}

impl ExporterConfig {
    /// Separator as a byte; valid after `Settings::validate`.
    pub fn separator_byte(&self) -> u8 {
        self.separator.as_bytes().first().copied().unwrap_or(b';')
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub database: String,
    pub login: String,
    pub password: String,
    pub protocol: String,
    pub port: u16,
    pub uid: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            database: String::new(),
            login: "admin".to_string(),
            password: String::new(),
            protocol: "jsonrpcs".to_string(),
            port: 443,
            uid: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Outputs with more rows are split into chunks.
    pub row_threshold: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { row_threshold: 5000 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchingConfig {
    /// Report every unresolved column instead of stopping at the first.
    pub collect_all: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceConfig {
    /// Exporter domain expression; `[]` when unset.
    pub domain: Option<String>,
}

impl Settings {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exporter.program.trim().is_empty() {
            return Err(ConfigError::Validation("exporter.program is empty".into()));
        }
        if self.exporter.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "exporter.timeout_secs must be > 0".into(),
            ));
        }
        if self.exporter.workers == 0 || self.exporter.batch_size == 0 {
            return Err(ConfigError::Validation(
                "exporter.workers and exporter.batch_size must be > 0".into(),
            ));
        }
        if self.exporter.separator.len() != 1 {
            return Err(ConfigError::Validation(format!(
                "exporter.separator must be a single ASCII character, got '{}'",
                self.exporter.separator
            )));
        }
        if self.export.row_threshold == 0 {
            return Err(ConfigError::Validation(
                "export.row_threshold must be > 0".into(),
            ));
        }
        for name in self.references.keys() {
            if !REFERENCE_ENTITIES.contains(&name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "unknown reference entity '{name}' (expected one of: {})",
                    REFERENCE_ENTITIES.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Default settings file location.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("erpprep")
            .join("config.toml")
    }

    /// Load from `path` if given (it must exist), else from the default
    /// location if present, else built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = Self::config_path();
                if !default.exists() {
                    log::debug!("no settings file at {}, using defaults", default.display());
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        log::debug!("settings loaded from {}", path.display());
        Self::from_toml(&contents)
    }

    /// Directory the exporter runs in.
    pub fn exporter_dir(&self) -> &Path {
        self.exporter
            .working_dir
            .as_deref()
            .unwrap_or(&self.paths.work)
    }

    /// Location of an upload: `path` itself when absolute or present,
    /// otherwise `path` under the uploads directory.
    pub fn upload_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            path.to_path_buf()
        } else {
            self.paths.uploads.join(path)
        }
    }

    /// Domain override for an entity.
    pub fn domain(&self, entity: &str) -> Option<&str> {
        self.references.get(entity)?.domain.as_deref()
    }
}
