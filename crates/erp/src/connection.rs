use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use erpprep_core::{Failure, PipelineResult};

/// File name of the exporter's connection settings, inside its working
/// directory.
pub const CONNECTION_FILE: &str = "connection.conf";

/// ERP server credentials handed to the exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub hostname: String,
    pub database: String,
    pub login: String,
    pub password: String,
    pub protocol: String,
    pub port: u16,
    pub uid: u32,
}

impl Default for ConnectionInfo {
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

impl ConnectionInfo {
    /// INI rendering with a single `[Connection]` section.
    pub fn render(&self) -> String {
        let mut out = String::from("[Connection]\n");
        for (key, value) in [
            ("hostname", self.hostname.clone()),
            ("database", self.database.clone()),
            ("login", self.login.clone()),
            ("password", self.password.clone()),
            ("protocol", self.protocol.clone()),
            ("port", self.port.to_string()),
            ("uid", self.uid.to_string()),
        ] {
            let _ = writeln!(out, "{key} = {value}");
        }
        out
    }
}

/// Write `connection.conf` into `dir` unless it already exists.
///
/// The file is written to a temporary name and renamed, so a reader never
/// sees a partial file.
pub fn ensure_connection_file(dir: &Path, info: &ConnectionInfo) -> PipelineResult<PathBuf> {
    let path = dir.join(CONNECTION_FILE);
    if path.exists() {
        return Ok(path);
    }

    fs::create_dir_all(dir)
        .map_err(|e| Failure::write(format!("cannot create {}: {e}", dir.display())))?;
    let tmp_path = path.with_extension("conf.tmp");
    fs::write(&tmp_path, info.render())
        .map_err(|e| Failure::write(format!("cannot write {}: {e}", tmp_path.display())))?;
    fs::rename(&tmp_path, &path)
        .map_err(|e| Failure::write(format!("failed to rename tmp to {}: {e}", path.display())))?;
    log::info!("wrote {}", path.display());
    Ok(path)
}
