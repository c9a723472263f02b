use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use erpprep_core::{Failure, FailureDetail, FailureKind, PipelineResult};

use crate::connection::{ensure_connection_file, ConnectionInfo};

/// Poll interval while waiting for the exporter to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One model export.
#[derive(Debug, Clone)]
pub struct ExportRequest<'a> {
    pub model: &'a str,
    pub fields: &'a [&'a str],
    pub domain: &'a str,
    pub output: &'a Path,
}

/// Something that can dump an ERP model to a CSV file.
pub trait Exporter {
    fn export(&self, request: &ExportRequest<'_>) -> PipelineResult<()>;
}

/// Runs the external export script as a subprocess, without a shell.
#[derive(Debug, Clone)]
pub struct CommandExporter {
    pub program: String,
    /// Leading arguments, typically the script path.
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub connection: ConnectionInfo,
    pub timeout: Duration,
    pub workers: u32,
    pub batch_size: u32,
    pub separator: char,
    pub encoding: String,
}

impl CommandExporter {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            connection: ConnectionInfo::default(),
            timeout: Duration::from_secs(3600),
            workers: 2,
            batch_size: 200,
            separator: ';',
            encoding: "utf-8-sig".to_string(),
        }
    }

    /// Full argument vector for `request`.
    pub fn command_args(&self, connection_file: &Path, request: &ExportRequest<'_>) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "-c".to_string(),
            connection_file.display().to_string(),
            format!("--file={}", request.output.display()),
            format!("--model={}", request.model),
            format!("--field={}", request.fields.join(",")),
            format!("--worker={}", self.workers),
            format!("--size={}", self.batch_size),
            format!("--domain={}", request.domain),
            format!("--sep={}", self.separator),
            format!("--encoding={}", self.encoding),
        ]);
        args
    }
}

impl Exporter for CommandExporter {
    fn export(&self, request: &ExportRequest<'_>) -> PipelineResult<()> {
        // The child runs inside `working_dir`, so paths handed to it must not
        // be relative to our own directory.
        let connection_file =
            absolute(&ensure_connection_file(&self.working_dir, &self.connection)?)?;
        let output = absolute(request.output)?;
        let request = ExportRequest {
            output: &output,
            ..request.clone()
        };
        let args = self.command_args(&connection_file, &request);
        log::info!("exporting {} with {}", request.model, self.program);
        log::debug!("args: {:?}", args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Failure::new(
                    FailureKind::ExportError,
                    format!("cannot start exporter '{}': {e}", self.program),
                )
            })?;

        // Drain both pipes so a chatty exporter never blocks on a full buffer.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait(); // Always wait to reap zombie
                        return Err(Failure::new(
                            FailureKind::ExportTimeout,
                            format!(
                                "export of {} did not finish within {}s",
                                request.model,
                                self.timeout.as_secs()
                            ),
                        ));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    return Err(Failure::new(
                        FailureKind::ExportError,
                        format!("cannot wait for exporter: {e}"),
                    ));
                }
            }
        };

        let out = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let err = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        if !out.trim().is_empty() {
            log::debug!("exporter stdout: {}", out.trim());
        }

        if !err.trim().is_empty() {
            return Err(Failure::new(
                FailureKind::ExportError,
                format!("export of {} failed: {}", request.model, err.trim()),
            )
            .with_detail(FailureDetail::Text(err)));
        }
        if !status.success() {
            return Err(Failure::new(
                FailureKind::ExportError,
                format!("export of {} failed: exporter exited with {status}", request.model),
            ));
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> PipelineResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|e| {
            Failure::new(
                FailureKind::ExportError,
                format!("cannot resolve {}: {e}", path.display()),
            )
        })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}
