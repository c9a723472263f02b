// erpprep CLI library: pipeline orchestration and downloads management.

pub mod files;
pub mod pipeline;

pub use files::{Downloads, FileEntry};
pub use pipeline::{default_output, CleanReport, Pipeline};
