// File I/O: upload loading and import file export

pub mod csv;
pub mod export;
pub mod loader;
pub mod xlsx;

pub use export::{ChunkedExporter, ExportArtifact, DEFAULT_ROW_THRESHOLD};
pub use loader::{header_names, headers, load, parse_separator, Format, Loader};
