//! `erpprep-erp` — reference data from the ERP.
//!
//! The ERP is reached only through an external export script run as a
//! subprocess. Its CSV output is cached in a working directory and loaded
//! as reference tables for the matcher.

pub mod connection;
pub mod exporter;
pub mod resolver;

pub use connection::{ensure_connection_file, ConnectionInfo, CONNECTION_FILE};
pub use exporter::{CommandExporter, ExportRequest, Exporter};
pub use resolver::{EntityKind, ReferenceResolver};
