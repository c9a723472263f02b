//! `erpprep-recon` — reshaping and reconciliation of uploaded ERP import files.
//!
//! Pure engine crate: receives loaded tables and reference tables, returns
//! import-ready tables or a `Failure`. No filesystem or subprocess access.

pub mod analytic;
pub mod chunk;
pub mod filter;
pub mod mapper;
pub mod matcher;
pub mod model;
pub mod schema;

pub use chunk::{chunk_table, plan_chunks};
pub use filter::DuplicateFilter;
pub use mapper::ColumnMapper;
pub use matcher::{Matcher, Unmatched};
pub use model::{ChunkSpan, ComparisonSpec, MatchPolicy, ValueRender};
pub use schema::{DocumentType, DocumentTypeSchema};
