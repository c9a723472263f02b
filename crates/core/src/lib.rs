//! `erpprep-core` — shared data model for the import pipeline.
//!
//! A [`Table`] is the in-memory shape every stage consumes and produces, and
//! [`Failure`] is the single error value every stage returns.

pub mod failure;
pub mod table;

pub use failure::{Failure, FailureDetail, FailureKind, PipelineResult, RowDetail, UnresolvedValues};
pub use table::{Cell, Table};
