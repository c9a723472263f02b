use erpprep_core::Table;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Cross-reference matching
// ---------------------------------------------------------------------------

/// How a matched reference value is written into the target column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueRender {
    /// Reference value as-is (trimmed).
    #[default]
    Plain,
    /// Single-account analytic distribution: `{"<id>": 100.0}`.
    AnalyticDistribution,
}

/// One column of the working table resolved against one reference table.
#[derive(Debug, Clone)]
pub struct ComparisonSpec<'a> {
    pub reference: &'a Table,
    pub source_column: String,
    pub key_column: String,
    pub value_column: String,
    pub target_column: String,
    /// Business column name used in failure reports.
    pub label: String,
    /// Blank source cells pass through as null instead of failing.
    pub allow_blank: bool,
    pub render: ValueRender,
}

impl<'a> ComparisonSpec<'a> {
    /// Plain comparison writing back into the source column.
    pub fn new(reference: &'a Table, column: &str, key_column: &str, value_column: &str) -> Self {
        Self {
            reference,
            source_column: column.to_string(),
            key_column: key_column.to_string(),
            value_column: value_column.to_string(),
            target_column: column.to_string(),
            label: column.to_string(),
            allow_blank: false,
            render: ValueRender::Plain,
        }
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target_column = target.to_string();
        self
    }

    pub fn labelled(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn allow_blank(mut self) -> Self {
        self.allow_blank = true;
        self
    }

    pub fn rendered_as(mut self, render: ValueRender) -> Self {
        self.render = render;
        self
    }
}

/// Whether the matcher stops at the first comparison with unresolved values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    #[default]
    FailFast,
    CollectAll,
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// One output chunk: rows `[start, end)` plus, when the split was not at the
/// end of the table, the boundary row `overlap` repeated as its last line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
    pub overlap: Option<usize>,
    /// No continuation row was found; the split fell on the threshold.
    pub forced: bool,
}

impl ChunkSpan {
    /// Row indices written to this chunk, in order.
    pub fn rows(&self) -> impl Iterator<Item = usize> {
        (self.start..self.end).chain(self.overlap)
    }

    pub fn len(&self) -> usize {
        self.end - self.start + usize::from(self.overlap.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
