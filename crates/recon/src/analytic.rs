//! Analytic-distribution rendering for customer order lines.
//!
//! The analytic account reference resolves to a list-like literal such as
//! `[42, 'AX01']`. The ERP expects a distribution object assigning the whole
//! line to one account: `{"AX01": 100.0}`.

use erpprep_core::{Cell, Table};

use crate::model::{ComparisonSpec, ValueRender};

/// Business column carrying the analytic account code.
pub const ANALYTIC_COLUMN: &str = "Analytique";

/// Share assigned to the single analytic account.
const FULL_SHARE: &str = "100.0";

/// Render a resolved reference cell as a distribution. Null stays null.
pub fn distribution(cell: &Cell) -> Cell {
    if cell.is_sentinel() {
        return Cell::Null;
    }
    let raw = cell.display();
    let account = match parse_list_literal(&raw) {
        Some(items) => items
            .get(1)
            .or_else(|| items.first())
            .cloned()
            .unwrap_or_default(),
        None => raw.trim().to_string(),
    };
    // serde_json escapes quotes and backslashes in the key.
    let key = serde_json::Value::String(account).to_string();
    Cell::Text(format!("{{{key}: {FULL_SHARE}}}"))
}

/// Split a `[a, b, ...]` or `(a, b, ...)` literal into unquoted items.
fn parse_list_literal(raw: &str) -> Option<Vec<String>> {
    let s = raw.trim();
    let inner = s
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .or_else(|| s.strip_prefix('(').and_then(|r| r.strip_suffix(')')))?;
    let items = inner
        .split(',')
        .map(|item| {
            let item = item.trim();
            item.strip_prefix('\'')
                .and_then(|i| i.strip_suffix('\''))
                .or_else(|| item.strip_prefix('"').and_then(|i| i.strip_suffix('"')))
                .unwrap_or(item)
                .to_string()
        })
        .filter(|item| !item.is_empty())
        .collect();
    Some(items)
}

/// Comparison resolving analytic codes held in `column` against the analytic
/// account export. Blank codes are allowed; the line simply has no
/// distribution.
pub fn analytic_comparison<'a>(
    reference: &'a Table,
    column: &str,
    key_column: &str,
    value_column: &str,
) -> ComparisonSpec<'a> {
    ComparisonSpec::new(reference, column, key_column, value_column)
        .labelled(ANALYTIC_COLUMN)
        .allow_blank()
        .rendered_as(ValueRender::AnalyticDistribution)
}
