use std::collections::{BTreeMap, HashMap};

use erpprep_core::{
    Cell, Failure, FailureDetail, FailureKind, PipelineResult, RowDetail, Table, UnresolvedValues,
};

use crate::analytic;
use crate::model::{ComparisonSpec, MatchPolicy, ValueRender};

/// Column label -> values left unresolved by its comparison.
pub type Unmatched = BTreeMap<String, UnresolvedValues>;

/// Resolves business codes to ERP identifiers using reference tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher {
    pub policy: MatchPolicy,
}

impl Matcher {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    /// Run every comparison in order.
    ///
    /// Fails on the first blank source cell. Unresolved values fail the run
    /// either at the first comparison that has any (`FailFast`) or after all
    /// comparisons have run (`CollectAll`).
    pub fn match_table(
        &self,
        mut table: Table,
        comparisons: &[ComparisonSpec<'_>],
    ) -> PipelineResult<(Table, Unmatched)> {
        let mut unmatched = Unmatched::new();
        for spec in comparisons {
            let unresolved = self.resolve(&mut table, spec)?;
            if unresolved.is_empty() {
                continue;
            }
            log::debug!(
                "{}: {} missing, {} invalid",
                spec.label,
                unresolved.missing.len(),
                unresolved.invalid.len()
            );
            unmatched.insert(spec.label.clone(), unresolved);
            if self.policy == MatchPolicy::FailFast {
                break;
            }
        }

        if unmatched.is_empty() {
            Ok((table, unmatched))
        } else {
            Err(unresolved_failure(unmatched))
        }
    }

    /// Apply one comparison to `table`, writing the target column. Returns
    /// the unresolved values; only blank source cells are an error here.
    pub fn resolve(&self, table: &mut Table, spec: &ComparisonSpec<'_>) -> PipelineResult<UnresolvedValues> {
        let source_idx = table
            .column_index(&spec.source_column)
            .ok_or_else(|| Failure::missing_columns(vec![spec.source_column.clone()]))?;
        let lookup = build_lookup(spec)?;

        if !spec.allow_blank {
            check_blank(table, &spec.source_column, &spec.label)?;
        }

        let target_idx = table.column_index(&spec.target_column);
        let sources = table.column(&spec.source_column).unwrap_or_default().to_vec();
        let mut written = Vec::with_capacity(table.row_count());
        let mut unresolved = UnresolvedValues::default();

        for (row, source) in sources.iter().enumerate() {
            let Some(key) = source.normalized_key() else {
                written.push(Cell::Null);
                continue;
            };

            let found = lookup.get(&key);
            let value = match found {
                Some(value) if !value.is_sentinel() => {
                    written.push(render(value, spec.render));
                    continue;
                }
                _ => {
                    written.push(Cell::Null);
                    source.display().trim().to_string()
                }
            };

            if !has_other_data(table, row, source_idx, target_idx) {
                continue;
            }
            let bucket = if found.is_some() {
                &mut unresolved.invalid
            } else {
                &mut unresolved.missing
            };
            if !bucket.contains(&value) {
                bucket.push(value);
            }
        }

        table
            .set_column(&spec.target_column, written)
            .map_err(|e| Failure::new(FailureKind::MissingColumn, e))?;
        Ok(unresolved)
    }
}

/// Key -> value map from the reference table. Keys are normalized and
/// sentinel keys never enter the map; a repeated key keeps the last value.
fn build_lookup(spec: &ComparisonSpec<'_>) -> PipelineResult<HashMap<String, Cell>> {
    let reference = spec.reference;
    let (Some(keys), Some(values)) = (
        reference.column(&spec.key_column),
        reference.column(&spec.value_column),
    ) else {
        let missing = [&spec.key_column, &spec.value_column]
            .into_iter()
            .filter(|c| !reference.has_column(c))
            .cloned()
            .collect();
        return Err(Failure::missing_columns(missing));
    };

    let mut lookup = HashMap::with_capacity(keys.len());
    for (key, value) in keys.iter().zip(values) {
        if let Some(key) = key.normalized_key() {
            let value = match value {
                Cell::Text(s) => Cell::from_input(s.trim()),
                other => other.clone(),
            };
            lookup.insert(key, value);
        }
    }
    Ok(lookup)
}

fn render(value: &Cell, render: ValueRender) -> Cell {
    match render {
        ValueRender::Plain => value.clone(),
        ValueRender::AnalyticDistribution => analytic::distribution(value),
    }
}

/// True when the row has a non-blank cell outside the source and target
/// columns.
fn has_other_data(table: &Table, row: usize, source_idx: usize, target_idx: Option<usize>) -> bool {
    table
        .row(row)
        .enumerate()
        .any(|(i, cell)| i != source_idx && Some(i) != target_idx && !cell.is_blank())
}

/// `BlankRequiredField` listing every row whose `column` cell is blank.
/// `label` names the column in the report.
pub fn check_blank(table: &Table, column: &str, label: &str) -> PipelineResult<()> {
    let cells = table
        .column(column)
        .ok_or_else(|| Failure::missing_columns(vec![column.to_string()]))?;
    let rows: Vec<RowDetail> = cells
        .iter()
        .enumerate()
        .filter(|(_, cell)| cell.is_blank())
        .map(|(i, _)| RowDetail {
            line: table.line(i),
            values: table.row_map(i),
        })
        .collect();

    if rows.is_empty() {
        return Ok(());
    }
    let lines: Vec<String> = rows.iter().map(|r| r.line.to_string()).collect();
    Err(Failure::new(
        FailureKind::BlankRequiredField,
        format!("column '{label}' is empty on line(s) {}", lines.join(", ")),
    )
    .with_detail(FailureDetail::Rows {
        column: label.to_string(),
        rows,
    }))
}

fn unresolved_failure(unmatched: Unmatched) -> Failure {
    let summary: Vec<String> = unmatched
        .iter()
        .map(|(column, values)| format!("{column}: {}", values.all().join(", ")))
        .collect();
    Failure::new(
        FailureKind::UnresolvedReferences,
        format!("unresolved references ({})", summary.join("; ")),
    )
    .with_detail(FailureDetail::Unresolved(unmatched))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
