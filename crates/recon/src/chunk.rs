use erpprep_core::{Failure, PipelineResult, Table};

use crate::model::ChunkSpan;

/// Plan the split of `table` into chunks of at most `threshold` rows (plus
/// one overlap row).
///
/// From each chunk start the planner jumps `threshold` rows ahead, then walks
/// back to the nearest continuation row (every `required` cell blank) and
/// splits there, so a split never lands on a header line. With no
/// continuation row in range the split is forced at the threshold. The row
/// at the split opens the next chunk and is also repeated as the last row of
/// the current one.
pub fn plan_chunks<S: AsRef<str>>(
    table: &Table,
    threshold: usize,
    required: &[S],
) -> PipelineResult<Vec<ChunkSpan>> {
    let columns = required_indices(table, required)?;
    let threshold = threshold.max(1);
    let rows = table.row_count();

    let mut spans = Vec::new();
    let mut start = 0;
    while start < rows {
        if rows - start <= threshold {
            spans.push(ChunkSpan {
                start,
                end: rows,
                overlap: None,
                forced: false,
            });
            break;
        }

        let boundary = start + threshold;
        let split = (start + 1..=boundary)
            .rev()
            .find(|&row| is_continuation(table, row, &columns));
        let (end, forced) = match split {
            Some(row) => (row, false),
            None => (boundary, true),
        };
        if forced {
            log::warn!("no continuation line between rows {start} and {boundary}; splitting at {boundary}");
        }
        spans.push(ChunkSpan {
            start,
            end,
            overlap: Some(end),
            forced,
        });
        start = end;
    }
    Ok(spans)
}

/// Rows of one planned chunk as a table.
pub fn chunk_table(table: &Table, span: &ChunkSpan) -> Table {
    let mut chunk = table.slice(span.start, span.end);
    if let Some(row) = span.overlap {
        chunk.push_row_at(table.row_cells(row), table.line(row));
    }
    chunk
}

/// A line that continues the previous header line: every required cell blank.
pub fn is_continuation(table: &Table, row: usize, columns: &[usize]) -> bool {
    let cells: Vec<_> = table.row(row).collect();
    columns.iter().all(|&i| cells[i].is_blank())
}

fn required_indices<S: AsRef<str>>(table: &Table, required: &[S]) -> PipelineResult<Vec<usize>> {
    let mut indices = Vec::with_capacity(required.len());
    let mut missing = Vec::new();
    for name in required {
        match table.column_index(name.as_ref()) {
            Some(i) => indices.push(i),
            None => missing.push(name.as_ref().to_string()),
        }
    }
    if missing.is_empty() {
        Ok(indices)
    } else {
        Err(Failure::missing_columns(missing))
    }
}
