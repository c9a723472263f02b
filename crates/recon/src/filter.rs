use std::collections::HashSet;

use erpprep_core::{Cell, Failure, FailureKind, PipelineResult, Table};

use crate::matcher::check_blank;
use crate::schema::DocumentTypeSchema;

/// Marker column added while duplicates are processed.
pub const DUPLICATE_MARKER: &str = "Doublon";

const MARK_DUPLICATE: &str = "OUI";
const MARK_FIRST: &str = "NON";

/// Marks repeated business keys and blanks their header columns, so that
/// every order or invoice keeps a single header line followed by its
/// continuation lines.
#[derive(Debug, Clone)]
pub struct DuplicateFilter {
    pub marker: String,
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self {
            marker: DUPLICATE_MARKER.to_string(),
        }
    }
}

impl DuplicateFilter {
    /// Every schema column present and every `entete` cell filled, on a
    /// table already renamed to ERP field paths. Failures name the business
    /// columns.
    pub fn validate(&self, table: &Table, schema: &DocumentTypeSchema) -> PipelineResult<()> {
        let missing: Vec<String> = schema
            .column
            .iter()
            .filter(|c| !table.has_column(schema.field(c).unwrap_or(**c)))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Failure::missing_columns(missing));
        }
        for column in schema.entete {
            check_blank(table, schema.field(column).unwrap_or(*column), column)?;
        }
        Ok(())
    }

    /// Add the marker column: `OUI` on every row whose key was already seen.
    /// Returns the number of duplicates.
    pub fn mark(&self, table: &mut Table, key_column: &str) -> PipelineResult<usize> {
        let keys = table
            .column(key_column)
            .ok_or_else(|| Failure::missing_columns(vec![key_column.to_string()]))?;

        let mut seen = HashSet::with_capacity(keys.len());
        let marks: Vec<Cell> = keys
            .iter()
            .map(|key| {
                let first = seen.insert(key.display());
                Cell::Text(if first { MARK_FIRST } else { MARK_DUPLICATE }.to_string())
            })
            .collect();
        let duplicates = marks
            .iter()
            .filter(|m| **m == Cell::Text(MARK_DUPLICATE.to_string()))
            .count();

        table
            .set_column(&self.marker, marks)
            .map_err(|e| Failure::new(FailureKind::MissingColumn, e))?;
        Ok(duplicates)
    }

    /// Mark duplicates of `key_column`, clear `clear_columns` on them, then
    /// drop the marker. The first occurrence of a key is left untouched.
    pub fn filter_duplicates<S: AsRef<str>>(
        &self,
        mut table: Table,
        key_column: &str,
        clear_columns: &[S],
    ) -> PipelineResult<Table> {
        check_blank(&table, key_column, key_column)?;
        let duplicates = self.mark(&mut table, key_column)?;

        let flags: Vec<bool> = table
            .column(&self.marker)
            .unwrap_or_default()
            .iter()
            .map(|m| m.display() == MARK_DUPLICATE)
            .collect();

        for column in clear_columns {
            if let Some(cells) = table.column_mut(column.as_ref()) {
                for (cell, duplicate) in cells.iter_mut().zip(&flags) {
                    if *duplicate {
                        *cell = Cell::Null;
                    }
                }
            }
        }

        table.drop_column(&self.marker);
        log::debug!("{duplicates} continuation line(s) on '{key_column}'");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DocumentType;

    fn text(s: &str) -> Cell {
        Cell::from_input(s)
    }

    fn orders() -> Table {
        Table::from_rows(
            &["Référence", "Date", "Client", "Produit"],
            vec![
                vec![text("A"), text("2023-02-01"), text("C1"), text("P1")],
                vec![text("A"), text("2023-02-01"), text("C1"), text("P2")],
                vec![text("B"), text("2023-02-02"), text("C2"), text("P1")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn second_occurrence_is_cleared() {
        let out = DuplicateFilter::default()
            .filter_duplicates(orders(), "Référence", &["Référence", "Date", "Client"])
            .unwrap();

        assert_eq!(out.row_count(), 3);
        assert_eq!(out.cell(0, "Référence"), Some(&text("A")));
        assert_eq!(out.cell(1, "Référence"), Some(&Cell::Null));
        assert_eq!(out.cell(1, "Client"), Some(&Cell::Null));
        assert_eq!(out.cell(1, "Produit"), Some(&text("P2")));
        assert_eq!(out.cell(2, "Client"), Some(&text("C2")));
    }

    #[test]
    fn marker_is_dropped() {
        let out = DuplicateFilter::default()
            .filter_duplicates(orders(), "Référence", &["Client"])
            .unwrap();
        assert!(!out.has_column(DUPLICATE_MARKER));
        assert_eq!(out.column_names(), orders().column_names());
    }

    #[test]
    fn mark_counts_duplicates() {
        let mut t = orders();
        let n = DuplicateFilter::default().mark(&mut t, "Référence").unwrap();
        assert_eq!(n, 1);
        assert_eq!(t.cell(1, DUPLICATE_MARKER), Some(&text("OUI")));
        assert_eq!(t.cell(2, DUPLICATE_MARKER), Some(&text("NON")));
    }

    #[test]
    fn blank_key_is_rejected() {
        let mut t = orders();
        t.column_mut("Référence").unwrap()[2] = Cell::Null;
        let err = DuplicateFilter::default()
            .filter_duplicates(t, "Référence", &["Client"])
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::BlankRequiredField);
    }

    #[test]
    fn validate_requires_schema_columns_and_entete() {
        let filter = DuplicateFilter::default();
        let schema = DocumentType::CustomerOrder.schema();
        let err = filter.validate(&orders(), schema).unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingColumn);

        let mut full = Table::new(&schema.output_columns()).unwrap();
        full.push_row(vec![text("A"), Cell::Null, text("C1")]);
        let err = filter.validate(&full, schema).unwrap_err();
        assert_eq!(err.kind, FailureKind::BlankRequiredField);
        assert!(err.message.contains("'Date'"));
    }
}
