use chrono::NaiveDate;
use erpprep_core::{Cell, Failure, FailureDetail, FailureKind, PipelineResult, Table};

use crate::schema::DocumentTypeSchema;

/// Business column holding the compact order/invoice date.
pub const DATE_COLUMN: &str = "Date";

/// Width of a compact `DDMMYY` date.
const COMPACT_DATE_WIDTH: usize = 6;

/// Reshapes an uploaded table into the ERP import layout.
#[derive(Debug, Clone)]
pub struct ColumnMapper {
    pub date_column: String,
}

impl Default for ColumnMapper {
    fn default() -> Self {
        Self {
            date_column: DATE_COLUMN.to_string(),
        }
    }
}

impl ColumnMapper {
    /// Date reformat, then projection, then rename.
    pub fn map_columns(&self, mut table: Table, schema: &DocumentTypeSchema) -> PipelineResult<Table> {
        self.reformat_dates(&mut table)?;
        let mut projected = self.project(&table, schema);
        self.rename(&mut projected, schema)?;
        Ok(projected)
    }

    /// Rewrite every `Date` cell from `DDMMYY` to `YYYY-MM-DD`. Null cells are
    /// left alone; the filter reports them as blank header fields.
    pub fn reformat_dates(&self, table: &mut Table) -> PipelineResult<()> {
        let Some(cells) = table.column_mut(&self.date_column) else {
            return Ok(());
        };
        for cell in cells.iter_mut() {
            if cell.is_blank() {
                continue;
            }
            let date = parse_compact_date(cell)?;
            *cell = Cell::Text(date.format("%Y-%m-%d").to_string());
        }
        Ok(())
    }

    /// Keep the schema columns that are present, in schema order.
    pub fn project(&self, table: &Table, schema: &DocumentTypeSchema) -> Table {
        table.select(schema.column)
    }

    pub fn rename(&self, table: &mut Table, schema: &DocumentTypeSchema) -> PipelineResult<()> {
        table
            .rename(schema.mapping.iter().copied())
            .map_err(|e| Failure::new(FailureKind::MissingColumn, e))
    }

    /// Fail with `MissingColumn` unless every schema column is present.
    pub fn require_columns(&self, table: &Table, schema: &DocumentTypeSchema) -> PipelineResult<()> {
        let missing: Vec<String> = schema
            .column
            .iter()
            .filter(|c| !table.has_column(c))
            .map(|c| c.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Failure::missing_columns(missing))
        }
    }

    /// Rename uploaded headers to schema column names.
    ///
    /// `assignments` pairs a schema column with the uploaded header that holds
    /// its data.
    pub fn assign_columns(
        &self,
        table: &mut Table,
        schema: &DocumentTypeSchema,
        assignments: &[(String, String)],
    ) -> PipelineResult<()> {
        if assignments.is_empty() {
            return Err(Failure::new(
                FailureKind::MissingColumn,
                "no column assignment given",
            ));
        }

        let unknown: Vec<String> = assignments
            .iter()
            .map(|(target, _)| target.trim())
            .filter(|target| !schema.column.contains(target))
            .map(str::to_string)
            .collect();
        if !unknown.is_empty() {
            return Err(Failure::new(
                FailureKind::MissingColumn,
                format!("not a schema column: {}", unknown.join(", ")),
            )
            .with_detail(FailureDetail::Values(unknown)));
        }

        let absent: Vec<String> = assignments
            .iter()
            .map(|(_, source)| source.trim())
            .filter(|source| !table.has_column(source))
            .map(str::to_string)
            .collect();
        if !absent.is_empty() {
            return Err(Failure::missing_columns(absent));
        }

        table
            .rename(assignments.iter().map(|(target, source)| (source, target)))
            .map_err(|e| Failure::new(FailureKind::MissingColumn, e))
    }
}

/// Parse a compact `DDMMYY` cell. Numbers are zero-padded to six digits; an
/// already normalized `YYYY-MM-DD` value is accepted unchanged.
pub fn parse_compact_date(cell: &Cell) -> PipelineResult<NaiveDate> {
    let raw = match cell {
        Cell::Number(n) if n.fract() == 0.0 && *n >= 0.0 => {
            format!("{:0width$}", *n as u64, width = COMPACT_DATE_WIDTH)
        }
        other => other.display().trim().to_string(),
    };

    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Ok(date);
    }

    let invalid = || {
        Failure::new(
            FailureKind::DateFormatError,
            format!("invalid date '{raw}' (expected DDMMYY)"),
        )
        .with_detail(FailureDetail::Text(raw.clone()))
    };

    if raw.len() != COMPACT_DATE_WIDTH || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let part = |range: std::ops::Range<usize>| raw[range].parse::<u32>().ok();
    let (Some(day), Some(month), Some(yy)) = (part(0..2), part(2..4), part(4..6)) else {
        return Err(invalid());
    };
    // Two-digit years pivot like strptime's %y.
    let year = if yy < 69 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(year as i32, month, day).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DocumentType;

    fn text(s: &str) -> Cell {
        Cell::from_input(s)
    }

    #[test]
    fn compact_date_is_reformatted() {
        let d = parse_compact_date(&text("010223")).unwrap();
        assert_eq!(d.format("%Y-%m-%d").to_string(), "2023-02-01");
    }

    #[test]
    fn short_value_is_rejected() {
        let err = parse_compact_date(&text("99")).unwrap_err();
        assert_eq!(err.kind, FailureKind::DateFormatError);
        assert_eq!(err.detail, FailureDetail::Text("99".into()));
    }

    #[test]
    fn impossible_day_is_rejected() {
        assert!(parse_compact_date(&text("320123")).is_err());
        assert!(parse_compact_date(&text("01a223")).is_err());
    }

    #[test]
    fn numeric_cell_is_zero_padded() {
        let d = parse_compact_date(&Cell::Number(10223.0)).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2023, 2, 1).unwrap());
    }

    #[test]
    fn iso_date_passes_through() {
        let d = parse_compact_date(&text("2023-02-01")).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2023, 2, 1).unwrap());
    }

    #[test]
    fn century_pivot() {
        assert_eq!(parse_compact_date(&text("311299")).unwrap().format("%Y").to_string(), "1999");
        assert_eq!(parse_compact_date(&text("010168")).unwrap().format("%Y").to_string(), "2068");
    }

    #[test]
    fn map_columns_projects_then_renames() {
        let table = Table::from_rows(
            &["Extra", "Quantité", "Référence", " Date "],
            vec![vec![text("x"), Cell::Number(2.0), text("R1"), text("150324")]],
        )
        .unwrap();
        let schema = DocumentType::SupplierInvoice.schema();
        let out = ColumnMapper::default().map_columns(table, schema).unwrap();

        assert_eq!(
            out.column_names(),
            &["origine_ref", "date", "invoice_line_ids/quantity"]
        );
        assert_eq!(out.cell(0, "date"), Some(&text("2024-03-15")));
    }

    #[test]
    fn blank_date_is_left_for_the_filter() {
        let mut table = Table::from_rows(&["Date"], vec![vec![Cell::Null]]).unwrap();
        ColumnMapper::default().reformat_dates(&mut table).unwrap();
        assert_eq!(table.cell(0, "Date"), Some(&Cell::Null));
    }

    #[test]
    fn require_columns_lists_every_missing_one() {
        let table = Table::new(&["Référence", "Date"]).unwrap();
        let err = ColumnMapper::default()
            .require_columns(&table, DocumentType::SupplierInvoice.schema())
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingColumn);
        match err.detail {
            FailureDetail::Values(v) => assert_eq!(v.len(), 6),
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[test]
    fn assign_renames_uploaded_headers() {
        let mut table = Table::new(&["Nom client", "Ref cde"]).unwrap();
        let schema = DocumentType::CustomerOrder.schema();
        ColumnMapper::default()
            .assign_columns(
                &mut table,
                schema,
                &[
                    ("Client".into(), "Nom client".into()),
                    ("Référence".into(), " Ref cde".into()),
                ],
            )
            .unwrap();
        assert_eq!(table.column_names(), &["Client", "Référence"]);
    }

    #[test]
    fn assign_rejects_unknown_schema_column() {
        let mut table = Table::new(&["a"]).unwrap();
        let schema = DocumentType::SupplierInvoice.schema();
        let mapper = ColumnMapper::default();

        let err = mapper
            .assign_columns(&mut table, schema, &[("Analytique".into(), "a".into())])
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingColumn);

        let err = mapper.assign_columns(&mut table, schema, &[]).unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingColumn);

        let err = mapper
            .assign_columns(&mut table, schema, &[("Date".into(), "nope".into())])
            .unwrap_err();
        assert_eq!(err.detail, FailureDetail::Values(vec!["nope".into()]));
    }
}
