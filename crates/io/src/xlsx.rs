// Excel import/export

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{Duration, NaiveDate};
use erpprep_core::{Cell, Table};
use rust_xlsxwriter::{Format, Workbook};

use crate::loader::header_names;

/// Excel sheet names are limited to 31 characters.
const MAX_SHEET_NAME: usize = 31;

/// Read the first sheet. Its first row is the header.
pub fn read_table(path: &Path) -> Result<Table, String> {
    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| format!("Failed to open Excel file: {}", e))?;

    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        return Err("Excel file contains no sheets".to_string());
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| format!("Failed to read sheet '{}': {}", sheet_name, e))?;

    // Sheet row of the header, 1-based.
    let first_line = range.start().map_or(1, |(row, _)| row as usize + 1);
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Table::new::<&str>(&[]);
    };
    let headers: Vec<String> = header.iter().map(|c| to_cell(c).display()).collect();
    let mut table = Table::new(&header_names(&headers))?;

    for (i, row) in rows.enumerate() {
        let cells: Vec<Cell> = row.iter().map(to_cell).collect();
        if cells.iter().all(Cell::is_blank) {
            continue;
        }
        table.push_row_at(cells, first_line + i + 1);
    }
    Ok(table)
}

/// Header row of the first sheet.
pub fn read_headers(path: &Path) -> Result<Vec<String>, String> {
    // calamine loads the whole range either way
    Ok(read_table(path)?.column_names().to_vec())
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Null,
        Data::String(s) => Cell::from_input(s),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::Error(e) => Cell::Text(format!("#{:?}", e)),
        Data::DateTime(dt) => match serial_to_date(dt.as_f64()) {
            Some(date) => Cell::Text(date.format("%Y-%m-%d").to_string()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => Cell::from_input(s),
        Data::DurationIso(s) => Cell::from_input(s),
    }
}

/// Excel serial date (1900 system) to a calendar date.
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    // Day 0 is 1899-12-30 once Excel's phantom 1900-02-29 is accounted for.
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Write one worksheet per `(name, table)` pair, header row in bold.
pub fn write_workbook(path: &Path, sheets: &[(String, Table)]) -> Result<(), String> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    for (name, table) in sheets {
        let name: String = name.chars().take(MAX_SHEET_NAME).collect();
        let worksheet = workbook
            .add_worksheet()
            .set_name(&name)
            .map_err(|e| format!("Failed to create sheet '{}': {}", name, e))?;

        for (col, header) in table.column_names().iter().enumerate() {
            worksheet
                .write_string_with_format(0, col as u16, header, &header_format)
                .map_err(|e| format!("Failed to write header: {}", e))?;
        }

        for row in 0..table.row_count() {
            let xl_row = (row + 1) as u32;
            for (col, cell) in table.row(row).enumerate() {
                let written = match cell {
                    Cell::Null => continue,
                    Cell::Text(s) => worksheet.write_string(xl_row, col as u16, s),
                    Cell::Number(n) => worksheet.write_number(xl_row, col as u16, *n),
                };
                written.map_err(|e| format!("Failed to write cell: {}", e))?;
            }
        }
    }

    workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn serial_dates() {
        assert_eq!(serial_to_date(44958.0), NaiveDate::from_ymd_opt(2023, 2, 1));
        assert_eq!(serial_to_date(44958.75), NaiveDate::from_ymd_opt(2023, 2, 1));
        assert_eq!(serial_to_date(-3.0), None);
    }

    #[test]
    fn workbook_roundtrip_first_sheet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        let first = Table::from_rows(
            &["Référence", "Quantité", "Note"],
            vec![
                vec![Cell::from("A"), Cell::Number(2.0), Cell::Null],
                vec![Cell::from("B"), Cell::Number(1.5), Cell::from("x")],
            ],
        )
        .unwrap();
        let second = Table::from_rows(&["other"], vec![vec![Cell::from("z")]]).unwrap();

        write_workbook(
            &path,
            &[("Part_1".to_string(), first), ("Part_2".to_string(), second)],
        )
        .unwrap();

        let back = read_table(&path).unwrap();
        assert_eq!(back.column_names(), &["Référence", "Quantité", "Note"]);
        assert_eq!(back.row_count(), 2);
        assert_eq!(back.cell(0, "Quantité"), Some(&Cell::Number(2.0)));
        assert_eq!(back.cell(0, "Note"), Some(&Cell::Null));
        assert_eq!(back.cell(1, "Note"), Some(&Cell::from("x")));
        assert_eq!(back.line(1), 3);

        let mut wb: Sheets<_> = open_workbook_auto(&path).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Part_1".to_string(), "Part_2".to_string()]);
        assert!(wb.worksheet_range("Part_2").is_ok());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(read_table(&dir.path().join("none.xlsx")).is_err());
    }
}
