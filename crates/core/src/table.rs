use std::collections::BTreeMap;

use serde::Serialize;

/// Literal values that spreadsheet exports use for "no value".
const SENTINELS: &[&str] = &["nan", "none", "null"];

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// A single scalar value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Null,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Build a cell from raw text. Whitespace-only input is `Null`; other
    /// text is kept verbatim.
    pub fn from_input(input: &str) -> Self {
        if input.trim().is_empty() {
            Cell::Null
        } else {
            Cell::Text(input.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Null, or text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(n) => n.is_nan(),
        }
    }

    /// Blank, or one of the `nan` / `None` / `null` literals.
    pub fn is_sentinel(&self) -> bool {
        if self.is_blank() {
            return true;
        }
        match self {
            Cell::Text(s) => {
                let lower = s.trim().to_lowercase();
                SENTINELS.contains(&lower.as_str())
            }
            _ => false,
        }
    }

    /// Text rendering used for CSV output and lookups.
    /// Integral numbers are written without a fractional part.
    pub fn display(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
        }
    }

    /// Lookup key: trimmed, lowercased. `None` for sentinels so they can
    /// never take part in a match.
    pub fn normalized_key(&self) -> Option<String> {
        if self.is_sentinel() {
            None
        } else {
            Some(self.display().trim().to_lowercase())
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::from_input(s)
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        if s.trim().is_empty() {
            Cell::Null
        } else {
            Cell::Text(s)
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Column-oriented table. All columns have `row_count()` cells and names are
/// unique.
///
/// Each row remembers the line it was read from, so reports still point at
/// the right source line after blank lines were skipped or rows filtered.
#[derive(Debug, Clone, Default)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Vec<Cell>>,
    rows: usize,
    lines: Vec<usize>,
}

/// Source line of the first data row under a single header line.
const FIRST_DATA_LINE: usize = 2;

/// Equality compares names and cells; source lines are ignored.
impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names && self.columns == other.columns && self.rows == other.rows
    }
}

impl Table {
    /// Empty table with the given headers. Names are trimmed; a name that
    /// repeats after trimming is rejected.
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Result<Self, String> {
        let mut names: Vec<String> = Vec::with_capacity(headers.len());
        for header in headers {
            let name = header.as_ref().trim().to_string();
            if names.contains(&name) {
                return Err(format!("duplicate column '{name}'"));
            }
            names.push(name);
        }
        let columns = vec![Vec::new(); names.len()];
        Ok(Self {
            names,
            columns,
            rows: 0,
            lines: Vec::new(),
        })
    }

    pub fn from_rows<S: AsRef<str>>(headers: &[S], rows: Vec<Vec<Cell>>) -> Result<Self, String> {
        let mut table = Self::new(headers)?;
        for row in rows {
            table.push_row(row);
        }
        Ok(table)
    }

    /// Append a row on the line after the previous one. Short rows are
    /// padded with `Null`; extra cells are dropped.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        let line = self.lines.last().map_or(FIRST_DATA_LINE, |l| l + 1);
        self.push_row_at(row, line);
    }

    /// Append a row read from source line `line` (1-based).
    pub fn push_row_at(&mut self, mut row: Vec<Cell>, line: usize) {
        row.resize(self.names.len(), Cell::Null);
        for (column, cell) in self.columns.iter_mut().zip(row) {
            column.push(cell);
        }
        self.rows += 1;
        self.lines.push(line);
    }

    /// Source line of row `index`.
    pub fn line(&self, index: usize) -> usize {
        self.lines
            .get(index)
            .copied()
            .unwrap_or(index + FIRST_DATA_LINE)
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.column_index(name).map(|i| self.columns[i].as_slice())
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<Cell>> {
        let idx = self.column_index(name)?;
        Some(&mut self.columns[idx])
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&Cell> {
        self.column(name).and_then(|c| c.get(row))
    }

    /// Replace a column's cells, or append a new column at the end.
    pub fn set_column(&mut self, name: &str, cells: Vec<Cell>) -> Result<(), String> {
        let name = name.trim();
        if !self.names.is_empty() && cells.len() != self.rows {
            return Err(format!(
                "column '{name}' has {} cells, table has {} rows",
                cells.len(),
                self.rows
            ));
        }
        match self.column_index(name) {
            Some(idx) => self.columns[idx] = cells,
            None => {
                if self.names.is_empty() && self.rows != cells.len() {
                    self.rows = cells.len();
                    self.lines = (FIRST_DATA_LINE..FIRST_DATA_LINE + cells.len()).collect();
                }
                self.names.push(name.to_string());
                self.columns.push(cells);
            }
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Vec<Cell>> {
        let idx = self.column_index(name)?;
        self.names.remove(idx);
        Some(self.columns.remove(idx))
    }

    /// Cells of one row, in column order.
    pub fn row(&self, index: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.columns.iter().map(move |c| &c[index])
    }

    /// Row as an owned vector.
    pub fn row_cells(&self, index: usize) -> Vec<Cell> {
        self.row(index).cloned().collect()
    }

    /// `column name -> displayed value` for one row; used in failure reports.
    pub fn row_map(&self, index: usize) -> BTreeMap<String, String> {
        self.names
            .iter()
            .zip(self.row(index))
            .map(|(name, cell)| (name.clone(), cell.display()))
            .collect()
    }

    /// True when every cell of the row is blank.
    pub fn is_row_blank(&self, index: usize) -> bool {
        self.row(index).all(Cell::is_blank)
    }

    /// New table holding the named columns that exist, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Table {
        let mut out = Table {
            names: Vec::new(),
            columns: Vec::new(),
            rows: self.rows,
            lines: self.lines.clone(),
        };
        for name in names {
            let name = name.as_ref();
            if out.names.iter().any(|n| n == name) {
                continue;
            }
            if let Some(idx) = self.column_index(name) {
                out.names.push(name.to_string());
                out.columns.push(self.columns[idx].clone());
            }
        }
        out
    }

    /// Rename columns. Both sides of each pair are trimmed; pairs whose
    /// source column is absent are ignored.
    pub fn rename<I, A, B>(&mut self, mapping: I) -> Result<(), String>
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
    {
        let mut renamed = self.names.clone();
        for (from, to) in mapping {
            let (from, to) = (from.as_ref().trim(), to.as_ref().trim());
            if let Some(idx) = self.column_index(from) {
                renamed[idx] = to.to_string();
            }
        }
        for (i, name) in renamed.iter().enumerate() {
            if renamed[..i].contains(name) {
                return Err(format!("rename produces duplicate column '{name}'"));
            }
        }
        self.names = renamed;
        Ok(())
    }

    /// Rows `[start, end)` as a new table.
    pub fn slice(&self, start: usize, end: usize) -> Table {
        let end = end.min(self.rows);
        let start = start.min(end);
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c[start..end].to_vec()).collect(),
            rows: end - start,
            lines: (start..end).map(|r| self.line(r)).collect(),
        }
    }

    /// Drop rows whose cells are all blank.
    pub fn without_blank_rows(&self) -> Table {
        let keep: Vec<usize> = (0..self.rows).filter(|&r| !self.is_row_blank(r)).collect();
        Table {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| keep.iter().map(|&r| c[r].clone()).collect())
                .collect(),
            rows: keep.len(),
            lines: keep.iter().map(|&r| self.line(r)).collect(),
        }
    }

    /// Row-wise concatenation. Columns are the union of all names, in first
    /// seen order; cells missing from a table are `Null`.
    pub fn concat(tables: &[Table]) -> Table {
        let mut names: Vec<String> = Vec::new();
        for table in tables {
            for name in &table.names {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }

        let mut out = Table {
            columns: vec![Vec::new(); names.len()],
            names,
            rows: 0,
            lines: Vec::new(),
        };
        for table in tables {
            for (out_idx, name) in out.names.iter().enumerate() {
                match table.column(name) {
                    Some(cells) => out.columns[out_idx].extend_from_slice(cells),
                    None => out.columns[out_idx]
                        .extend(std::iter::repeat(Cell::Null).take(table.rows)),
                }
            }
            out.rows += table.rows;
            out.lines.extend((0..table.rows).map(|r| table.line(r)));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::from_input(s)
    }

    fn sample() -> Table {
        Table::from_rows(
            &[" Ref ", "Qty"],
            vec![vec![text("A1"), Cell::Number(2.0)], vec![text("A2"), Cell::Number(1.5)]],
        )
        .unwrap()
    }

    #[test]
    fn headers_are_trimmed() {
        let t = sample();
        assert_eq!(t.column_names(), &["Ref", "Qty"]);
        assert_eq!(t.row_count(), 2);
    }

    #[test]
    fn duplicate_headers_rejected() {
        let err = Table::new(&["a", " a"]).unwrap_err();
        assert!(err.contains("duplicate column 'a'"));
    }

    #[test]
    fn number_display_drops_integral_fraction() {
        assert_eq!(Cell::Number(3.0).display(), "3");
        assert_eq!(Cell::Number(1.25).display(), "1.25");
    }

    #[test]
    fn sentinels_never_produce_keys() {
        assert_eq!(text("nan").normalized_key(), None);
        assert_eq!(text(" None ").normalized_key(), None);
        assert_eq!(Cell::Null.normalized_key(), None);
        assert_eq!(text("  AbC ").normalized_key(), Some("abc".into()));
    }

    #[test]
    fn short_rows_are_padded() {
        let mut t = Table::new(&["a", "b"]).unwrap();
        t.push_row(vec![text("x")]);
        assert_eq!(t.cell(0, "b"), Some(&Cell::Null));
    }

    #[test]
    fn select_reorders_and_skips_absent() {
        let t = sample().select(&["Qty", "Missing", "Ref"]);
        assert_eq!(t.column_names(), &["Qty", "Ref"]);
        assert_eq!(t.row_count(), 2);
    }

    #[test]
    fn rename_trims_both_sides() {
        let mut t = sample();
        t.rename([(" Ref", "reference "), ("Nope", "x")]).unwrap();
        assert_eq!(t.column_names(), &["reference", "Qty"]);
    }

    #[test]
    fn rename_collision_rejected() {
        let mut t = sample();
        assert!(t.rename([("Ref", "Qty")]).is_err());
    }

    #[test]
    fn set_column_checks_length() {
        let mut t = sample();
        assert!(t.set_column("New", vec![Cell::Null]).is_err());
        t.set_column("New", vec![Cell::Null, text("y")]).unwrap();
        assert_eq!(t.column_names().last().unwrap(), "New");
    }

    #[test]
    fn concat_unions_columns() {
        let a = Table::from_rows(&["x", "y"], vec![vec![text("1"), text("2")]]).unwrap();
        let b = Table::from_rows(&["y", "z"], vec![vec![text("3"), text("4")]]).unwrap();
        let c = Table::concat(&[a, b]);
        assert_eq!(c.column_names(), &["x", "y", "z"]);
        assert_eq!(c.row_count(), 2);
        assert_eq!(c.cell(1, "x"), Some(&Cell::Null));
        assert_eq!(c.cell(1, "y"), Some(&text("3")));
    }

    #[test]
    fn blank_rows_removed() {
        let t = Table::from_rows(
            &["a", "b"],
            vec![vec![text("1"), text("")], vec![text(" "), Cell::Null], vec![Cell::Null, text("2")]],
        )
        .unwrap();
        assert_eq!(t.without_blank_rows().row_count(), 2);
    }

    #[test]
    fn source_lines_survive_filtering() {
        let mut t = Table::new(&["a"]).unwrap();
        t.push_row_at(vec![text("1")], 2);
        t.push_row_at(vec![Cell::Null], 4);
        t.push_row_at(vec![text("3")], 5);
        t.push_row(vec![text("4")]);

        let kept = t.without_blank_rows();
        assert_eq!(kept.row_count(), 3);
        assert_eq!(kept.line(1), 5);
        assert_eq!(kept.line(2), 6);
        assert_eq!(kept.slice(1, 3).line(0), 5);
        assert_eq!(kept.select(&["a"]).line(2), 6);

        let both = Table::concat(&[kept.clone(), t.slice(0, 1)]);
        assert_eq!(both.line(3), 2);
        // Lines do not take part in equality.
        let renumbered =
            Table::from_rows(&["a"], vec![vec![text("1")], vec![text("3")], vec![text("4")]]).unwrap();
        assert_eq!(kept, renumbered);
    }

    #[test]
    fn first_pushed_row_is_line_two() {
        let t = sample();
        assert_eq!(t.line(0), 2);
        assert_eq!(t.line(1), 3);
    }

    #[test]
    fn slice_clamps_bounds() {
        let t = sample();
        assert_eq!(t.slice(1, 10).row_count(), 1);
        assert_eq!(t.slice(5, 10).row_count(), 0);
    }

    #[test]
    fn cells_serialize_untagged() {
        let json = serde_json::to_string(&vec![Cell::Null, text("a"), Cell::Number(1.5)]).unwrap();
        assert_eq!(json, r#"[null,"a",1.5]"#);
    }
}
