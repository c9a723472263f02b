// CSV import/export

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use erpprep_core::{Cell, Table};

use crate::loader::header_names;

/// UTF-8 byte order mark; spreadsheet tools need it to detect the encoding.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn read_table(path: &Path, delimiter: Option<u8>) -> Result<Table, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&content));
    parse_table(&content, delimiter)
}

/// Header line only.
pub fn read_headers(path: &Path, delimiter: Option<u8>) -> Result<Vec<String>, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&content));
    let mut reader = reader(&content, delimiter);
    match reader.records().next() {
        Some(record) => {
            let record = record.map_err(|e| e.to_string())?;
            Ok(header_names(&record.iter().collect::<Vec<_>>()))
        }
        None => Ok(Vec::new()),
    }
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (semicolon, comma, tab, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b';', b',', b'\t', b'|'];
    let sample_lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Must split the header line to be viable
        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // Score: (lines agreeing with the header's field count) * field_count
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.).
/// A leading byte order mark is dropped.
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    let content = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            // Fall back to Windows-1252 (common for Excel-exported CSVs)
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };
    Ok(match content.strip_prefix('\u{FEFF}') {
        Some(rest) => rest.to_string(),
        None => content,
    })
}

fn reader(content: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes())
}

/// First record is the header; fully blank lines are skipped.
pub fn parse_table(content: &str, delimiter: u8) -> Result<Table, String> {
    let mut records = reader(content, delimiter).into_records();

    let headers = match records.next() {
        Some(record) => record.map_err(|e| e.to_string())?,
        None => return Table::new::<&str>(&[]),
    };
    let headers = header_names(&headers.iter().collect::<Vec<_>>());
    let mut table = Table::new(&headers)?;

    for record in records {
        let record = record.map_err(|e| e.to_string())?;
        let row: Vec<Cell> = record.iter().map(Cell::from_input).collect();
        if row.iter().all(Cell::is_blank) {
            continue;
        }
        match record.position() {
            Some(pos) => table.push_row_at(row, pos.line() as usize),
            None => table.push_row(row),
        }
    }
    Ok(table)
}

/// Write `table` as comma-delimited CSV, optionally prefixed with a BOM.
pub fn write_table(table: &Table, path: &Path, bom: bool) -> Result<(), String> {
    let mut file = File::create(path).map_err(|e| format!("{}: {e}", path.display()))?;
    if bom {
        file.write_all(UTF8_BOM).map_err(|e| e.to_string())?;
    }

    let mut writer = csv::WriterBuilder::new().from_writer(file);
    writer
        .write_record(table.column_names())
        .map_err(|e| e.to_string())?;
    for row in 0..table.row_count() {
        writer
            .write_record(table.row(row).map(Cell::display))
            .map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}
