use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use indexmap::IndexMap;
use tracing::debug;

use crate::error::Error;
use crate::headers::{field_for_header, normalize_header};
use crate::schema::{schema_for, CardType, Field};

/// One spreadsheet, reduced to trimmed text: a header row plus data
/// rows, with fully-empty rows and columns already removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Worksheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Canonical field map for one data row. Known headers resolve into
/// `fields`; unrecognized headers ride along in `extras` and are
/// ignored by schemas that do not reference them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRecord {
    pub fields: IndexMap<Field, String>,
    pub extras: IndexMap<String, String>,
}

impl RowRecord {
    pub fn get(&self, field: Field) -> &str {
        self.fields.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(String::is_empty) && self.extras.values().all(String::is_empty)
    }
}

/// Load the first sheet of an .xlsx/.xls workbook.
pub fn load_worksheet(path: &Path) -> Result<Worksheet, Error> {
    let mut workbook = open_workbook_auto(path).map_err(|source| Error::Workbook {
        path: path.to_path_buf(),
        source,
    })?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::EmptyWorkbook(path.to_path_buf()))?
        .map_err(|source| Error::Workbook {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    // Drop rows and columns that carry no data at all, wherever they
    // sit in the sheet.
    rows.retain(|row| row.iter().any(|cell| !cell.is_empty()));
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let keep: Vec<usize> = (0..width)
        .filter(|&col| {
            rows.iter()
                .any(|row| row.get(col).is_some_and(|cell| !cell.is_empty()))
        })
        .collect();
    let mut rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|row| {
            keep.iter()
                .map(|&col| row.get(col).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    if rows.is_empty() {
        return Err(Error::EmptyWorkbook(path.to_path_buf()));
    }
    let headers = rows.remove(0);
    debug!(
        path = %path.display(),
        columns = headers.len(),
        rows = rows.len(),
        "loaded worksheet"
    );
    Ok(Worksheet { headers, rows })
}

/// Spreadsheet cells arrive as typed values; everything renders as
/// trimmed text. Whole numbers print without a trailing ".0" so phone
/// numbers and card digits survive Excel's float storage.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// Build a row's canonical field map by zipping headers with cell
/// values. The shorter side wins; missing cells become empty strings.
pub fn extract_row(headers: &[String], cells: &[String]) -> RowRecord {
    let mut record = RowRecord::default();
    for (i, header) in headers.iter().enumerate() {
        if header.trim().is_empty() {
            continue;
        }
        let value = cells
            .get(i)
            .map(|cell| cell.trim().to_string())
            .unwrap_or_default();
        match field_for_header(header) {
            Some(field) => {
                record.fields.insert(field, value);
            }
            None => {
                record.extras.insert(normalize_header(header), value);
            }
        }
    }
    record
}

/// Resolve a record against a card type's field order. Fields the row
/// does not carry come back as empty strings so anchor assignment
/// stays positional.
pub fn ordered_values(record: &RowRecord, card_type: CardType) -> Vec<String> {
    schema_for(card_type)
        .fields
        .iter()
        .map(|field| record.get(*field).to_string())
        .collect()
}
