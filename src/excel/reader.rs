//! Excel importer implementation

use crate::coerce::{excel_serial_to_datetime, parse_date, parse_datetime};
use crate::error::{FlatsheetError, FlatsheetResult};
use crate::types::{CellValue, FlatRow};
use calamine::{open_workbook, Data, Dimensions, Range, Reader, Xlsx};
use chrono::NaiveTime;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads one worksheet as header-keyed rows
pub struct ExcelImporter {
    path: PathBuf,
    sheet: Option<String>,
}

impl ExcelImporter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sheet: None,
        }
    }

    /// Read this sheet instead of the first one
    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn import(&self) -> FlatsheetResult<Vec<FlatRow>> {
        let mut workbook: Xlsx<_> = open_workbook(&self.path)
            .map_err(|e| FlatsheetError::Import(format!("Failed to open Excel file: {}", e)))?;

        let sheet = match &self.sheet {
            Some(name) => name.clone(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| FlatsheetError::Import("Workbook has no sheets".to_string()))?,
        };

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| FlatsheetError::Import(format!("Failed to read sheet '{}': {}", sheet, e)))?;

        let merges = workbook
            .worksheet_merge_cells(&sheet)
            .transpose()
            .map_err(|e| FlatsheetError::Import(format!("Failed to read merged cells: {}", e)))?
            .unwrap_or_default();

        debug!(sheet = %sheet, merges = merges.len(), "read worksheet");
        Ok(read_rows(&range, &merges))
    }
}

/// Turn a sheet range into rows keyed by the first row's headers
///
/// Every cell of a merged area takes the value of its top-left cell, so merged
/// object columns regroup on import. Entirely blank rows are skipped; blank
/// header cells are named `col_{n}`.
pub fn read_rows(range: &Range<Data>, merges: &[Dimensions]) -> Vec<FlatRow> {
    if range.is_empty() {
        return Vec::new();
    }

    let mut grid: Vec<Vec<CellValue>> = range
        .rows()
        .map(|row| row.iter().map(to_cell).collect())
        .collect();

    let (top, left) = range.start().unwrap_or((0, 0));
    for merge in merges {
        fill_merged(&mut grid, merge, top, left);
    }

    let mut rows = grid.into_iter();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let name = cell.render().trim().to_string();
                if name.is_empty() {
                    format!("col_{}", i + 1)
                } else {
                    name
                }
            })
            .collect(),
        None => return Vec::new(),
    };

    rows.filter(|cells| !cells.iter().all(CellValue::is_blank))
        .map(|cells| headers.iter().cloned().zip(cells).collect())
        .collect()
}

fn fill_merged(grid: &mut [Vec<CellValue>], merge: &Dimensions, top: u32, left: u32) {
    let (Some(r0), Some(c0)) = (merge.start.0.checked_sub(top), merge.start.1.checked_sub(left))
    else {
        return;
    };
    let (r1, c1) = (merge.end.0.saturating_sub(top), merge.end.1.saturating_sub(left));
    let (r0, c0, r1, c1) = (r0 as usize, c0 as usize, r1 as usize, c1 as usize);

    let Some(value) = grid.get(r0).and_then(|row| row.get(c0)).cloned() else {
        return;
    };
    for row in grid.iter_mut().take(r1 + 1).skip(r0) {
        for cell in row.iter_mut().take(c1 + 1).skip(c0) {
            *cell = value.clone();
        }
    }
}

fn to_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match excel_serial_to_datetime(dt.as_f64()) {
            Some(dt) if dt.time() == NaiveTime::MIN => CellValue::Date(dt.date()),
            Some(dt) => CellValue::DateTime(dt),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_datetime(s)
            .map(CellValue::DateTime)
            .or_else(|| parse_date(s).map(CellValue::Date))
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}
