//! Excel exporter implementation

use crate::error::{FlatsheetError, FlatsheetResult};
use crate::flatten::FlattenOutput;
use crate::types::CellValue;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Writes one flattened batch as a single worksheet
pub struct ExcelExporter {
    sheet_name: String,
}

impl ExcelExporter {
    pub fn new(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
        }
    }

    /// Export to an .xlsx file
    pub fn export(&self, output: &FlattenOutput, path: &Path) -> FlatsheetResult<()> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&self.sheet_name)
            .map_err(|e| FlatsheetError::Export(format!("Failed to set worksheet name: {}", e)))?;

        write_worksheet(worksheet, output)?;

        workbook
            .save(path)
            .map_err(|e| FlatsheetError::Export(format!("Failed to save Excel file: {}", e)))?;
        Ok(())
    }
}

/// Header in row 0, data from row 1, merge regions shifted below the header
pub fn write_worksheet(worksheet: &mut Worksheet, output: &FlattenOutput) -> FlatsheetResult<()> {
    for (col, header) in output.headers.iter().enumerate() {
        worksheet
            .write_string(0, col_index(col)?, header)
            .map_err(|e| FlatsheetError::Export(format!("Failed to write header: {}", e)))?;
    }

    for (i, row) in output.rows.iter().enumerate() {
        let excel_row = row_index(i + 1)?;
        for (col, header) in output.headers.iter().enumerate() {
            write_cell(worksheet, excel_row, col_index(col)?, row.cell(header))?;
        }
    }

    let plain = Format::new();
    for region in &output.merges {
        let Some(col) = output.headers.iter().position(|h| *h == region.column) else {
            continue;
        };
        let col = col_index(col)?;
        let first = row_index(region.start_row + 1)?;
        let last = row_index(region.end_row)?;
        let value = output
            .rows
            .get(region.start_row)
            .map(|row| row.cell(&region.column).clone())
            .unwrap_or_default();

        worksheet
            .merge_range(first, col, last, col, &value.render(), &plain)
            .map_err(|e| FlatsheetError::Export(format!("Failed to merge cells: {}", e)))?;
        // merge_range only takes text; restore the typed value
        write_cell(worksheet, first, col, &value)?;
    }

    Ok(())
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, value: &CellValue) -> FlatsheetResult<()> {
    let result = match value {
        CellValue::Empty => return Ok(()),
        CellValue::Number(n) => worksheet.write_number(row, col, *n),
        CellValue::Bool(b) => worksheet.write_boolean(row, col, *b),
        CellValue::Text(text) => worksheet.write_string(row, col, text),
        CellValue::Date(date) => {
            let format = Format::new().set_num_format(DATE_FORMAT);
            worksheet.write_datetime_with_format(row, col, date, &format)
        }
        CellValue::DateTime(datetime) => {
            let format = Format::new().set_num_format(DATETIME_FORMAT);
            worksheet.write_datetime_with_format(row, col, datetime, &format)
        }
    };
    result
        .map(|_| ())
        .map_err(|e| FlatsheetError::Export(format!("Failed to write cell: {}", e)))
}

fn row_index(row: usize) -> FlatsheetResult<u32> {
    u32::try_from(row).map_err(|_| FlatsheetError::Export(format!("Row {} is beyond the sheet", row)))
}

fn col_index(col: usize) -> FlatsheetResult<u16> {
    u16::try_from(col)
        .map_err(|_| FlatsheetError::Export(format!("Column {} is beyond the sheet", col)))
}
