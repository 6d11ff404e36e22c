//! Spreadsheet boundary
//!
//! - Export: flattened rows + merge regions -> worksheet (`rust_xlsxwriter`)
//! - Import: worksheet (`calamine`) -> header-keyed rows

mod reader;
mod writer;

pub use reader::{read_rows, ExcelImporter};
pub use writer::{write_worksheet, ExcelExporter};
