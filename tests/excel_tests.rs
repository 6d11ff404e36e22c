//! Excel round trips: merged cells written out, filled down on the way back

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use royalbit_flatsheet::excel::{ExcelExporter, ExcelImporter};
use royalbit_flatsheet::{Aggregate, Aggregator, Catalog, CellValue, Flattener, MergeRegion};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn load_orders() -> (Catalog, Vec<Value>) {
    let catalog = Catalog::load(Path::new("test-data/orders.yaml")).unwrap();
    let content = std::fs::read_to_string("test-data/orders.json").unwrap();
    let records: Vec<Value> = serde_json::from_str(&content).unwrap();
    (catalog, records)
}

// ═══════════════════════════════════════════════════════════════════════════
// EXPORT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_export_merges_object_columns() {
    let (catalog, records) = load_orders();
    let plan = catalog.plan("Order").unwrap();
    let flat = Flattener::new(catalog.settings().flatten_config())
        .flatten_values(&records, &plan)
        .unwrap();

    assert_eq!(
        flat.merges,
        vec![
            MergeRegion::new("orderNo", 0, 2),
            MergeRegion::new("placed", 0, 2),
        ]
    );

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("orders.xlsx");
    ExcelExporter::new("Order").export(&flat, &path).unwrap();
    assert!(path.exists());
}

// ═══════════════════════════════════════════════════════════════════════════
// IMPORT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_import_fills_merged_cells() {
    let (catalog, records) = load_orders();
    let plan = catalog.plan("Order").unwrap();
    let flat = Flattener::new(catalog.settings().flatten_config())
        .flatten_values(&records, &plan)
        .unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("orders.xlsx");
    ExcelExporter::new("Order").export(&flat, &path).unwrap();

    let rows = ExcelImporter::new(&path).with_sheet("Order").import().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].cell("orderNo"), &CellValue::Text("O1".to_string()));
    assert_eq!(
        rows[1].cell("placed"),
        &CellValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap())
    );
    assert_eq!(rows[1].cell("item-qty"), &CellValue::Number(2.0));
    assert!(rows[2].cell("tags").is_blank());
}

#[test]
fn test_excel_round_trip_restores_records() {
    let (catalog, records) = load_orders();
    let plan = catalog.plan("Order").unwrap();
    let flat = Flattener::new(catalog.settings().flatten_config())
        .flatten_values(&records, &plan)
        .unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("orders.xlsx");
    ExcelExporter::new("Orders").export(&flat, &path).unwrap();

    let rows = ExcelImporter::new(&path).import().unwrap();
    let aggregator = Aggregator::new(plan, catalog.settings().aggregate_config());
    let mut stream = Aggregate::new(rows.iter(), aggregator);
    let back: Vec<Value> = stream.by_ref().collect::<Result<_, _>>().unwrap();

    assert!(stream.take_issues().is_empty());
    assert_eq!(back, records);
}

#[test]
fn test_missing_sheet_is_an_import_error() {
    let (catalog, records) = load_orders();
    let plan = catalog.plan("Order").unwrap();
    let flat = Flattener::new(catalog.settings().flatten_config())
        .flatten_values(&records, &plan)
        .unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("orders.xlsx");
    ExcelExporter::new("Order").export(&flat, &path).unwrap();

    let err = ExcelImporter::new(&path)
        .with_sheet("Nope")
        .import()
        .unwrap_err();
    assert!(err.to_string().contains("Nope"));
}
