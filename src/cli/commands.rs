use crate::aggregate::{Aggregate, Aggregator};
use crate::error::{FlatsheetError, FlatsheetResult};
use crate::excel::{ExcelExporter, ExcelImporter};
use crate::flatten::Flattener;
use crate::plan::FlattenPlan;
use crate::schema::Catalog;
use colored::Colorize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Load a catalog and the plan of the requested (or root) type
fn load_plan(catalog: &Path, type_name: Option<&str>) -> FlatsheetResult<(Catalog, Arc<FlattenPlan>)> {
    let catalog = Catalog::load(catalog)?;
    let type_name = match type_name {
        Some(name) => name.to_string(),
        None => catalog.root_type()?.to_string(),
    };
    let plan = catalog.plan(&type_name)?;
    Ok((catalog, plan))
}

/// A JSON array of records, or a single record
fn read_records(path: &Path) -> FlatsheetResult<Vec<Value>> {
    let content = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Array(records) => Ok(records),
        record @ Value::Object(_) => Ok(vec![record]),
        other => Err(FlatsheetError::Import(format!(
            "Expected a JSON array of records, found {}",
            match other {
                Value::Null => "null",
                Value::Bool(_) => "a boolean",
                Value::Number(_) => "a number",
                _ => "a string",
            }
        ))),
    }
}

/// Execute the export command
pub fn export(
    catalog: PathBuf,
    data: PathBuf,
    output: PathBuf,
    type_name: Option<String>,
    sheet: Option<String>,
    verbose: bool,
) -> FlatsheetResult<()> {
    println!("{}", "📄 Flatsheet - Excel Export".bold().green());
    println!("   Catalog: {}", catalog.display());
    println!("   Input:   {}", data.display());
    println!("   Output:  {}\n", output.display());

    let (catalog, plan) = load_plan(&catalog, type_name.as_deref())?;
    let records = read_records(&data)?;

    if verbose {
        println!(
            "   {} records of {}, {} columns\n",
            records.len(),
            plan.type_name.bright_blue(),
            plan.headers.len()
        );
    }

    let flattener = Flattener::new(catalog.settings().flatten_config());
    let flattened = flattener.flatten_values(&records, &plan)?;

    for issue in &flattened.issues {
        println!(
            "{} record #{}: {}",
            "⚠️ ".yellow(),
            issue.object,
            issue.error.to_string().yellow()
        );
    }

    let sheet = sheet.unwrap_or_else(|| plan.type_name.clone());
    ExcelExporter::new(sheet).export(&flattened, &output)?;

    println!("{}", "✅ Export Complete!".bold().green());
    println!(
        "   {} rows, {} merged regions\n",
        flattened.rows.len(),
        flattened.merges.len()
    );
    Ok(())
}

/// Execute the import command
pub fn import(
    catalog: PathBuf,
    input: PathBuf,
    output: PathBuf,
    type_name: Option<String>,
    sheet: Option<String>,
    verbose: bool,
) -> FlatsheetResult<()> {
    println!("{}", "📄 Flatsheet - Excel Import".bold().green());
    println!("   Catalog: {}", catalog.display());
    println!("   Input:   {}", input.display());
    println!("   Output:  {}\n", output.display());

    let (catalog, plan) = load_plan(&catalog, type_name.as_deref())?;

    let mut importer = ExcelImporter::new(&input);
    if let Some(sheet) = sheet {
        importer = importer.with_sheet(sheet);
    }
    let rows = importer.import()?;

    if verbose {
        println!("   Read {} data rows\n", rows.len());
    }

    let aggregator = Aggregator::new(plan, catalog.settings().aggregate_config());
    let mut stream = Aggregate::new(rows.iter(), aggregator);
    let records = stream.by_ref().collect::<FlatsheetResult<Vec<Value>>>()?;

    for issue in stream.take_issues() {
        let column = issue
            .column
            .map(|c| format!(" [{}]", c))
            .unwrap_or_default();
        println!(
            "{} row {}{}: {}",
            "⚠️ ".yellow(),
            issue.row + 1,
            column,
            issue.error.to_string().yellow()
        );
    }

    let count = records.len();
    let json = serde_json::to_string_pretty(&Value::Array(records))?;
    fs::write(&output, json)?;

    println!("{}", "✅ Import Complete!".bold().green());
    println!("   {} records\n", count);
    Ok(())
}

/// Print the flatten plan of a catalog type
pub fn plan(catalog: PathBuf, type_name: Option<String>) -> FlatsheetResult<()> {
    let (_catalog, plan) = load_plan(&catalog, type_name.as_deref())?;

    println!("{}", format!("📋 Plan: {}", plan.type_name).bold().green());
    println!("   Strategy: {:?}\n", plan.strategy);

    println!("{}", "   Columns".bold());
    for column in &plan.columns {
        println!(
            "   {:<24} {:<28} {}",
            column.header.bright_blue(),
            column.path.to_string(),
            column.kind.name()
        );
    }

    for group in &plan.groups {
        println!("\n{}", format!("   Rows from '{}'", group.attribute).bold());
        if let Some(cap) = group.max_rows {
            println!("   (at most {} rows)", cap);
        }
        for column in &group.columns {
            println!(
                "   {:<24} {:<28} {}",
                column.header.bright_blue(),
                format!("{}[].{}", group.path, column.path),
                column.kind.name()
            );
        }
    }

    if !plan.merge_rules.is_empty() {
        println!("\n{}", "   Merges".bold());
        for rule in &plan.merge_rules {
            let mut chain = vec![rule.column.as_str()];
            chain.extend(rule.ancestors.iter().map(String::as_str));
            println!("   {}", chain.join(" → "));
        }
    }

    for warning in &plan.warnings {
        println!("{} {}", "⚠️ ".yellow(), warning.yellow());
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_with(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_records_accepts_array_or_object() {
        let array = temp_with(r#"[{"a": 1}, {"a": 2}]"#, ".json");
        assert_eq!(read_records(array.path()).unwrap().len(), 2);

        let single = temp_with(r#"{"a": 1}"#, ".json");
        assert_eq!(read_records(single.path()).unwrap().len(), 1);

        let scalar = temp_with("42", ".json");
        let err = read_records(scalar.path()).unwrap_err();
        assert!(err.to_string().contains("found a number"));
    }

    #[test]
    fn test_load_plan_uses_root_type() {
        let catalog = temp_with(
            "types:\n  Only:\n    fields:\n      - { name: a, column: A }\n",
            ".yaml",
        );
        let (_, plan) = load_plan(catalog.path(), None).unwrap();
        assert_eq!(plan.type_name, "Only");

        assert!(load_plan(catalog.path(), Some("Missing")).is_err());
    }
}
