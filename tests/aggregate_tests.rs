//! Import aggregation tests: regrouping rows, round trips and row issues

use pretty_assertions::assert_eq;
use royalbit_flatsheet::{
    aggregate, flatten, Aggregate, AggregateConfig, Aggregator, Catalog, CellKind, CellValue,
    Field, FlatRow, Flattener, FlatsheetError, Record, Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

// ═══════════════════════════════════════════════════════════════════════════
// RECORD TYPES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Leader {
    name: String,
}

impl Record for Leader {
    fn schema() -> Schema {
        Schema::new("Leader").field(Field::column("name", "name", CellKind::Text))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Dept {
    title: String,
    leader: Option<Leader>,
}

impl Record for Dept {
    fn schema() -> Schema {
        Schema::new("Dept")
            .field(Field::column("title", "title", CellKind::Text))
            .field(Field::nested::<Leader>("leader").prefix("leader "))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Task {
    label: String,
    hours: f64,
    done: bool,
}

impl Record for Task {
    fn schema() -> Schema {
        Schema::new("Task")
            .field(Field::column("label", "Task", CellKind::Text))
            .field(Field::column("hours", "Hours", CellKind::Float))
            .field(Field::column("done", "Done", CellKind::Bool))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Project {
    code: String,
    started: Option<String>,
    dept: Option<Dept>,
    tags: Vec<String>,
    tasks: Vec<Task>,
    reviewers: Vec<Leader>,
}

impl Record for Project {
    fn schema() -> Schema {
        Schema::new("Project")
            .field(Field::column("code", "Code", CellKind::Text).merge())
            .field(Field::column("started", "Started", CellKind::Date))
            .field(Field::nested::<Dept>("dept").prefix("dept "))
            .field(Field::column("tags", "Tags", CellKind::Text).path("tags[*]"))
            .field(Field::many::<Task>("tasks"))
            .field(Field::many::<Leader>("reviewers").prefix("reviewer "))
    }
}

fn task(label: &str, hours: f64, done: bool) -> Task {
    Task {
        label: label.to_string(),
        hours,
        done,
    }
}

fn leader(name: &str) -> Leader {
    Leader {
        name: name.to_string(),
    }
}

fn projects() -> Vec<Project> {
    vec![
        Project {
            code: "P1".to_string(),
            started: Some("2024-01-15".to_string()),
            dept: Some(Dept {
                title: "R&D".to_string(),
                leader: Some(leader("Grace")),
            }),
            tags: vec!["core".to_string(), "q1".to_string()],
            tasks: vec![task("design", 4.5, true), task("build", 12.0, false)],
            reviewers: vec![leader("Ada"), leader("Linus")],
        },
        Project {
            code: "P2".to_string(),
            started: None,
            dept: None,
            tags: Vec::new(),
            tasks: vec![task("spike", 2.0, false)],
            reviewers: vec![leader("Ken")],
        },
        Project {
            code: "P3".to_string(),
            started: None,
            dept: Some(Dept {
                title: "Ops".to_string(),
                leader: None,
            }),
            tags: vec!["infra".to_string()],
            tasks: Vec::new(),
            reviewers: Vec::new(),
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
// ROUND TRIPS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_flatten_then_aggregate_restores_records() {
    let original = projects();
    let flat = flatten(&original).unwrap();
    assert_eq!(flat.rows.len(), 4);

    let back = aggregate::<Project>(&flat.rows, AggregateConfig::default()).unwrap();
    assert!(back.issues.is_empty(), "unexpected issues: {:?}", back.issues);
    assert_eq!(back.records, original);
}

#[test]
fn test_padded_rows_do_not_create_elements() {
    let project = Project {
        code: "P1".to_string(),
        tasks: vec![task("a", 1.0, true), task("b", 2.0, true), task("c", 3.0, true)],
        reviewers: vec![leader("Ada")],
        ..Project::default()
    };
    let flat = flatten(&[project.clone()]).unwrap();
    assert_eq!(flat.rows.len(), 3);
    assert!(flat.rows[2].cell("reviewer name").is_blank());

    let back = aggregate::<Project>(&flat.rows, AggregateConfig::default()).unwrap();
    assert_eq!(back.records, vec![project]);
}

#[test]
fn test_catalog_round_trip_from_test_data() {
    let catalog = Catalog::load(Path::new("test-data/orders.yaml")).unwrap();
    let plan = catalog.plan("Order").unwrap();
    let content = std::fs::read_to_string("test-data/orders.json").unwrap();
    let records: Vec<Value> = serde_json::from_str(&content).unwrap();

    let flat = Flattener::new(catalog.settings().flatten_config())
        .flatten_values(&records, &plan)
        .unwrap();
    assert_eq!(flat.rows.len(), 3);
    assert_eq!(flat.rows[0].cell("tags").render(), "rush;gift");
    assert_eq!(flat.rows[0].cell("customer-city").render(), "Oslo");

    let aggregator = Aggregator::new(plan, catalog.settings().aggregate_config());
    let back: Vec<Value> = Aggregate::new(flat.rows.iter(), aggregator)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(back, records);
}

// ═══════════════════════════════════════════════════════════════════════════
// GROUPING CONTRACT
// ═══════════════════════════════════════════════════════════════════════════

fn project_row(code: &str, label: &str) -> FlatRow {
    FlatRow::from_iter([("Code", code), ("Task", label)])
}

#[test]
fn test_repeated_key_after_other_group_is_separate_record() {
    let rows = vec![
        project_row("P1", "a"),
        project_row("P2", "b"),
        project_row("P1", "c"),
    ];
    let config = AggregateConfig {
        check_grouping: true,
        ..AggregateConfig::default()
    };

    let out = aggregate::<Project>(&rows, config).unwrap();
    let codes: Vec<&str> = out.records.iter().map(|p| p.code.as_str()).collect();
    assert_eq!(codes, vec!["P1", "P2", "P1"]);
    assert_eq!(out.records[2].tasks, vec![Task { label: "c".to_string(), ..Task::default() }]);

    assert_eq!(out.issues.len(), 1);
    assert!(matches!(
        &out.issues[0].error,
        FlatsheetError::GroupNotContiguous { row: 2, key } if key[0] == "P1"
    ));
}

#[test]
fn test_bad_cells_are_reported_per_row() {
    let mut first = project_row("P1", "a");
    first.insert("Started", CellValue::from("someday"));
    first.insert("Hours", CellValue::from("lots"));
    let mut second = project_row("P1", "b");
    second.insert("Started", CellValue::from("someday"));
    second.insert("Done", CellValue::from("yes"));

    let out = aggregate::<Project>(&[first, second], AggregateConfig::default()).unwrap();
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].tasks.len(), 2);
    assert!(out.records[0].tasks[1].done);
    assert_eq!(out.records[0].started, None);

    let columns: Vec<(usize, Option<&str>)> = out
        .issues
        .iter()
        .map(|i| (i.row, i.column.as_deref()))
        .collect();
    assert_eq!(columns, vec![(0, Some("Started")), (0, Some("Hours"))]);
}

#[test]
fn test_streaming_matches_batch() {
    let flat = flatten(&projects()).unwrap();
    let mut aggregator = Aggregator::for_record::<Project>(AggregateConfig::default()).unwrap();

    let mut streamed = Vec::new();
    for row in &flat.rows {
        if let Some(record) = aggregator.push(row).unwrap() {
            streamed.push(record);
        }
    }
    streamed.extend(aggregator.finish());

    let typed: Vec<Project> = streamed
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect();
    assert_eq!(typed, projects());
}

#[test]
fn test_undeserializable_record_becomes_issue() {
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Strict {
        count: u8,
    }

    impl Record for Strict {
        fn schema() -> Schema {
            Schema::new("Strict").field(Field::column("count", "count", CellKind::Integer))
        }
    }

    let rows = vec![
        FlatRow::from_iter([("count", CellValue::Number(3.0))]),
        FlatRow::from_iter([("count", CellValue::Number(300.0))]),
    ];
    let out = aggregate::<Strict>(&rows, AggregateConfig::default()).unwrap();
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].count, 3);
    assert_eq!(out.issues.len(), 1);
    assert_eq!(out.issues[0].row, 1);
    assert!(matches!(out.issues[0].error, FlatsheetError::Json(_)));
}
