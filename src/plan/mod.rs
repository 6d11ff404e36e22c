//! Metadata analysis: schema -> flatten plan
//!
//! A plan is built once per record type and never changes afterwards. It lists
//! the object-level columns (scalars, including those reached through nested
//! composites), the list groups expanded into rows, the header order and the
//! merge rules with their resolved dependency chains.

mod cache;

pub use cache::{analyze, PlanCache};

use crate::error::{FlatsheetError, FlatsheetResult};
use crate::path::{Path, Segment};
use crate::schema::{Field, FieldKind, Schema, SchemaRef};
use crate::types::{CellKind, MultiListStrategy};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One exported column and where its value lives
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub header: String,
    /// From the record root for object columns, from the element for list columns
    pub path: Path,
    pub kind: CellKind,
    pub merge: bool,
    pub depends_on: Option<String>,
}

/// A nested-many attribute expanded into rows
#[derive(Debug, Clone)]
pub struct GroupPlan {
    pub attribute: String,
    /// Location of the sequence from the record root
    pub path: Path,
    pub columns: Vec<ColumnPlan>,
    pub strategy: Option<MultiListStrategy>,
    pub max_rows: Option<usize>,
    /// Zero value of one element
    pub element: Value,
    /// Zero values of composites inside an element, by template key
    pub templates: HashMap<String, Value>,
}

/// A mergeable column and its governing columns, nearest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRule {
    pub column: String,
    pub ancestors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FlattenPlan {
    pub type_name: String,
    /// One value per object, repeated on each of its rows
    pub columns: Vec<ColumnPlan>,
    pub groups: Vec<GroupPlan>,
    /// Export column order, first declaration wins
    pub headers: Vec<String>,
    pub strategy: MultiListStrategy,
    pub merge_rules: Vec<MergeRule>,
    /// Non-fatal findings from analysis (omitted levels, ignored lists)
    pub warnings: Vec<String>,
    zero: Value,
    templates: HashMap<String, Value>,
}

impl FlattenPlan {
    /// Analyze `schema`; `resolve` supplies the schemas of nested types
    pub fn build(
        schema: &Schema,
        resolve: &dyn Fn(&SchemaRef) -> FlatsheetResult<Schema>,
    ) -> FlatsheetResult<Self> {
        let mut analyzer = Analyzer {
            resolve,
            warnings: Vec::new(),
        };
        let mut collected = Collected::default();
        analyzer.walk(
            schema,
            None,
            &Naming::default(),
            usize::MAX,
            Scope::Record,
            &mut collected,
        )?;

        let strategy = pick_strategy(&schema.name, &collected.groups, &mut analyzer.warnings);
        let merge_rules = merge_rules(&collected)?;

        debug!(
            record = %schema.name,
            columns = collected.columns.len(),
            groups = collected.groups.len(),
            "built flatten plan"
        );

        Ok(Self {
            type_name: schema.name.clone(),
            columns: collected.columns,
            groups: collected.groups,
            headers: collected.headers,
            strategy,
            merge_rules,
            warnings: analyzer.warnings,
            zero: schema.zero_value(),
            templates: collected.templates,
        })
    }

    /// A fresh record instance
    pub fn zero_value(&self) -> Value {
        self.zero.clone()
    }

    /// Zero values of nested composites, by template key
    pub fn templates(&self) -> &HashMap<String, Value> {
        &self.templates
    }

    /// First column with this header, object columns before list columns
    pub fn column(&self, header: &str) -> Option<&ColumnPlan> {
        self.columns
            .iter()
            .chain(self.groups.iter().flat_map(|g| g.columns.iter()))
            .find(|c| c.header == header)
    }

    /// Headers whose values identify an object's rows
    pub fn key_headers(&self) -> Vec<&str> {
        let mut headers: Vec<&str> = Vec::new();
        for column in &self.columns {
            if !headers.contains(&column.header.as_str()) {
                headers.push(&column.header);
            }
        }
        headers
    }
}

#[derive(Debug, Clone, Default)]
struct Naming {
    prefix: String,
    suffix: String,
}

impl Naming {
    fn child(&self, field: &Field) -> Naming {
        Naming {
            prefix: format!("{}{}", self.prefix, field.prefix),
            suffix: format!("{}{}", field.suffix, self.suffix),
        }
    }

    fn header(&self, base: &str) -> String {
        format!("{}{}{}", self.prefix, base, self.suffix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Record,
    Element,
}

#[derive(Default)]
struct Collected {
    columns: Vec<ColumnPlan>,
    groups: Vec<GroupPlan>,
    headers: Vec<String>,
    templates: HashMap<String, Value>,
}

impl Collected {
    fn add_header(&mut self, header: &str) {
        if !self.headers.iter().any(|h| h == header) {
            self.headers.push(header.to_string());
        }
    }
}

struct Analyzer<'r> {
    resolve: &'r dyn Fn(&SchemaRef) -> FlatsheetResult<Schema>,
    warnings: Vec<String>,
}

impl Analyzer<'_> {
    fn note(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn walk(
        &mut self,
        schema: &Schema,
        base: Option<&Path>,
        naming: &Naming,
        budget: usize,
        scope: Scope,
        out: &mut Collected,
    ) -> FlatsheetResult<()> {
        for field in &schema.fields {
            let declared = Path::parse(field.path.as_deref().unwrap_or(&field.name))?;
            let path = match base {
                Some(base) => base.join(&declared)?,
                None => declared,
            };

            match &field.kind {
                FieldKind::Scalar(kind) => {
                    let Some(header) = &field.header else {
                        debug!(record = %schema.name, field = %field.name, "no column directive, ignored");
                        continue;
                    };
                    let header = naming.child(field).header(header);
                    out.add_header(&header);
                    out.columns.push(ColumnPlan {
                        header,
                        path,
                        kind: *kind,
                        merge: field.merge,
                        depends_on: field.depends_on.clone(),
                    });
                }
                FieldKind::Nested(reference) => {
                    if path.is_wildcard() {
                        return Err(FlatsheetError::InvalidSchema(format!(
                            "{}.{}: a flattened composite cannot use a wildcard path",
                            schema.name, field.name
                        )));
                    }
                    let remaining = budget.min(field.depth_limit());
                    if remaining == 0 {
                        self.note(format!(
                            "{}.{}: depth ceiling reached, nested attributes omitted",
                            schema.name, field.name
                        ));
                        continue;
                    }
                    let nested = (self.resolve)(reference)?;
                    out.templates
                        .insert(path.template_key(path.len() - 1), nested.zero_value());
                    self.walk(
                        &nested,
                        Some(&path),
                        &naming.child(field),
                        remaining - 1,
                        scope,
                        out,
                    )?;
                }
                FieldKind::Many(reference) => {
                    if scope == Scope::Element {
                        self.note(format!(
                            "{}.{}: lists inside list elements are not expanded",
                            schema.name, field.name
                        ));
                        continue;
                    }
                    if !matches!(path.last(), Some(Segment::Field(_))) {
                        return Err(FlatsheetError::InvalidSchema(format!(
                            "{}.{}: an expanded list must be addressed by a plain attribute path",
                            schema.name, field.name
                        )));
                    }
                    let element = (self.resolve)(reference)?;
                    let mut inner = Collected::default();
                    self.walk(
                        &element,
                        None,
                        &naming.child(field),
                        usize::MAX,
                        Scope::Element,
                        &mut inner,
                    )?;
                    for header in &inner.headers {
                        out.add_header(header);
                    }
                    out.groups.push(GroupPlan {
                        attribute: field.name.clone(),
                        path,
                        columns: inner.columns,
                        strategy: field.strategy,
                        max_rows: field.max_rows,
                        element: element.zero_value(),
                        templates: inner.templates,
                    });
                }
            }
        }
        Ok(())
    }
}

/// First list that names a strategy decides for the whole object
fn pick_strategy(
    record: &str,
    groups: &[GroupPlan],
    warnings: &mut Vec<String>,
) -> MultiListStrategy {
    let mut declared = groups.iter().filter_map(|g| g.strategy.map(|s| (g, s)));
    let Some((first, strategy)) = declared.next() else {
        return MultiListStrategy::default();
    };
    for (other, other_strategy) in declared {
        if other_strategy != strategy {
            let message = format!(
                "{}: '{}' asks for {:?} but '{}' already chose {:?}",
                record, other.attribute, other_strategy, first.attribute, strategy
            );
            warn!("{}", message);
            warnings.push(message);
        }
    }
    strategy
}

/// Resolve `depends_on` chains of mergeable columns, rejecting unknown and circular references
fn merge_rules(collected: &Collected) -> FlatsheetResult<Vec<MergeRule>> {
    let all: Vec<&ColumnPlan> = collected
        .columns
        .iter()
        .chain(collected.groups.iter().flat_map(|g| g.columns.iter()))
        .collect();

    let mut governing: HashMap<&str, &str> = HashMap::new();
    for column in &all {
        if let Some(parent) = &column.depends_on {
            if !collected.headers.iter().any(|h| h == parent) {
                return Err(FlatsheetError::InvalidSchema(format!(
                    "column '{}' depends on unknown column '{}'",
                    column.header, parent
                )));
            }
            governing.entry(column.header.as_str()).or_insert(parent.as_str());
        }
    }

    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes = HashMap::new();
    for header in &collected.headers {
        nodes.insert(header.as_str(), graph.add_node(header.as_str()));
    }
    for (child, parent) in &governing {
        if let (Some(&c), Some(&p)) = (nodes.get(child), nodes.get(parent)) {
            graph.add_edge(p, c, ());
        }
    }
    toposort(&graph, None).map_err(|cycle| {
        FlatsheetError::InvalidSchema(format!(
            "circular merge dependency through column '{}'",
            graph[cycle.node_id()]
        ))
    })?;

    let mut rules: Vec<MergeRule> = Vec::new();
    for header in &collected.headers {
        let mergeable = all.iter().any(|c| c.header == *header && c.merge);
        if !mergeable {
            continue;
        }
        let mut ancestors = Vec::new();
        let mut cursor = header.as_str();
        while let Some(parent) = governing.get(cursor) {
            ancestors.push(parent.to_string());
            cursor = *parent;
        }
        rules.push(MergeRule {
            column: header.clone(),
            ancestors,
        });
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Record, Schema};
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    fn named(schemas: Vec<Schema>) -> impl Fn(&SchemaRef) -> FlatsheetResult<Schema> {
        move |r: &SchemaRef| match r {
            SchemaRef::Record(f) => Ok(f()),
            SchemaRef::Named(name) => schemas
                .iter()
                .find(|s| &s.name == name)
                .cloned()
                .ok_or_else(|| FlatsheetError::InvalidSchema(name.clone())),
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Node {
        name: String,
        parent: Option<Box<Node>>,
    }

    impl Record for Node {
        fn schema() -> Schema {
            Schema::new("Node")
                .field(Field::column("name", "name", CellKind::Text))
                .field(Field::nested::<Node>("parent").prefix("parent."))
        }
    }

    #[test]
    fn test_nested_single_columns_and_prefixes() {
        let leader = Schema::new("Leader").field(Field::column("name", "name", CellKind::Text));
        let dept = Schema::new("Dept")
            .field(Field::column("title", "title", CellKind::Text))
            .field(Field::nested_named("leader", "Leader").prefix("leader-"));
        let employee = Schema::new("Employee")
            .field(Field::column("name", "Name", CellKind::Text))
            .field(Field::nested_named("dept", "Dept").prefix("dept-"));

        let plan = FlattenPlan::build(&employee, &named(vec![leader, dept])).unwrap();
        assert_eq!(plan.headers, vec!["Name", "dept-title", "dept-leader-name"]);
        assert_eq!(plan.columns[2].path.to_string(), "dept.leader.name");
        assert!(plan.templates().contains_key("dept"));
        assert!(plan.templates().contains_key("dept.leader"));
        assert!(plan.groups.is_empty());
    }

    #[test]
    fn test_depth_ceiling_omits_deeper_levels() {
        let plan = FlattenPlan::build(&Node::schema(), &named(vec![])).unwrap();
        assert_eq!(
            plan.headers,
            vec![
                "name",
                "parent.name",
                "parent.parent.name",
                "parent.parent.parent.name"
            ]
        );
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("depth ceiling"));
    }

    #[test]
    fn test_non_recursive_nested_stops_after_one_level() {
        let schema = Schema::new("Root")
            .field(Field::nested::<Node>("node").prefix("n.").recursive(false));
        let plan = FlattenPlan::build(&schema, &named(vec![])).unwrap();
        assert_eq!(plan.headers, vec!["n.name"]);
    }

    #[test]
    fn test_many_group_with_prefix_and_suffix() {
        let item = Schema::new("Item")
            .field(Field::column("name", "name", CellKind::Text))
            .field(Field::column("qty", "qty", CellKind::Integer));
        let order = Schema::new("Order")
            .field(Field::column("order_no", "orderNo", CellKind::Text).merge())
            .field(Field::many_named("items", "Item").prefix("item-").suffix("!"));

        let plan = FlattenPlan::build(&order, &named(vec![item])).unwrap();
        assert_eq!(plan.headers, vec!["orderNo", "item-name!", "item-qty!"]);
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].columns[1].path.to_string(), "qty");
        assert_eq!(plan.key_headers(), vec!["orderNo"]);
        assert_eq!(plan.strategy, MultiListStrategy::MaxLength);
        assert_eq!(
            plan.merge_rules,
            vec![MergeRule {
                column: "orderNo".to_string(),
                ancestors: vec![]
            }]
        );
    }

    #[test]
    fn test_nested_lists_inside_elements_are_skipped() {
        let inner = Schema::new("Inner").field(Field::column("v", "v", CellKind::Text));
        let item = Schema::new("Item")
            .field(Field::column("name", "name", CellKind::Text))
            .field(Field::many_named("inner", "Inner"));
        let order = Schema::new("Order").field(Field::many_named("items", "Item"));

        let plan = FlattenPlan::build(&order, &named(vec![inner, item])).unwrap();
        assert_eq!(plan.headers, vec!["name"]);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_merge_chain_resolution() {
        let line = Schema::new("Line")
            .field(Field::column("b", "B", CellKind::Text).merge().depends_on("A"))
            .field(Field::column("c", "C", CellKind::Text).merge().depends_on("B"));
        let root = Schema::new("Root")
            .field(Field::column("a", "A", CellKind::Text).merge())
            .field(Field::many_named("lines", "Line"));

        let plan = FlattenPlan::build(&root, &named(vec![line])).unwrap();
        assert_eq!(
            plan.merge_rules,
            vec![
                MergeRule {
                    column: "A".to_string(),
                    ancestors: vec![]
                },
                MergeRule {
                    column: "B".to_string(),
                    ancestors: vec!["A".to_string()]
                },
                MergeRule {
                    column: "C".to_string(),
                    ancestors: vec!["B".to_string(), "A".to_string()]
                },
            ]
        );
    }

    #[test]
    fn test_unknown_and_circular_dependencies() {
        let root = Schema::new("Root")
            .field(Field::column("a", "A", CellKind::Text).merge().depends_on("Z"));
        let err = FlattenPlan::build(&root, &named(vec![])).unwrap_err();
        assert!(err.to_string().contains("unknown column 'Z'"));

        let root = Schema::new("Root")
            .field(Field::column("a", "A", CellKind::Text).merge().depends_on("B"))
            .field(Field::column("b", "B", CellKind::Text).merge().depends_on("A"));
        let err = FlattenPlan::build(&root, &named(vec![])).unwrap_err();
        assert!(err.to_string().contains("circular merge dependency"));
    }

    #[test]
    fn test_invalid_declared_path_fails_at_build() {
        let root = Schema::new("Root")
            .field(Field::column("tags", "Tags", CellKind::Text).path("tags[*].x"));
        let err = FlattenPlan::build(&root, &named(vec![])).unwrap_err();
        assert!(matches!(err, FlatsheetError::InvalidPathExpression { .. }));
    }

    #[test]
    fn test_first_declared_strategy_wins() {
        let a = Schema::new("A").field(Field::column("x", "x", CellKind::Text));
        let root = Schema::new("Root")
            .field(Field::many_named("first", "A").prefix("f-"))
            .field(
                Field::many_named("second", "A")
                    .prefix("s-")
                    .strategy(MultiListStrategy::Cartesian),
            )
            .field(
                Field::many_named("third", "A")
                    .prefix("t-")
                    .strategy(MultiListStrategy::MinLength),
            );
        let plan = FlattenPlan::build(&root, &named(vec![a])).unwrap();
        assert_eq!(plan.strategy, MultiListStrategy::Cartesian);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_column_lookup_prefers_object_columns() {
        let item = Schema::new("Item").field(Field::column("code", "code", CellKind::Text));
        let root = Schema::new("Root")
            .field(Field::column("code", "code", CellKind::Integer))
            .field(Field::many_named("items", "Item"));
        let plan = FlattenPlan::build(&root, &named(vec![item])).unwrap();
        assert_eq!(plan.headers, vec!["code"]);
        assert_eq!(plan.column("code").unwrap().kind, CellKind::Integer);
    }
}
