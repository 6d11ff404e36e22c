//! Record registration
//!
//! Participating types describe their attributes once through [`Record::schema`].
//! The descriptor lists, per attribute, its role and directives:
//!
//! - [`Field::column`] - scalar exported as one column
//! - [`Field::nested`] - single composite, flattened into its parent's columns
//! - [`Field::many`] - sequence of composites, expanded into repeated rows
//!
//! Instances are read and written through their `serde_json::Value` form, so
//! the only compile-time requirement on a record is serde support plus a
//! `Default` zero value.

mod catalog;

pub use catalog::Catalog;

use crate::path::{Path, Segment};
use crate::types::{CellKind, MultiListStrategy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Nested composites are followed at most this many levels by default
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// A type that can be flattened to rows and aggregated back
pub trait Record: Serialize + DeserializeOwned + Default + 'static {
    fn schema() -> Schema;
}

/// Schema of `T` with `T::default()` as its zero value
pub fn schema_of<T: Record>() -> Schema {
    T::schema().with_template(template_of::<T>)
}

/// `T::default()` in value form
pub fn template_of<T: Record>() -> Value {
    serde_json::to_value(T::default()).unwrap_or(Value::Null)
}

/// Reference from an attribute to the descriptor of its declared type
#[derive(Debug, Clone)]
pub enum SchemaRef {
    /// Resolved lazily so self-referencing records terminate
    Record(fn() -> Schema),
    /// Looked up by name in a [`Catalog`]
    Named(String),
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<Field>,
    pub template: Option<fn() -> Value>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            template: None,
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_template(mut self, template: fn() -> Value) -> Self {
        self.template = Some(template);
        self
    }

    /// A fresh instance: the registered template, or one derived from the fields
    pub fn zero_value(&self) -> Value {
        if let Some(template) = self.template {
            return template();
        }

        let mut obj = Map::new();
        for field in &self.fields {
            let declared = field
                .path
                .as_deref()
                .and_then(|p| Path::parse(p).ok())
                .unwrap_or_else(|| Path::field(field.name.clone()));
            let Some(first) = declared.segments().first() else {
                continue;
            };
            if obj.contains_key(first.name()) {
                continue;
            }
            let zero = match (&field.kind, first) {
                (FieldKind::Many(_), _) if declared.len() == 1 => Value::Array(Vec::new()),
                (_, Segment::Index(..)) | (_, Segment::Wildcard(_)) => Value::Array(Vec::new()),
                (_, Segment::Key(..)) => Value::Object(Map::new()),
                _ => Value::Null,
            };
            obj.insert(first.name().to_string(), zero);
        }
        Value::Object(obj)
    }
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(CellKind),
    Nested(SchemaRef),
    Many(SchemaRef),
}

/// One attribute and its directives
#[derive(Debug, Clone)]
pub struct Field {
    /// Attribute name on the record
    pub name: String,
    pub kind: FieldKind,
    /// Exported column name; scalars without one are ignored
    pub header: Option<String>,
    /// Declared path relative to the owner, defaults to `name`
    pub path: Option<String>,
    pub prefix: String,
    pub suffix: String,
    /// Follow nested composites below this one
    pub recursive: bool,
    pub max_depth: Option<usize>,
    pub strategy: Option<MultiListStrategy>,
    /// Cap on expanded elements of this list
    pub max_rows: Option<usize>,
    /// Merge vertically within one object's rows
    pub merge: bool,
    /// Governing column: merge only where it is constant too
    pub depends_on: Option<String>,
}

impl Field {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            header: None,
            path: None,
            prefix: String::new(),
            suffix: String::new(),
            recursive: true,
            max_depth: None,
            strategy: None,
            max_rows: None,
            merge: false,
            depends_on: None,
        }
    }

    /// Exportable scalar attribute
    pub fn column(name: impl Into<String>, header: impl Into<String>, kind: CellKind) -> Self {
        let mut field = Self::with_kind(name, FieldKind::Scalar(kind));
        field.header = Some(header.into());
        field
    }

    /// Scalar attribute that is not exported
    pub fn ignored(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Scalar(CellKind::Auto))
    }

    /// Composite flattened into the owner's columns
    pub fn nested<T: Record>(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Nested(SchemaRef::Record(schema_of::<T>)))
    }

    /// Sequence of composites expanded into rows
    pub fn many<T: Record>(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Many(SchemaRef::Record(schema_of::<T>)))
    }

    pub fn nested_named(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Nested(SchemaRef::Named(type_name.into())))
    }

    pub fn many_named(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Many(SchemaRef::Named(type_name.into())))
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn strategy(mut self, strategy: MultiListStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn max_rows(mut self, rows: usize) -> Self {
        self.max_rows = Some(rows);
        self
    }

    pub fn merge(mut self) -> Self {
        self.merge = true;
        self
    }

    pub fn depends_on(mut self, column: impl Into<String>) -> Self {
        self.depends_on = Some(column.into());
        self
    }

    /// Levels of nested composites followed through this attribute
    pub fn depth_limit(&self) -> usize {
        if self.recursive {
            self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Tag {
        label: String,
    }

    impl Record for Tag {
        fn schema() -> Schema {
            Schema::new("Tag").field(Field::column("label", "Label", CellKind::Text))
        }
    }

    #[test]
    fn test_schema_of_uses_default_instance() {
        let schema = schema_of::<Tag>();
        assert_eq!(schema.zero_value(), json!({ "label": "" }));
    }

    #[test]
    fn test_derived_zero_value() {
        let schema = Schema::new("Employee")
            .field(Field::column("name", "Name", CellKind::Text))
            .field(Field::column("skills", "Skills", CellKind::Text).path("skills[*]"))
            .field(Field::column("city", "City", CellKind::Text).path("properties[city]"))
            .field(Field::column("zip", "Zip", CellKind::Text).path("properties[zip]"))
            .field(Field::many_named("projects", "Project"))
            .field(Field::nested_named("dept", "Dept"));

        assert_eq!(
            schema.zero_value(),
            json!({
                "name": null,
                "skills": [],
                "properties": {},
                "projects": [],
                "dept": null
            })
        );
    }

    #[test]
    fn test_depth_limit() {
        assert_eq!(Field::nested::<Tag>("t").depth_limit(), DEFAULT_MAX_DEPTH);
        assert_eq!(Field::nested::<Tag>("t").max_depth(5).depth_limit(), 5);
        assert_eq!(Field::nested::<Tag>("t").recursive(false).depth_limit(), 1);
    }
}
