//! Schemas declared in YAML instead of code
//!
//! ```yaml
//! root: Order
//! settings:
//!   separator: ";"
//! types:
//!   Order:
//!     fields:
//!       - { name: order_no, column: orderNo, kind: text, merge: true }
//!       - { name: items, many: Item, prefix: "item-" }
//!   Item:
//!     fields:
//!       - { name: name, column: name, kind: text }
//!       - { name: qty, column: qty, kind: integer }
//! ```
//!
//! Records of catalog types are plain JSON objects.

use super::{Field, FieldKind, Schema, SchemaRef};
use crate::config::CodecSettings;
use crate::error::{FlatsheetError, FlatsheetResult};
use crate::plan::{FlattenPlan, PlanCache};
use crate::types::{CellKind, MultiListStrategy};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    root: Option<String>,
    #[serde(default)]
    settings: CodecSettings,
    types: BTreeMap<String, TypeDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeDef {
    #[serde(default)]
    fields: Vec<FieldDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDef {
    name: String,
    #[serde(default)]
    column: Option<String>,
    #[serde(default)]
    kind: CellKind,
    #[serde(default)]
    nested: Option<String>,
    #[serde(default)]
    many: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    suffix: String,
    #[serde(default)]
    recursive: Option<bool>,
    #[serde(default)]
    max_depth: Option<usize>,
    #[serde(default)]
    strategy: Option<MultiListStrategy>,
    #[serde(default)]
    max_rows: Option<usize>,
    #[serde(default)]
    merge: bool,
    #[serde(default)]
    depends_on: Option<String>,
}

impl FieldDef {
    fn into_field(self, owner: &str) -> FlatsheetResult<Field> {
        let mut field = match (self.column, self.nested, self.many) {
            (Some(header), None, None) => Field::column(self.name, header, self.kind),
            (None, Some(type_name), None) => Field::nested_named(self.name, type_name),
            (None, None, Some(type_name)) => Field::many_named(self.name, type_name),
            (None, None, None) => Field::ignored(self.name),
            _ => {
                return Err(FlatsheetError::InvalidSchema(format!(
                    "{}.{}: 'column', 'nested' and 'many' are mutually exclusive",
                    owner, self.name
                )))
            }
        };

        field.path = self.path;
        field.prefix = self.prefix;
        field.suffix = self.suffix;
        if let Some(recursive) = self.recursive {
            field.recursive = recursive;
        }
        field.max_depth = self.max_depth;
        field.strategy = self.strategy;
        field.max_rows = self.max_rows;
        field.merge = self.merge;
        field.depends_on = self.depends_on;
        Ok(field)
    }
}

/// Named schemas loaded from YAML, with their plans cached by type name
#[derive(Debug)]
pub struct Catalog {
    root: Option<String>,
    settings: CodecSettings,
    schemas: HashMap<String, Schema>,
    plans: PlanCache<String>,
}

impl Catalog {
    pub fn from_yaml_str(yaml: &str) -> FlatsheetResult<Self> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;

        let mut schemas = HashMap::new();
        for (type_name, def) in file.types {
            let mut schema = Schema::new(type_name.clone());
            for field_def in def.fields {
                schema = schema.field(field_def.into_field(&type_name)?);
            }
            schemas.insert(type_name, schema);
        }

        let catalog = Self {
            root: file.root,
            settings: file.settings,
            schemas,
            plans: PlanCache::new(),
        };
        catalog.check_references()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> FlatsheetResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn settings(&self) -> &CodecSettings {
        &self.settings
    }

    pub fn schema(&self, type_name: &str) -> Option<&Schema> {
        self.schemas.get(type_name)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Declared `root`, or the only type when there is just one
    pub fn root_type(&self) -> FlatsheetResult<&str> {
        if let Some(root) = &self.root {
            return Ok(root.as_str());
        }
        let names = self.type_names();
        match names.as_slice() {
            [only] => Ok(*only),
            _ => Err(FlatsheetError::InvalidSchema(
                "catalog declares several types but no 'root'".to_string(),
            )),
        }
    }

    /// Flatten plan of `type_name`, built on first use
    pub fn plan(&self, type_name: &str) -> FlatsheetResult<Arc<FlattenPlan>> {
        let schema = self.schemas.get(type_name).ok_or_else(|| unknown_type(type_name))?;
        self.plans.get_or_build(type_name.to_string(), || {
            FlattenPlan::build(schema, &|r: &SchemaRef| self.resolve(r))
        })
    }

    fn resolve(&self, reference: &SchemaRef) -> FlatsheetResult<Schema> {
        match reference {
            SchemaRef::Record(schema) => Ok(schema()),
            SchemaRef::Named(name) => self
                .schemas
                .get(name)
                .cloned()
                .ok_or_else(|| unknown_type(name)),
        }
    }

    fn check_references(&self) -> FlatsheetResult<()> {
        if let Some(root) = &self.root {
            if !self.schemas.contains_key(root) {
                return Err(unknown_type(root));
            }
        }
        for schema in self.schemas.values() {
            for field in &schema.fields {
                if let FieldKind::Nested(SchemaRef::Named(name))
                | FieldKind::Many(SchemaRef::Named(name)) = &field.kind
                {
                    if !self.schemas.contains_key(name) {
                        return Err(FlatsheetError::InvalidSchema(format!(
                            "{}.{} references unknown type '{}'",
                            schema.name, field.name, name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn unknown_type(name: &str) -> FlatsheetError {
    FlatsheetError::InvalidSchema(format!("unknown type '{}'", name))
}
