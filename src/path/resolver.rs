//! Reading and writing values at a path inside a record graph

use super::{Path, Segment};
use crate::coerce::{cell_to_json, json_to_text};
use crate::error::{field_not_found, FlatsheetError, FlatsheetResult};
use crate::types::{CellKind, CellValue};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Resolver behavior, set per column or per operation
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    /// Joins wildcard reads, splits wildcard writes
    pub separator: String,
    /// Wildcard reads keep at most this many elements
    pub max_join_size: Option<usize>,
    /// Swallow missing-attribute and out-of-range errors
    pub ignore_errors: bool,
    /// Returned in place of a swallowed read
    pub null_placeholder: Value,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            separator: ",".to_string(),
            max_join_size: None,
            ignore_errors: false,
            null_placeholder: Value::Null,
        }
    }
}

/// Zero values for attributes that `set` has to create on the way down
pub trait Templates {
    /// `key` comes from [`Path::template_key`]
    fn template_for(&self, key: &str) -> Option<Value>;
}

/// No declared types: missing intermediates become empty objects
pub struct NoTemplates;

impl Templates for NoTemplates {
    fn template_for(&self, _key: &str) -> Option<Value> {
        None
    }
}

impl Templates for HashMap<String, Value> {
    fn template_for(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    config: ResolverConfig,
}

impl PathResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Read the value at `path`
    ///
    /// A `null` anywhere along the way reads as `null`. Wildcard paths return
    /// the joined text of every element.
    pub fn get(&self, root: &Value, path: &Path) -> FlatsheetResult<Value> {
        let result = self.lookup(root, path).map(|found| match found {
            None => Value::Null,
            Some(value) if path.is_wildcard() => self.join(path, value),
            Some(value) => value.clone(),
        });
        self.absorb(path, result)
    }

    /// Elements of the sequence at `path`; `null` reads as empty
    pub fn get_list<'a>(&self, root: &'a Value, path: &Path) -> FlatsheetResult<&'a [Value]> {
        let result = match self.lookup(root, path) {
            Ok(None) => Ok(&[][..]),
            Ok(Some(Value::Array(items))) => Ok(items.as_slice()),
            Ok(Some(_)) => Err(FlatsheetError::NotAList {
                path: path.to_string(),
            }),
            Err(e) => Err(e),
        };
        match result {
            Err(e) if self.swallows(&e) => {
                debug!(path = %path, error = %e, "ignored list lookup failure");
                Ok(&[][..])
            }
            other => other,
        }
    }

    /// Write `value` at `path` with no declared types for new intermediates
    pub fn set(&self, root: &mut Value, path: &Path, value: Value) -> FlatsheetResult<()> {
        self.set_with(root, path, value, &NoTemplates)
    }

    /// Write `value` at `path`, creating missing intermediates from `templates`
    ///
    /// Sequences grow with `null` placeholders up to the addressed index. A
    /// wildcard target takes an array as-is, or splits a string on the separator.
    pub fn set_with(
        &self,
        root: &mut Value,
        path: &Path,
        value: Value,
        templates: &dyn Templates,
    ) -> FlatsheetResult<()> {
        let result = self.slot_mut(root, path, templates).map(|slot| {
            *slot = if path.is_wildcard() {
                self.split(value)
            } else {
                value
            };
        });
        self.absorb(path, result)
    }

    /// Coerce a cell to `kind` and write it at `path`
    ///
    /// For wildcard paths every separated token is coerced on its own. Coercion
    /// failures are returned even when path errors are ignored.
    pub fn set_cell(
        &self,
        root: &mut Value,
        path: &Path,
        cell: &CellValue,
        kind: CellKind,
        templates: &dyn Templates,
    ) -> FlatsheetResult<()> {
        let value = if path.is_wildcard() {
            let text = cell.render();
            let tokens = self.tokens(&text);
            let items = tokens
                .into_iter()
                .map(|token| cell_to_json(&CellValue::Text(token), kind))
                .collect::<FlatsheetResult<Vec<_>>>()?;
            Value::Array(items)
        } else {
            cell_to_json(cell, kind)?
        };
        self.set_with(root, path, value, templates)
    }

    /// Append `element` to the sequence at `path`, creating it if needed
    pub fn push(
        &self,
        root: &mut Value,
        path: &Path,
        element: Value,
        templates: &dyn Templates,
    ) -> FlatsheetResult<()> {
        let result = self.slot_mut(root, path, templates).and_then(|slot| {
            if slot.is_null() {
                *slot = Value::Array(Vec::new());
            }
            match slot {
                Value::Array(items) => {
                    items.push(element);
                    Ok(())
                }
                _ => Err(FlatsheetError::NotAList {
                    path: path.to_string(),
                }),
            }
        });
        self.absorb(path, result)
    }

    fn swallows(&self, error: &FlatsheetError) -> bool {
        self.config.ignore_errors && error.is_path_error()
    }

    fn absorb<T: Placeholder>(&self, path: &Path, result: FlatsheetResult<T>) -> FlatsheetResult<T> {
        match result {
            Err(e) if self.swallows(&e) => {
                debug!(path = %path, error = %e, "ignored path failure");
                Ok(T::placeholder(&self.config))
            }
            other => other,
        }
    }

    fn join(&self, path: &Path, value: &Value) -> Value {
        match value {
            Value::Array(items) => {
                let limit = self.config.max_join_size.unwrap_or(usize::MAX);
                let parts: Vec<String> = items.iter().take(limit).map(json_to_text).collect();
                Value::String(parts.join(&self.config.separator))
            }
            other => {
                debug!(path = %path, "wildcard over a non-sequence, reading it as one element");
                Value::String(json_to_text(other))
            }
        }
    }

    fn tokens(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        if self.config.separator.is_empty() {
            return vec![text.to_string()];
        }
        text.split(self.config.separator.as_str())
            .map(|t| t.trim().to_string())
            .collect()
    }

    fn split(&self, value: Value) -> Value {
        match value {
            Value::Null => Value::Array(Vec::new()),
            Value::Array(items) => Value::Array(items),
            Value::String(text) => {
                Value::Array(self.tokens(&text).into_iter().map(Value::String).collect())
            }
            other => Value::Array(vec![other]),
        }
    }

    /// Walk `path` read-only; `Ok(None)` when a `null` cuts the walk short
    fn lookup<'a>(&self, root: &'a Value, path: &Path) -> FlatsheetResult<Option<&'a Value>> {
        let mut current = root;

        for segment in path.segments() {
            let obj = match current {
                Value::Null => return Ok(None),
                Value::Object(obj) => obj,
                _ => return Err(field_not_found(&path.to_string(), segment.name(), Vec::new())),
            };

            let child = obj.get(segment.name()).ok_or_else(|| {
                field_not_found(&path.to_string(), segment.name(), obj.keys().cloned().collect())
            })?;

            current = match segment {
                Segment::Field(_) | Segment::Wildcard(_) => child,
                Segment::Index(_, index) => match child {
                    Value::Null => return Ok(None),
                    Value::Array(items) => {
                        items
                            .get(*index)
                            .ok_or_else(|| FlatsheetError::PathOutOfRange {
                                path: path.to_string(),
                                index: *index,
                                len: items.len(),
                            })?
                    }
                    _ => {
                        return Err(FlatsheetError::NotAList {
                            path: path.to_string(),
                        })
                    }
                },
                Segment::Key(_, key) => match child {
                    Value::Null => return Ok(None),
                    Value::Object(map) => match map.get(key) {
                        Some(value) => value,
                        None => return Ok(None),
                    },
                    _ => return Err(field_not_found(&path.to_string(), key, Vec::new())),
                },
            };
        }

        Ok(Some(current))
    }

    /// Walk `path` for writing and return the terminal slot
    fn slot_mut<'a>(
        &self,
        root: &'a mut Value,
        path: &Path,
        templates: &dyn Templates,
    ) -> FlatsheetResult<&'a mut Value> {
        let segments = path.segments();
        let last = segments.len().saturating_sub(1);
        let mut current = root;
        // Objects we created without a declared type accept any attribute
        let mut open = false;

        if current.is_null() {
            *current = Value::Object(Map::new());
            open = true;
        }

        for (i, segment) in segments.iter().enumerate() {
            let name = segment.name();
            let obj = match current {
                Value::Object(obj) => obj,
                _ => return Err(field_not_found(&path.to_string(), name, Vec::new())),
            };

            if !obj.contains_key(name) {
                if open {
                    obj.insert(name.to_string(), Value::Null);
                } else {
                    return Err(field_not_found(
                        &path.to_string(),
                        name,
                        obj.keys().cloned().collect(),
                    ));
                }
            }
            let slot = obj
                .get_mut(name)
                .ok_or_else(|| field_not_found(&path.to_string(), name, Vec::new()))?;

            let next = match segment {
                Segment::Field(_) | Segment::Wildcard(_) => slot,
                Segment::Index(_, index) => {
                    if slot.is_null() {
                        *slot = Value::Array(Vec::new());
                    }
                    let items = match slot {
                        Value::Array(items) => items,
                        _ => {
                            return Err(FlatsheetError::NotAList {
                                path: path.to_string(),
                            })
                        }
                    };
                    if items.len() <= *index {
                        items.resize(*index + 1, Value::Null);
                    }
                    &mut items[*index]
                }
                Segment::Key(_, key) => {
                    if slot.is_null() {
                        *slot = Value::Object(Map::new());
                    }
                    let map = match slot {
                        Value::Object(map) => map,
                        _ => return Err(field_not_found(&path.to_string(), key, Vec::new())),
                    };
                    map.entry(key.clone()).or_insert(Value::Null)
                }
            };

            if i == last {
                return Ok(next);
            }

            if next.is_null() {
                match templates.template_for(&path.template_key(i)) {
                    Some(template) => {
                        *next = template;
                        open = false;
                    }
                    None => {
                        *next = Value::Object(Map::new());
                        open = true;
                    }
                }
            } else {
                open = false;
            }
            current = next;
        }

        // Only reachable for an empty path
        Ok(current)
    }
}

/// What a swallowed failure turns into
trait Placeholder {
    fn placeholder(config: &ResolverConfig) -> Self;
}

impl Placeholder for Value {
    fn placeholder(config: &ResolverConfig) -> Self {
        config.null_placeholder.clone()
    }
}

impl Placeholder for () {
    fn placeholder(_config: &ResolverConfig) -> Self {}
}
